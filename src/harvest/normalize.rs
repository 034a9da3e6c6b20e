//! Field normalization for extracted reviews
//!
//! Every function here is idempotent: feeding an already-normalized value
//! back in returns it unchanged.

use chrono::{DateTime, Days, Months, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

use crate::types::{ReviewRecord, MAX_RATING};
use crate::util::collapse_whitespace;

static RE_NUMBER: OnceLock<Regex> = OnceLock::new();
static RE_PERCENT: OnceLock<Regex> = OnceLock::new();
static RE_OUT_OF: OnceLock<Regex> = OnceLock::new();
static RE_ISO_DATE: OnceLock<Regex> = OnceLock::new();
static RE_MONTH_DAY_YEAR: OnceLock<Regex> = OnceLock::new();
static RE_DAY_MONTH_YEAR: OnceLock<Regex> = OnceLock::new();
static RE_NUMERIC_DATE: OnceLock<Regex> = OnceLock::new();
static RE_RELATIVE: OnceLock<Regex> = OnceLock::new();

/// Collapse whitespace; blank text becomes `None`
pub fn normalize_text(raw: Option<&str>) -> Option<String> {
    let text = collapse_whitespace(raw?);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Clamp into `[0, MAX_RATING]` and round to one decimal
pub fn clamp_rating(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let clamped = value.clamp(0.0, MAX_RATING);
    Some((clamped * 10.0).round() / 10.0)
}

/// Parse a rating out of free text.
///
/// Handles plain numbers ("4.5"), "4 out of 5", "Rated 3.5 stars",
/// star-bar widths ("width: 90%") and ten-point scales ("8/10").
pub fn parse_rating(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let re_percent = RE_PERCENT.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").unwrap());
    if let Some(caps) = re_percent.captures(text) {
        let pct: f64 = caps[1].parse().ok()?;
        return clamp_rating(pct / 100.0 * MAX_RATING);
    }

    let re_out_of = RE_OUT_OF.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:/|out of|of)\s*(\d+(?:\.\d+)?)").unwrap()
    });
    if let Some(caps) = re_out_of.captures(text) {
        let value: f64 = caps[1].parse().ok()?;
        let scale: f64 = caps[2].parse().ok()?;
        if scale > 0.0 {
            return clamp_rating(value / scale * MAX_RATING);
        }
    }

    let re_number = RE_NUMBER.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());
    let number = re_number.find(text)?.as_str().replace(',', ".");
    clamp_rating(number.parse().ok()?)
}

/// Parse a review date from the many shapes sites print them in.
///
/// `today` anchors relative phrases such as "3 days ago". Returns `None`
/// when nothing date-like is found.
pub fn parse_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = collapse_whitespace(raw);
    if text.is_empty() {
        return None;
    }

    // Full timestamps ("2024-01-15T10:00:00Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Some(dt.date_naive());
    }

    let re_iso = RE_ISO_DATE.get_or_init(|| Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").unwrap());
    if let Some(caps) = re_iso.captures(&text) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }

    let re_mdy = RE_MONTH_DAY_YEAR.get_or_init(|| {
        Regex::new(r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b").unwrap()
    });
    if let Some(caps) = re_mdy.captures(&text) {
        if let Some(month) = month_number(&caps[1]) {
            return NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, caps[2].parse().ok()?);
        }
    }

    let re_dmy = RE_DAY_MONTH_YEAR.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+([a-z]{3,9})\.?,?\s+(\d{4})\b").unwrap()
    });
    if let Some(caps) = re_dmy.captures(&text) {
        if let Some(month) = month_number(&caps[2]) {
            return NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, caps[1].parse().ok()?);
        }
    }

    // US-style numeric dates ("01/15/2024")
    let re_numeric = RE_NUMERIC_DATE.get_or_init(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
    if let Some(caps) = re_numeric.captures(&text) {
        return ymd(&caps[3], &caps[1], &caps[2]);
    }

    parse_relative(&text.to_lowercase(), today)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let prefix = lower.get(..3)?;
    let month = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn parse_relative(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if text.contains("today") || text.contains("just now") {
        return Some(today);
    }
    if text.contains("yesterday") {
        return today.checked_sub_days(Days::new(1));
    }

    let re = RE_RELATIVE.get_or_init(|| {
        Regex::new(r"\b(\d+|an?)\s+(hour|day|week|month|year)s?\s+ago").unwrap()
    });
    let caps = re.captures(text)?;
    let amount: u32 = match &caps[1] {
        "a" | "an" => 1,
        n => n.parse().ok()?,
    };

    // Out-of-range counts yield no date rather than a wrapped one
    match &caps[2] {
        "hour" => Some(today),
        "day" => today.checked_sub_days(Days::new(u64::from(amount))),
        "week" => today.checked_sub_days(Days::new(u64::from(amount.checked_mul(7)?))),
        "month" => today.checked_sub_months(Months::new(amount)),
        "year" => today.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        _ => None,
    }
}

/// Re-apply the text and rating invariants to a record
pub fn normalize_record(mut record: ReviewRecord) -> ReviewRecord {
    record.title = normalize_text(record.title.as_deref());
    record.content = normalize_text(record.content.as_deref());
    record.pros = normalize_text(record.pros.as_deref());
    record.cons = normalize_text(record.cons.as_deref());
    record.author = normalize_text(record.author.as_deref());
    record.job_title = normalize_text(record.job_title.as_deref());
    record.company_size = normalize_text(record.company_size.as_deref());
    record.industry = normalize_text(record.industry.as_deref());
    record.rating = record.rating.and_then(clamp_rating);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    #[test]
    fn text_is_collapsed_and_blank_dropped() {
        assert_eq!(
            normalize_text(Some("  Great\n\n   product  ")),
            Some("Great product".to_string())
        );
        assert_eq!(normalize_text(Some(" \n\t ")), None);
        assert_eq!(normalize_text(None), None);
    }

    #[test]
    fn rating_shapes() {
        assert_eq!(parse_rating("4.5"), Some(4.5));
        assert_eq!(parse_rating("Rated 4 out of 5 stars"), Some(4.0));
        assert_eq!(parse_rating("width: 90%"), Some(4.5));
        assert_eq!(parse_rating("8/10"), Some(4.0));
        assert_eq!(parse_rating("4,7"), Some(4.7));
        assert_eq!(parse_rating("7"), Some(5.0));
        assert_eq!(parse_rating("4.46"), Some(4.5));
        assert_eq!(parse_rating("no stars"), None);
    }

    #[test]
    fn clamp_handles_out_of_range_and_nan() {
        assert_eq!(clamp_rating(-1.0), Some(0.0));
        assert_eq!(clamp_rating(9.99), Some(5.0));
        assert_eq!(clamp_rating(f64::NAN), None);
    }

    #[test]
    fn date_shapes() {
        let t = today();
        assert_eq!(parse_date("2024-01-15", t), d(2024, 1, 15));
        assert_eq!(parse_date("2024-01-15T10:20:00Z", t), d(2024, 1, 15));
        assert_eq!(parse_date("Reviewed on January 15, 2024", t), d(2024, 1, 15));
        assert_eq!(parse_date("Jan 5 2024", t), d(2024, 1, 5));
        assert_eq!(parse_date("Sept. 3rd, 2023", t), d(2023, 9, 3));
        assert_eq!(parse_date("15 March 2024", t), d(2024, 3, 15));
        assert_eq!(parse_date("02/29/2024", t), d(2024, 2, 29));
        assert_eq!(parse_date("yesterday", t), d(2024, 3, 14));
        assert_eq!(parse_date("3 days ago", t), d(2024, 3, 12));
        assert_eq!(parse_date("a month ago", t), d(2024, 2, 15));
        assert_eq!(parse_date("2 years ago", t), d(2022, 3, 15));
        assert_eq!(parse_date("sometime last spring", t), None);
        assert_eq!(parse_date("2024-02-30", t), None);
    }

    #[test]
    fn huge_relative_counts_have_no_date() {
        let t = today();
        assert_eq!(parse_date("3000000000000000000 weeks ago", t), None);
        assert_eq!(parse_date("400000000 years ago", t), None);
        assert_eq!(parse_date("4294967297 months ago", t), None);
        assert_eq!(parse_date("999999999 days ago", t), None);
    }

    #[test]
    fn normalized_date_parses_to_itself() {
        let date = d(2023, 11, 2).unwrap();
        let printed = date.format("%Y-%m-%d").to_string();
        assert_eq!(parse_date(&printed, today()), Some(date));
    }

    #[test]
    fn record_normalization_is_idempotent() {
        let stamp = today().and_hms_opt(0, 0, 0).unwrap();
        let mut record = ReviewRecord::new("x", SourceKind::G2, stamp)
            .with_content("  lots   of\nspace ")
            .with_author("\tJane  D. ")
            .with_rating(4.449);
        record.pros = Some("   ".to_string());

        let once = normalize_record(record);
        assert_eq!(once.content.as_deref(), Some("lots of space"));
        assert_eq!(once.author.as_deref(), Some("Jane D."));
        assert_eq!(once.pros, None);
        assert_eq!(once.rating, Some(4.4));

        let twice = normalize_record(once.clone());
        assert_eq!(once, twice);
    }
}
