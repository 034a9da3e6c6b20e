//! Review site adapters
//!
//! Every site implements [`SourceDriver`] on top of its own [`PageSession`].
//! Adapters only know their site's URLs, selectors and pagination style;
//! pacing, retry, blocking detection, filtering and termination live
//! elsewhere.

mod capterra;
mod g2;
mod trustradius;

pub use capterra::CapterraSource;
pub use g2::G2Source;
pub use trustradius::TrustRadiusSource;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

use super::driver::{DomRecord, NavigationResult};
use super::normalize::{normalize_record, normalize_text, parse_date, parse_rating};
use super::session::PageSession;
use crate::error::HarvestError;
use crate::types::{HarvestBatch, ReviewRecord, SourceKind};

/// Pagination limits handed to every adapter
#[derive(Debug, Clone, Copy)]
pub struct SourceSettings {
    pub max_pages: u32,
    pub max_scroll_attempts: u32,
}

/// Pagination or scroll position of one in-progress harvest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    /// Product review page the harvest started from
    pub product_url: String,
    /// Pages loaded, or scroll steps taken
    pub page: u32,
    /// Cards already emitted from a growing list
    pub offset: usize,
    /// Records accepted so far
    pub accumulated: usize,
    /// Document height after the last step
    pub last_height: u64,
    /// The adapter has seen its end-of-list signal
    pub exhausted: bool,
}

impl PaginationCursor {
    pub fn new(product_url: impl Into<String>) -> Self {
        Self {
            product_url: product_url.into(),
            page: 0,
            offset: 0,
            accumulated: 0,
            last_height: 0,
            exhausted: false,
        }
    }
}

/// One review site
#[async_trait]
pub trait SourceDriver: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Find the product's review page; `None` when the site has no match
    async fn resolve_product_url(&mut self, identifier: &str) -> Result<Option<String>, HarvestError>;

    /// Load or reveal the next batch of reviews
    async fn fetch_next_batch(&mut self, cursor: &mut PaginationCursor) -> Result<HarvestBatch, HarvestError>;

    /// Release the page session; never fails
    async fn cleanup(&mut self);
}

/// Build the adapter for `kind` around an open session
pub fn build_source(kind: SourceKind, session: PageSession, settings: SourceSettings) -> Box<dyn SourceDriver> {
    match kind {
        SourceKind::G2 => Box::new(G2Source::new(session, settings.max_pages)),
        SourceKind::Capterra => Box::new(CapterraSource::new(session, settings.max_scroll_attempts)),
        SourceKind::TrustRadius => Box::new(TrustRadiusSource::new(session, settings.max_scroll_attempts)),
    }
}

/// Lower-case, collapse non-alphanumerics to `-`, trim dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// HTTP statuses a site serves for a product it does not list
const MISSING_STATUSES: &[u16] = &[404, 410];

/// Reject a first product-page load the site answered with "not found"
pub(crate) fn ensure_listed(source: SourceKind, nav: &NavigationResult, product_url: &str) -> Result<(), HarvestError> {
    if MISSING_STATUSES.contains(&nav.status) {
        tracing::info!("{}: {} answered {}, product not listed", source, product_url, nav.status);
        return Err(HarvestError::SourceUnavailable {
            tag: source,
            identifier: product_url.to_string(),
        });
    }
    Ok(())
}

fn first_number(raw: &str) -> Option<u32> {
    static RE_NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = RE_NUMBER.get_or_init(|| Regex::new(r"\d[\d,]*").unwrap());
    re.find(raw)?.as_str().replace(',', "").parse().ok()
}

/// Turn one extracted card into a normalized record.
///
/// Field names follow the record: `id`, `title`, `content`, `rating`,
/// `author`, `date`, `pros`, `cons`, `job_title`, `company_size`,
/// `industry`, `helpful`, `verified`.
pub fn record_from_dom(
    source: SourceKind,
    raw: &DomRecord,
    fallback_id: String,
    scraped_at: NaiveDateTime,
    today: NaiveDate,
) -> Result<ReviewRecord, HarvestError> {
    let id = match raw.get("id") {
        Some(site_id) => format!("{}-{}", source.as_str().to_lowercase(), site_id),
        None => fallback_id,
    };

    let mut record = ReviewRecord::new(id, source, scraped_at);
    record.title = normalize_text(raw.get("title"));
    record.content = normalize_text(raw.get("content"));
    if record.title.is_none() && record.content.is_none() {
        return Err(HarvestError::ExtractionError(format!(
            "{} card {} has neither title nor content",
            source, record.id
        )));
    }

    record.rating = raw.get("rating").and_then(parse_rating);
    record.author = raw.get("author").map(str::to_string);
    record.date = raw.get("date").and_then(|d| parse_date(d, today));
    record.pros = raw.get("pros").map(str::to_string);
    record.cons = raw.get("cons").map(str::to_string);
    record.job_title = raw.get("job_title").map(str::to_string);
    record.company_size = raw.get("company_size").map(str::to_string);
    record.industry = raw.get("industry").map(str::to_string);
    record.helpful_count = raw.get("helpful").and_then(first_number);
    record.verified = raw.get("verified").map(|_| true);

    Ok(normalize_record(record))
}

/// Convert cards `skip..` of one step, dropping the ones that fail.
///
/// `step` goes into fallback ids as `{source}-{step}-{position}`.
pub(crate) fn records_from_cards(
    session: &PageSession,
    cards: &[DomRecord],
    skip: usize,
    step: u32,
) -> Vec<ReviewRecord> {
    let source = session.source();
    let (now, today) = (session.now(), session.today());
    let tag = source.as_str().to_lowercase();

    cards
        .iter()
        .enumerate()
        .skip(skip)
        .filter_map(|(pos, card)| {
            match record_from_dom(source, card, format!("{}-{}-{}", tag, step, pos), now, today) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("{}", e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use tokio_util::sync::CancellationToken;

    use crate::harvest::guard::CaptchaSignal;
    use crate::harvest::politeness::{DelayPolicy, FixedClock, PolitenessConfig, RetryPolicy};
    use crate::harvest::scripted::ScriptedDriver;
    use crate::harvest::session::{PageSession, SessionContext};
    use crate::types::SourceKind;

    pub fn session(source: SourceKind, driver: ScriptedDriver) -> PageSession {
        let now = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
        let ctx = SessionContext {
            delay: Arc::new(DelayPolicy::with_seed(
                PolitenessConfig {
                    base_delay: Duration::ZERO,
                    jitter_min: Duration::ZERO,
                    jitter_max: Duration::ZERO,
                },
                3,
            )),
            retry: RetryPolicy::none(),
            timeout: Duration::from_secs(2),
            clock: Arc::new(FixedClock(now)),
            captcha: CaptchaSignal::new(),
            cancel: CancellationToken::new(),
        };
        PageSession::new(source, Box::new(driver), ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        stamp().date()
    }

    #[test]
    fn slugs_collapse_separators() {
        assert_eq!(slugify("Acme CRM"), "acme-crm");
        assert_eq!(slugify("  Monday.com -- Work OS!  "), "monday-com-work-os");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn card_fields_are_normalized() {
        let card = DomRecord::default()
            .with("title", "  Great\n tool ")
            .with("content", "Does   the job")
            .with("rating", "9 out of 10")
            .with("author", "Jane D.")
            .with("date", "January 5, 2024")
            .with("helpful", "1,204 people found this helpful")
            .with("verified", "Verified");

        let r = record_from_dom(SourceKind::G2, &card, "g2-1-0".into(), stamp(), today()).unwrap();
        assert_eq!(r.id, "g2-1-0");
        assert_eq!(r.title.as_deref(), Some("Great tool"));
        assert_eq!(r.content.as_deref(), Some("Does the job"));
        assert_eq!(r.rating, Some(4.5));
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(r.helpful_count, Some(1204));
        assert_eq!(r.verified, Some(true));
        assert_eq!(r.pros, None);
    }

    #[test]
    fn site_id_wins_over_position() {
        let card = DomRecord::default().with("id", "survey-77").with("content", "ok");
        let r = record_from_dom(SourceKind::TrustRadius, &card, "x".into(), stamp(), today()).unwrap();
        assert_eq!(r.id, "trustradius-survey-77");
    }

    #[test]
    fn empty_card_is_an_extraction_error() {
        let card = DomRecord::default().with("author", "Bob");
        let err = record_from_dom(SourceKind::Capterra, &card, "c-0-0".into(), stamp(), today()).unwrap_err();
        assert!(matches!(err, HarvestError::ExtractionError(_)));
    }
}
