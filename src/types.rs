//! Core types for review harvesting

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum rating any source can report
pub const MAX_RATING: f64 = 5.0;

// ============================================================================
// Sources
// ============================================================================

/// The fixed set of review sites this crate can harvest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "G2")]
    G2,
    #[serde(rename = "Capterra")]
    Capterra,
    #[serde(rename = "TrustRadius")]
    TrustRadius,
}

impl SourceKind {
    /// Every source, in the order an `all` run visits them
    pub const ALL: [SourceKind; 3] = [SourceKind::G2, SourceKind::Capterra, SourceKind::TrustRadius];

    /// Tag stamped on every record this source produces
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G2 => "G2",
            Self::Capterra => "Capterra",
            Self::TrustRadius => "TrustRadius",
        }
    }

    /// Registrable domain the site is served from
    pub fn domain(&self) -> &'static str {
        match self {
            Self::G2 => "g2.com",
            Self::Capterra => "capterra.com",
            Self::TrustRadius => "trustradius.com",
        }
    }

    /// Parse a source selection: a single source name or `all`
    pub fn parse_selection(selection: &str) -> Result<Vec<SourceKind>, String> {
        if selection.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::ALL.to_vec());
        }
        selection.parse::<SourceKind>().map(|kind| vec![kind])
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "g2" => Ok(Self::G2),
            "capterra" => Ok(Self::Capterra),
            "trustradius" | "trust-radius" => Ok(Self::TrustRadius),
            other => Err(format!(
                "unknown source '{}' (expected g2, capterra, trustradius or all)",
                other
            )),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One normalized review
///
/// Text fields are whitespace-collapsed, `rating` is clamped to
/// `[0, MAX_RATING]` with one decimal, and `date` is either a calendar date
/// or absent. See [`crate::harvest::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Source-scoped identifier; not used for identity
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub rating: Option<f64>,
    pub author: Option<String>,
    pub date: Option<NaiveDate>,
    pub source: SourceKind,
    pub pros: Option<String>,
    pub cons: Option<String>,
    #[serde(with = "scraped_at_format")]
    pub scraped_at: NaiveDateTime,

    // Site-specific extensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helpful_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

impl ReviewRecord {
    /// Create an empty record for a source
    pub fn new(id: impl Into<String>, source: SourceKind, scraped_at: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            title: None,
            content: None,
            rating: None,
            author: None,
            date: None,
            source,
            pros: None,
            cons: None,
            scraped_at,
            job_title: None,
            company_size: None,
            industry: None,
            helpful_count: None,
            verified: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// `scraped_at` is written as `YYYY-MM-DD HH:MM:SS`
mod scraped_at_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Records produced by one pagination or scroll step
#[derive(Debug, Clone, Default)]
pub struct HarvestBatch {
    pub records: Vec<ReviewRecord>,
}

impl HarvestBatch {
    pub fn new(records: Vec<ReviewRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Date range
// ============================================================================

/// Inclusive `[start, end]` window; inactive unless both bounds are set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Both bounds present
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.bounds().is_some()
    }
}

// ============================================================================
// Run statistics
// ============================================================================

/// A source that failed during the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub message: String,
}

/// Statistics for one orchestration run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Records in the final output
    pub total_records: usize,
    /// Records collected before deduplication
    pub raw_records: usize,
    /// Sources that contributed at least one record
    pub sources: Vec<SourceKind>,
    /// Per-source failures
    pub errors: Vec<SourceFailure>,
    pub elapsed_ms: u64,
    /// `total_records / raw_records * 100`, rounded
    pub success_rate: u32,
}

impl RunStatistics {
    pub fn record_source(&mut self, source: SourceKind, count: usize) {
        self.raw_records += count;
        if count > 0 && !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    pub fn record_error(&mut self, source: SourceKind, message: impl Into<String>) {
        self.errors.push(SourceFailure {
            source,
            message: message.into(),
        });
    }

    /// Fill in the post-dedup figures
    pub fn finalize(&mut self, final_count: usize, elapsed: std::time::Duration) {
        self.total_records = final_count;
        self.elapsed_ms = elapsed.as_millis() as u64;
        self.success_rate = if self.raw_records == 0 {
            0
        } else {
            ((final_count as f64 / self.raw_records as f64) * 100.0).round() as u32
        };
    }
}
