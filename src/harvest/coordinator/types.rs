//! Orchestrator inputs and outputs

use url::Url;

use crate::error::HarvestError;
use crate::types::{DateRange, ReviewRecord, RunStatistics, SourceKind};

/// What to harvest in one run
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    /// Company or product name, resolved per source
    pub company: Option<String>,
    /// Review page URL; used instead of name resolution on the site it belongs to
    pub direct_url: Option<String>,
    /// Sources in visiting (and merge) order
    pub sources: Vec<SourceKind>,
    pub range: DateRange,
    /// Records to collect per source
    pub limit: usize,
}

impl HarvestRequest {
    pub fn for_company(company: impl Into<String>, sources: Vec<SourceKind>, limit: usize) -> Self {
        Self {
            company: Some(company.into()),
            direct_url: None,
            sources,
            range: DateRange::default(),
            limit,
        }
    }

    pub fn for_url(url: impl Into<String>, sources: Vec<SourceKind>, limit: usize) -> Self {
        Self {
            company: None,
            direct_url: Some(url.into()),
            sources,
            range: DateRange::default(),
            limit,
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    /// Reject requests that cannot target anything
    pub fn validate(&self) -> Result<(), HarvestError> {
        let company = self.company.as_deref().map(str::trim).unwrap_or("");
        if company.is_empty() && self.direct_url.is_none() {
            return Err(HarvestError::Config("a company name or a URL is required".to_string()));
        }
        if let Some(url) = &self.direct_url {
            Url::parse(url).map_err(|e| HarvestError::Config(format!("invalid URL '{}': {}", url, e)))?;
        }
        if self.sources.is_empty() {
            return Err(HarvestError::Config("no sources selected".to_string()));
        }
        if self.limit == 0 {
            return Err(HarvestError::Config("limit must be greater than 0".to_string()));
        }
        if let (Some(start), Some(end)) = (self.range.start, self.range.end) {
            if start > end {
                return Err(HarvestError::Config(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    /// The direct URL, if it points at `kind`'s site
    pub fn direct_url_for(&self, kind: SourceKind) -> Option<&str> {
        let url = self.direct_url.as_deref()?;
        let host = Url::parse(url).ok()?.host_str()?.to_lowercase();
        let domain = kind.domain();
        (host == domain || host.ends_with(&format!(".{}", domain))).then_some(url)
    }

    /// Name used for log lines and "not found" errors
    pub fn identifier(&self) -> &str {
        self.company
            .as_deref()
            .or(self.direct_url.as_deref())
            .unwrap_or_default()
    }
}

/// Result of a run
#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    /// Deduplicated, newest first
    pub records: Vec<ReviewRecord>,
    pub stats: RunStatistics,
}

/// What one source produced before aggregation
#[derive(Debug)]
pub(crate) struct SourceOutcome {
    pub kind: SourceKind,
    pub records: Vec<ReviewRecord>,
    pub error: Option<HarvestError>,
}

impl SourceOutcome {
    pub fn failed(kind: SourceKind, error: HarvestError) -> Self {
        Self {
            kind,
            records: Vec::new(),
            error: Some(error),
        }
    }
}
