//! Error taxonomy for a harvest run
//!
//! Record- and source-local errors are folded into `RunStatistics` by the
//! orchestrator; only `NoDataCollected` and `PersistenceFailure` (and
//! configuration errors) reach the caller.

use thiserror::Error;

use crate::types::SourceKind;

/// Errors raised while harvesting reviews
#[derive(Debug, Error)]
pub enum HarvestError {
    /// No product page exists for the identifier on this source
    #[error("{tag}: no product page found for '{identifier}'")]
    SourceUnavailable { tag: SourceKind, identifier: String },

    /// Page load failed or timed out
    #[error("navigation to {url} failed: {message}")]
    NavigationFailure { url: String, message: String },

    /// Anti-bot page detected
    #[error("blocking detected on {url}: matched '{signal}'")]
    BlockingDetected { url: String, signal: String },

    /// A single record's fields could not be extracted
    #[error("failed to extract record: {0}")]
    ExtractionError(String),

    /// Every selected source came back empty
    #[error("no reviews collected from any source")]
    NoDataCollected,

    /// Writing the output artifact failed
    #[error("failed to write {path}: {message}")]
    PersistenceFailure { path: String, message: String },

    /// The run was cancelled or timed out
    #[error("harvest cancelled")]
    Cancelled,

    /// Invalid run configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HarvestError {
    pub fn navigation(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::NavigationFailure {
            url: url.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error ends the whole run rather than a single source
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoDataCollected | Self::PersistenceFailure { .. } | Self::Config(_)
        )
    }
}
