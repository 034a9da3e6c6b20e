//! Review Harvester: product reviews from several review sites in one place
//!
//! Collects reviews for a product from G2, Capterra and TrustRadius,
//! featuring:
//! - Site adapters for numbered pages, "show more" buttons and infinite scroll
//! - Jittered politeness delays and bounded retry on navigation
//! - Access-denied detection and a manual CAPTCHA pause
//! - Content-based deduplication across sources
//! - Inclusive date-range filtering and newest-first ordering

pub mod config;
pub mod error;
pub mod harvest;
pub mod output;
pub mod types;
pub mod util;

pub use config::Config;
pub use error::HarvestError;
pub use types::*;
