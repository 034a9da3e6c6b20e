//! Review harvesting subsystem
//!
//! Pulls reviews for one product from several review sites and turns them
//! into a single deduplicated, newest-first collection.
//!
//! Key components:
//! - `PageDriver` / `DriverFactory`: one isolated page session per source
//! - `PageSession`: paced, retried, guarded navigation over a page driver
//! - `BlockingGuard`: access-denied detection and the CAPTCHA pause
//! - `SourceDriver`: per-site product lookup and pagination
//! - `DateFilter` and `Deduplicator`: range filtering and content identity
//! - `Orchestrator`: runs the sources and assembles the result

pub mod coordinator;
pub mod date_filter;
pub mod dedup;
pub mod driver;
pub mod guard;
pub mod http_driver;
pub mod normalize;
pub mod politeness;
pub mod session;
pub mod sources;

#[doc(hidden)]
pub mod scripted;

pub use coordinator::{sort_newest_first, HarvestOutcome, HarvestRequest, Orchestrator};
pub use date_filter::DateFilter;
pub use dedup::Deduplicator;
pub use driver::{DomQuery, DomRecord, DriverFactory, DriverOptions, NavigationResult, PageDriver};
pub use guard::{BlockingGuard, CaptchaSignal, GuardState};
pub use http_driver::{HttpDriverFactory, HttpPageDriver};
pub use politeness::{Clock, DelayPolicy, FixedClock, PolitenessConfig, RetryPolicy, SystemClock};
pub use session::{PageSession, SessionContext};
pub use sources::{build_source, slugify, PaginationCursor, SourceDriver, SourceSettings};
