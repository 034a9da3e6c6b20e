//! Harvest orchestration
//!
//! The orchestrator:
//! 1. Opens an isolated page session per selected source
//! 2. Resolves each source's product page (direct URL first, then by name)
//! 3. Pulls batches until the limit, an empty batch, the end of the date
//!    window, or the adapter's own end signal
//! 4. Merges every source's records in source order, deduplicates, and
//!    sorts newest first
//!
//! A failing source is recorded in [`RunStatistics`] and the run moves on.
//! Sources run one after another unless `concurrent_sources` is set, in
//! which case each runs as its own future and the outcomes are folded into
//! the statistics after they have all finished.

mod types;

pub use types::{HarvestOutcome, HarvestRequest};
use types::SourceOutcome;

use futures::future::{join_all, BoxFuture, FutureExt};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::date_filter::DateFilter;
use super::dedup::Deduplicator;
use super::driver::DriverFactory;
use super::guard::CaptchaSignal;
use super::politeness::{Clock, DelayPolicy, PolitenessConfig, RetryPolicy, SystemClock};
use super::session::{PageSession, SessionContext};
use super::sources::{build_source, PaginationCursor, SourceDriver, SourceSettings};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::types::{ReviewRecord, RunStatistics, SourceKind};

/// Drives every selected source and assembles the final result
pub struct Orchestrator {
    settings: HarvestConfig,
    factory: Arc<dyn DriverFactory>,
    delay: Arc<DelayPolicy>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    captcha: CaptchaSignal,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(settings: HarvestConfig, factory: Arc<dyn DriverFactory>) -> Self {
        let delay = Arc::new(DelayPolicy::new(PolitenessConfig::from_config(&settings)));
        let retry = RetryPolicy::from_config(&settings);
        Self {
            settings,
            factory,
            delay,
            retry,
            clock: Arc::new(SystemClock),
            captcha: CaptchaSignal::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_delay_policy(mut self, delay: DelayPolicy) -> Self {
        self.delay = Arc::new(delay);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Handle for resuming a harvest suspended on a CAPTCHA
    pub fn captcha_signal(&self) -> CaptchaSignal {
        self.captcha.clone()
    }

    /// Token that aborts every run of this orchestrator
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Harvest every source named in `request`
    pub async fn run(&self, request: &HarvestRequest) -> Result<HarvestOutcome, HarvestError> {
        request.validate()?;
        let cancel = self.cancel.child_token();

        let tasks = request
            .sources
            .iter()
            .map(|&kind| {
                let cancel = cancel.clone();
                async move {
                    match self.open_source(kind, &cancel).await {
                        Ok(source) => self.harvest_source(request, source, &cancel).await,
                        Err(e) => SourceOutcome::failed(kind, e),
                    }
                }
                .boxed()
            })
            .collect();

        self.execute(tasks, cancel).await
    }

    /// Harvest with already-built adapters, in the order given
    pub async fn run_with_sources(
        &self,
        request: &HarvestRequest,
        sources: Vec<Box<dyn SourceDriver>>,
    ) -> Result<HarvestOutcome, HarvestError> {
        let cancel = self.cancel.child_token();

        let tasks = sources
            .into_iter()
            .map(|source| {
                let cancel = cancel.clone();
                async move { self.harvest_source(request, source, &cancel).await }.boxed()
            })
            .collect();

        self.execute(tasks, cancel).await
    }

    async fn execute(
        &self,
        tasks: Vec<BoxFuture<'_, SourceOutcome>>,
        cancel: CancellationToken,
    ) -> Result<HarvestOutcome, HarvestError> {
        let started = Instant::now();
        let timer = self.arm_run_timeout(&cancel);

        let outcomes = if self.settings.concurrent_sources {
            join_all(tasks).await
        } else {
            let total = tasks.len();
            let mut outcomes = Vec::with_capacity(total);
            for task in tasks {
                if cancel.is_cancelled() {
                    tracing::warn!("Run cancelled, skipping {} remaining source(s)", total - outcomes.len());
                    break;
                }
                outcomes.push(task.await);
            }
            outcomes
        };

        if let Some(timer) = timer {
            timer.abort();
        }

        aggregate(outcomes, started)
    }

    fn arm_run_timeout(&self, cancel: &CancellationToken) -> Option<JoinHandle<()>> {
        let limit = self.settings.run_timeout()?;
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    tracing::warn!("Run timeout of {:?} reached, cancelling", limit);
                    cancel.cancel();
                }
            }
        }))
    }

    async fn open_source(
        &self,
        kind: SourceKind,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn SourceDriver>, HarvestError> {
        let driver = self.factory.open_session(kind).await.map_err(|e| {
            HarvestError::navigation(kind.domain(), format!("failed to open page session: {:#}", e))
        })?;

        let ctx = SessionContext {
            delay: self.delay.clone(),
            retry: self.retry.clone(),
            timeout: self.settings.timeout(),
            clock: self.clock.clone(),
            captcha: self.captcha.clone(),
            cancel: cancel.clone(),
        };
        let settings = SourceSettings {
            max_pages: self.settings.max_pages,
            max_scroll_attempts: self.settings.max_scroll_attempts,
        };
        Ok(build_source(kind, PageSession::new(kind, driver, ctx), settings))
    }

    /// Run one source to completion; cleanup happens on every path
    async fn harvest_source(
        &self,
        request: &HarvestRequest,
        mut source: Box<dyn SourceDriver>,
        cancel: &CancellationToken,
    ) -> SourceOutcome {
        let kind = source.kind();
        let started = Instant::now();
        tracing::info!("{}: harvesting reviews for '{}'", kind, request.identifier());

        let mut records = Vec::new();
        let result = harvest_batches(request, &mut *source, &mut records, cancel).await;
        source.cleanup().await;

        match &result {
            Ok(()) => tracing::info!(
                "{}: collected {} reviews in {:.1}s",
                kind,
                records.len(),
                started.elapsed().as_secs_f64()
            ),
            Err(HarvestError::Cancelled) => {
                tracing::warn!("{}: cancelled, keeping {} reviews", kind, records.len())
            }
            Err(e) => tracing::warn!("{}: {} (keeping {} reviews)", kind, e, records.len()),
        }

        SourceOutcome {
            kind,
            records,
            error: result.err(),
        }
    }
}

/// Pull batches from one source into `records`.
///
/// Stops, in order of precedence, when the limit is reached, a batch comes
/// back empty, date filtering empties a non-empty batch that is not newer
/// than the window, or the adapter reports its end of list.
async fn harvest_batches(
    request: &HarvestRequest,
    source: &mut dyn SourceDriver,
    records: &mut Vec<ReviewRecord>,
    cancel: &CancellationToken,
) -> Result<(), HarvestError> {
    let kind = source.kind();
    let unavailable = || HarvestError::SourceUnavailable {
        tag: kind,
        identifier: request.identifier().to_string(),
    };

    let product_url = match (request.direct_url_for(kind), request.company.as_deref()) {
        (Some(url), _) => url.to_string(),
        (None, Some(company)) => source.resolve_product_url(company).await?.ok_or_else(unavailable)?,
        (None, None) => return Err(unavailable()),
    };
    tracing::debug!("{}: product page {}", kind, product_url);

    let filter = DateFilter::new(request.range);
    let mut cursor = PaginationCursor::new(product_url);
    let mut steps = 0u32;

    loop {
        if records.len() >= request.limit {
            tracing::debug!("{}: limit of {} reached", kind, request.limit);
            break;
        }
        if cursor.exhausted {
            tracing::debug!("{}: end of list after {} step(s)", kind, steps);
            break;
        }
        if cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        let batch = match source.fetch_next_batch(&mut cursor).await {
            Ok(batch) => batch,
            Err(HarvestError::NavigationFailure { url, message }) if steps > 0 => {
                tracing::warn!("{}: stopping pagination, {} failed: {}", kind, url, message);
                break;
            }
            Err(e) => return Err(e),
        };
        steps += 1;

        if batch.is_empty() {
            tracing::debug!("{}: step {} returned no reviews", kind, steps);
            break;
        }

        let raw = batch.len();
        let before_window = filter.before_window(&batch.records);
        let kept = filter.apply(batch.records);
        tracing::debug!("{}: step {} yielded {} reviews, {} in range", kind, steps, raw, kept.len());

        if kept.is_empty() && filter.is_active() && !before_window {
            tracing::debug!("{}: past the date window", kind);
            break;
        }

        records.extend(kept);
        records.truncate(request.limit);
        cursor.accumulated = records.len();
    }

    Ok(())
}

/// Fold per-source outcomes into the final, ordered result
fn aggregate(outcomes: Vec<SourceOutcome>, started: Instant) -> Result<HarvestOutcome, HarvestError> {
    let mut stats = RunStatistics::default();
    let mut merged = Vec::new();

    for outcome in outcomes {
        stats.record_source(outcome.kind, outcome.records.len());
        if let Some(error) = outcome.error {
            stats.record_error(outcome.kind, error.to_string());
        }
        merged.extend(outcome.records);
    }

    let mut records = Deduplicator::dedup(merged);
    sort_newest_first(&mut records);
    stats.finalize(records.len(), started.elapsed());

    if records.is_empty() {
        return Err(HarvestError::NoDataCollected);
    }

    tracing::info!(
        "Collected {} reviews ({} before dedup) from {} source(s) in {}ms",
        stats.total_records,
        stats.raw_records,
        stats.sources.len(),
        stats.elapsed_ms
    );
    Ok(HarvestOutcome { records, stats })
}

/// Stable sort by date, newest first; undated records go last
pub fn sort_newest_first(records: &mut [ReviewRecord]) {
    records.sort_by(|a, b| match (a.date, b.date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
