//! Test doubles shared by the integration tests

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use review_harvester::{
    config::HarvestConfig,
    harvest::{
        driver::{DriverFactory, PageDriver},
        scripted::ScriptedDriver,
        FixedClock, Orchestrator, PaginationCursor, SourceDriver,
    },
    HarvestBatch, HarvestError, ReviewRecord, SourceKind,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn review(source: SourceKind, content: &str, author: &str, day: NaiveDate) -> ReviewRecord {
    ReviewRecord::new(format!("{}-{}", source, content), source, now())
        .with_content(content)
        .with_author(author)
        .with_date(day)
}

/// `n` distinct reviews dated `day`
pub fn reviews(source: SourceKind, prefix: &str, n: usize, day: NaiveDate) -> Vec<ReviewRecord> {
    (0..n)
        .map(|i| review(source, &format!("{} review {}", prefix, i), &format!("user {}", i), day))
        .collect()
}

/// Orchestrator with no delays and a fixed clock
pub fn orchestrator(settings: HarvestConfig, factory: Arc<dyn DriverFactory>) -> Orchestrator {
    Orchestrator::new(settings, factory).with_clock(Arc::new(FixedClock(now())))
}

pub fn quiet_settings() -> HarvestConfig {
    HarvestConfig {
        retry_attempts: 1,
        ..HarvestConfig::without_delays()
    }
}

// ============================================================================
// Scripted source adapter
// ============================================================================

/// Source adapter that replays canned batches
pub struct ScriptedSource {
    kind: SourceKind,
    product_url: Option<String>,
    batches: VecDeque<Result<Vec<ReviewRecord>, HarvestError>>,
    cancel_on_fetch: Option<(usize, CancellationToken)>,
    pub fetches: Arc<AtomicUsize>,
    pub cleaned_up: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            product_url: Some(format!("https://www.{}/products/acme/reviews", kind.domain())),
            batches: VecDeque::new(),
            cancel_on_fetch: None,
            fetches: Arc::new(AtomicUsize::new(0)),
            cleaned_up: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn batch(mut self, records: Vec<ReviewRecord>) -> Self {
        self.batches.push_back(Ok(records));
        self
    }

    pub fn failing(mut self, error: HarvestError) -> Self {
        self.batches.push_back(Err(error));
        self
    }

    pub fn not_listed(mut self) -> Self {
        self.product_url = None;
        self
    }

    /// Cancel `token` during fetch number `n` (1-based)
    pub fn cancel_during_fetch(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_on_fetch = Some((n, token));
        self
    }

    pub fn boxed(self) -> Box<dyn SourceDriver> {
        Box::new(self)
    }
}

#[async_trait]
impl SourceDriver for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn resolve_product_url(&mut self, _identifier: &str) -> Result<Option<String>, HarvestError> {
        Ok(self.product_url.clone())
    }

    async fn fetch_next_batch(&mut self, _cursor: &mut PaginationCursor) -> Result<HarvestBatch, HarvestError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_on_fetch {
            if *at == n {
                token.cancel();
                return Err(HarvestError::Cancelled);
            }
        }
        match self.batches.pop_front() {
            Some(Ok(records)) => Ok(HarvestBatch::new(records)),
            Some(Err(e)) => Err(e),
            None => Ok(HarvestBatch::empty()),
        }
    }

    async fn cleanup(&mut self) {
        self.cleaned_up.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Scripted page factory
// ============================================================================

/// Factory handing every source a copy of the same scripted site map
pub struct ScriptedFactory {
    script: ScriptedDriver,
    pub loads: Arc<Mutex<Vec<String>>>,
    pub sessions: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        let script = ScriptedDriver::new();
        Self {
            loads: script.load_log(),
            script,
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.versions(url, 200, &[html])
    }

    pub fn versions(mut self, url: &str, status: u16, versions: &[&str]) -> Self {
        self.script = self.script.versions(url, versions).status(url, status);
        self
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn open_session(&self, _source: SourceKind) -> Result<Box<dyn PageDriver>> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.script.clone()))
    }
}

/// Factory that never gets used
pub struct NoPages;

#[async_trait]
impl DriverFactory for NoPages {
    async fn open_session(&self, source: SourceKind) -> Result<Box<dyn PageDriver>> {
        bail!("no page sessions in this test ({})", source)
    }
}
