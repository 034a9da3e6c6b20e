//! Per-source page session
//!
//! Wraps one [`PageDriver`] with everything a source adapter needs between
//! it and the page: the politeness pause before each step, bounded retry on
//! navigation, the blocking guard after each load, and the run's
//! cancellation token. Adapters never touch the driver directly.

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::driver::{DomQuery, DomRecord, NavigationResult, PageDriver, WaitCondition, WaitOutcome};
use super::guard::{BlockingGuard, CaptchaSignal};
use super::politeness::{Clock, DelayPolicy, RetryPolicy};
use crate::error::HarvestError;
use crate::types::SourceKind;

/// Run-wide settings every session is opened with
#[derive(Clone)]
pub struct SessionContext {
    pub delay: Arc<DelayPolicy>,
    pub retry: RetryPolicy,
    /// Bound on a single load or content wait
    pub timeout: Duration,
    pub clock: Arc<dyn Clock>,
    pub captcha: CaptchaSignal,
    pub cancel: CancellationToken,
}

/// One source's exclusive page session
pub struct PageSession {
    source: SourceKind,
    driver: Option<Box<dyn PageDriver>>,
    guard: BlockingGuard,
    ctx: SessionContext,
    last_nav: Option<NavigationResult>,
}

impl PageSession {
    pub fn new(source: SourceKind, driver: Box<dyn PageDriver>, ctx: SessionContext) -> Self {
        let guard = BlockingGuard::new(ctx.captcha.clone());
        Self {
            source,
            driver: Some(driver),
            guard,
            ctx,
            last_nav: None,
        }
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn guard(&self) -> &BlockingGuard {
        &self.guard
    }

    pub fn now(&self) -> NaiveDateTime {
        self.ctx.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.ctx.clock.today()
    }

    /// URL of the last successful navigation
    pub fn current_url(&self) -> Option<&str> {
        self.last_nav.as_ref().map(|n| n.final_url.as_str())
    }

    pub fn ensure_active(&self) -> Result<(), HarvestError> {
        if self.ctx.cancel.is_cancelled() {
            Err(HarvestError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Politeness delay before a pagination step that does not navigate
    pub async fn pause(&self) -> Result<(), HarvestError> {
        self.ctx.delay.pause(&self.ctx.cancel).await
    }

    fn closed(&self) -> HarvestError {
        HarvestError::navigation(self.current_url().unwrap_or("about:blank"), "page session closed")
    }

    /// Pause, load `url` with retry, then run the blocking guard
    pub async fn navigate(&mut self, url: &str) -> Result<NavigationResult, HarvestError> {
        self.pause().await?;

        let timeout = self.ctx.timeout;
        let retry = self.ctx.retry.clone();
        let cancel = self.ctx.cancel.clone();
        let Some(driver) = self.driver.as_mut() else {
            return Err(HarvestError::navigation(url, "page session closed"));
        };

        let mut failures = 0;
        let nav = loop {
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
                res = tokio::time::timeout(timeout, driver.load(url, timeout)) => res,
            };
            let err = match attempt {
                Ok(Ok(nav)) => break nav,
                Ok(Err(e)) => e,
                Err(_) => anyhow::anyhow!("timed out after {:?}", timeout),
            };

            failures += 1;
            if failures >= retry.attempts {
                return Err(HarvestError::navigation(url, format!("{:#}", err)));
            }
            let backoff = retry.backoff_for(failures);
            tracing::warn!(
                "{}: load of {} failed ({:#}), retry {}/{} in {:?}",
                self.source,
                url,
                err,
                failures,
                retry.attempts - 1,
                backoff
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        };

        tracing::debug!(
            "{}: loaded {} (status {}, {}ms)",
            self.source,
            nav.final_url,
            nav.status,
            nav.load_time_ms
        );
        self.guard.check(&**driver, &nav, &cancel).await?;
        self.last_nav = Some(nav.clone());
        Ok(nav)
    }

    /// Re-run the guard on the current page after an in-page step
    pub async fn recheck(&mut self) -> Result<(), HarvestError> {
        let Some(nav) = self.last_nav.clone() else {
            return Ok(());
        };
        let driver = self.driver.as_deref().ok_or_else(|| self.closed())?;
        self.guard.check(driver, &nav, &self.ctx.cancel).await
    }

    /// Wait for `selector` to appear; a timeout means "no content"
    pub async fn wait_for_content(&mut self, selector: &str) -> Result<bool, HarvestError> {
        self.wait(WaitCondition::Selector(selector.to_string())).await
    }

    /// Wait for the document to grow past `height`
    pub async fn wait_for_growth(&mut self, height: u64) -> Result<bool, HarvestError> {
        self.wait(WaitCondition::HeightAbove(height)).await
    }

    async fn wait(&mut self, condition: WaitCondition) -> Result<bool, HarvestError> {
        let timeout = self.ctx.timeout;
        let cancel = self.ctx.cancel.clone();
        let source = self.source;
        let driver = self.driver.as_mut().ok_or_else(|| HarvestError::navigation("about:blank", "page session closed"))?;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
            res = tokio::time::timeout(timeout, driver.wait_for(&condition, timeout)) => res,
        };
        match outcome {
            Ok(Ok(WaitOutcome::Ready)) => Ok(true),
            Ok(Ok(WaitOutcome::TimedOut)) | Err(_) => {
                tracing::debug!("{}: wait for {:?} timed out", source, condition);
                Ok(false)
            }
            Ok(Err(e)) => {
                tracing::warn!("{}: wait for {:?} failed: {:#}", source, condition, e);
                Ok(false)
            }
        }
    }

    /// Structured extraction from the current page
    pub async fn extract(&self, query: &DomQuery) -> Result<Vec<DomRecord>, HarvestError> {
        let driver = self.driver.as_deref().ok_or_else(|| self.closed())?;
        driver
            .query_dom(query)
            .await
            .map_err(|e| HarvestError::ExtractionError(format!("{:#}", e)))
    }

    /// Whether `selector` matches; probe failures count as absent
    pub async fn element_exists(&self, selector: &str) -> bool {
        let Some(driver) = self.driver.as_deref() else {
            return false;
        };
        match driver.element_exists(selector).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!("{}: probe '{}' failed: {:#}", self.source, selector, e);
                false
            }
        }
    }

    pub async fn scroll_by(&mut self, pixels: i64) -> Result<(), HarvestError> {
        let url = self.current_url().unwrap_or("about:blank").to_string();
        let driver = self.driver.as_mut().ok_or_else(|| HarvestError::navigation(&url, "page session closed"))?;
        driver
            .scroll_by(pixels)
            .await
            .map_err(|e| HarvestError::navigation(url, format!("scroll failed: {:#}", e)))
    }

    /// Click the first match of `selector`; false when nothing was clicked
    pub async fn click(&mut self, selector: &str) -> Result<bool, HarvestError> {
        let url = self.current_url().unwrap_or("about:blank").to_string();
        let driver = self.driver.as_mut().ok_or_else(|| HarvestError::navigation(&url, "page session closed"))?;
        driver
            .click(selector)
            .await
            .map_err(|e| HarvestError::navigation(url, format!("click on '{}' failed: {:#}", selector, e)))
    }

    /// Current document height; 0 when unknown
    pub async fn page_height(&self) -> u64 {
        match self.driver.as_deref() {
            Some(driver) => driver.page_height().await.unwrap_or(0),
            None => 0,
        }
    }

    /// Release the page; failures are logged, never raised
    pub async fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            match driver.close().await {
                Ok(()) => tracing::debug!("{}: page session closed", self.source),
                Err(e) => tracing::warn!("{}: failed to close page session: {:#}", self.source, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::guard::GuardState;
    use crate::harvest::politeness::{FixedClock, PolitenessConfig};
    use crate::harvest::scripted::ScriptedDriver;
    use chrono::NaiveDate;

    fn context(retry_attempts: u32) -> SessionContext {
        let now = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        SessionContext {
            delay: Arc::new(DelayPolicy::with_seed(
                PolitenessConfig {
                    base_delay: Duration::ZERO,
                    jitter_min: Duration::ZERO,
                    jitter_max: Duration::ZERO,
                },
                1,
            )),
            retry: RetryPolicy {
                attempts: retry_attempts,
                base: Duration::ZERO,
                max: Duration::ZERO,
            },
            timeout: Duration::from_secs(2),
            clock: Arc::new(FixedClock(now)),
            captcha: CaptchaSignal::new(),
            cancel: CancellationToken::new(),
        }
    }

    const OK_PAGE: &str = "<html><head><title>Acme Reviews</title></head><body><div class='r'>x</div></body></html>";

    #[tokio::test]
    async fn navigation_retries_transient_failures() {
        let driver = ScriptedDriver::new()
            .page("https://site/a", OK_PAGE)
            .fail_times("https://site/a", 2);
        let log = driver.load_log();
        let mut session = PageSession::new(SourceKind::G2, Box::new(driver), context(3));

        let nav = session.navigate("https://site/a").await.unwrap();
        assert_eq!(nav.title, "Acme Reviews");
        assert_eq!(log.lock().len(), 3);
        assert_eq!(session.current_url(), Some("https://site/a"));
    }

    #[tokio::test]
    async fn navigation_gives_up_after_attempts() {
        let driver = ScriptedDriver::new().page("https://site/a", OK_PAGE).fail_times("https://site/a", 5);
        let mut session = PageSession::new(SourceKind::G2, Box::new(driver), context(2));

        let err = session.navigate("https://site/a").await.unwrap_err();
        assert!(matches!(err, HarvestError::NavigationFailure { .. }));
    }

    #[tokio::test]
    async fn blocked_page_aborts() {
        let blocked = "<html><head><title>Access Denied</title></head><body></body></html>";
        let driver = ScriptedDriver::new().page("https://site/a", blocked);
        let mut session = PageSession::new(SourceKind::Capterra, Box::new(driver), context(3));

        let err = session.navigate("https://site/a").await.unwrap_err();
        assert!(matches!(err, HarvestError::BlockingDetected { ref signal, .. } if signal == "access denied"));
        assert!(matches!(session.guard().state(), GuardState::Blocked { .. }));
    }

    #[tokio::test]
    async fn captcha_waits_for_signal() {
        let captcha = "<html><head><title>Reviews</title></head><body><div class='g-recaptcha'></div></body></html>";
        let driver = ScriptedDriver::new().page("https://site/a", captcha);
        let ctx = context(1);
        let signal = ctx.captcha.clone();
        let mut session = PageSession::new(SourceKind::TrustRadius, Box::new(driver), ctx);

        signal.resolve();
        assert!(session.navigate("https://site/a").await.is_ok());
        assert_eq!(session.guard().state(), &GuardState::Clear);
    }

    #[tokio::test]
    async fn content_wait_timeout_is_not_an_error() {
        let driver = ScriptedDriver::new().page("https://site/a", OK_PAGE);
        let mut session = PageSession::new(SourceKind::G2, Box::new(driver), context(1));
        session.navigate("https://site/a").await.unwrap();

        assert!(session.wait_for_content(".r").await.unwrap());
        assert!(!session.wait_for_content(".missing").await.unwrap());
    }

    #[tokio::test]
    async fn closed_session_refuses_work() {
        let driver = ScriptedDriver::new().page("https://site/a", OK_PAGE);
        let mut session = PageSession::new(SourceKind::G2, Box::new(driver), context(1));
        session.close().await;
        session.close().await;

        assert!(session.navigate("https://site/a").await.is_err());
        assert_eq!(session.page_height().await, 0);
        assert!(!session.element_exists(".r").await);
    }

    #[tokio::test]
    async fn cancelled_session_stops_before_loading() {
        let driver = ScriptedDriver::new().page("https://site/a", OK_PAGE);
        let log = driver.load_log();
        let ctx = context(1);
        ctx.cancel.cancel();
        let mut session = PageSession::new(SourceKind::G2, Box::new(driver), ctx);

        assert!(matches!(session.navigate("https://site/a").await, Err(HarvestError::Cancelled)));
        assert!(log.lock().is_empty());
    }
}
