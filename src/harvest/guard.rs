//! Anti-bot detection after every page load
//!
//! The guard moves between three states:
//! - `Clear`: extraction may proceed
//! - `Blocked`: an access-denied / rate-limit page was served; the source is
//!   abandoned and the condition reported, never retried
//! - `CaptchaPending`: a CAPTCHA widget is on the page; the harvest
//!   suspends until a human signals it has been solved
//!
//! The CAPTCHA wait has no timeout. It ends only through
//! [`CaptchaSignal::resolve`] or run cancellation.

use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::driver::{NavigationResult, PageDriver};
use crate::error::HarvestError;
use crate::util::truncate_str;

/// Case-insensitive substrings that mark a blocking page
pub const BLOCK_KEYWORDS: &[&str] = &[
    "access denied",
    "blocked",
    "captcha",
    "please verify",
    "security check",
    "403",
    "429",
];

/// Selectors whose presence means a CAPTCHA challenge is showing
pub const CAPTCHA_MARKERS: &[&str] = &[
    "iframe[src*='captcha']",
    ".g-recaptcha",
    ".h-captcha",
    "#px-captcha",
    "[data-sitekey]",
    "#challenge-form",
    "#cf-challenge-running",
];

/// Guard state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Clear,
    Blocked { signal: String },
    CaptchaPending,
}

/// External "CAPTCHA solved" signal.
///
/// Cloned handles share one channel. A resolve sent before anyone waits is
/// kept and consumed by the next wait.
#[derive(Debug, Clone, Default)]
pub struct CaptchaSignal {
    notify: Arc<Notify>,
}

impl CaptchaSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let one suspended harvest resume
    pub fn resolve(&self) {
        self.notify.notify_one();
    }

    /// Wait for a resolve, or fail when the run is cancelled
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), HarvestError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(HarvestError::Cancelled),
            _ = self.notify.notified() => Ok(()),
        }
    }
}

/// Per-session blocking guard
#[derive(Debug)]
pub struct BlockingGuard {
    state: GuardState,
    signal: CaptchaSignal,
    /// Page whose CAPTCHA a human already solved
    cleared_url: Option<String>,
}

impl BlockingGuard {
    pub fn new(signal: CaptchaSignal) -> Self {
        Self {
            state: GuardState::Clear,
            signal,
            cleared_url: None,
        }
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    /// First block keyword found in the page title or status
    pub fn match_block_signal(title: &str, status: u16) -> Option<&'static str> {
        let haystack = format!("{} {}", title.to_lowercase(), status);
        BLOCK_KEYWORDS.iter().copied().find(|k| haystack.contains(k))
    }

    /// Inspect the page just loaded; returns once the guard is `Clear`.
    pub async fn check(
        &mut self,
        page: &dyn PageDriver,
        nav: &NavigationResult,
        cancel: &CancellationToken,
    ) -> Result<(), HarvestError> {
        let title = match page.current_title().await {
            Ok(title) => title,
            Err(_) => nav.title.clone(),
        };

        if let Some(signal) = Self::match_block_signal(&title, nav.status) {
            tracing::warn!(
                "Blocking page at {} (status {}, title '{}')",
                nav.final_url,
                nav.status,
                truncate_str(&title, 80)
            );
            self.state = GuardState::Blocked {
                signal: signal.to_string(),
            };
            return Err(HarvestError::BlockingDetected {
                url: nav.final_url.clone(),
                signal: signal.to_string(),
            });
        }

        let already_cleared = self.cleared_url.as_deref() == Some(nav.final_url.as_str());
        if !already_cleared && self.captcha_present(page).await {
            self.state = GuardState::CaptchaPending;
            tracing::warn!(
                "CAPTCHA detected at {}; solve it in the browser, then signal to continue",
                nav.final_url
            );
            self.signal.wait(cancel).await?;
            tracing::info!("CAPTCHA resolved, resuming");
            self.cleared_url = Some(nav.final_url.clone());
        }

        self.state = GuardState::Clear;
        Ok(())
    }

    async fn captcha_present(&self, page: &dyn PageDriver) -> bool {
        for marker in CAPTCHA_MARKERS {
            match page.element_exists(marker).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => tracing::debug!("CAPTCHA probe '{}' failed: {}", marker, e),
            }
        }
        false
    }
}
