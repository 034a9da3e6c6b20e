//! Harvest pacing and browser session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::DEFAULT_USER_AGENT;

/// Harvest loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Records to collect per source
    pub limit: usize,
    /// Base delay between navigation steps (milliseconds)
    pub delay_ms: u64,
    /// Lower bound of the random jitter added to every delay (milliseconds)
    pub jitter_min_ms: u64,
    /// Upper bound of the random jitter added to every delay (milliseconds)
    pub jitter_max_ms: u64,
    /// Page load and content wait timeout (milliseconds)
    pub timeout_ms: u64,
    /// Maximum result pages per source for paginated sites
    pub max_pages: u32,
    /// Maximum scroll / "show more" steps for infinite-scroll sites
    pub max_scroll_attempts: u32,
    /// Run all selected sources concurrently, one page session each
    pub concurrent_sources: bool,
    /// Cancel the whole run after this many seconds
    pub run_timeout_secs: Option<u64>,
    /// Tries per navigation before giving up
    pub retry_attempts: u32,
    /// First retry backoff (milliseconds), doubled per attempt
    pub retry_base_ms: u64,
    /// Backoff ceiling (milliseconds)
    pub retry_max_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            delay_ms: 0,
            jitter_min_ms: 1000,
            jitter_max_ms: 3000,
            timeout_ms: 30_000,
            max_pages: 50,
            max_scroll_attempts: 10,
            concurrent_sources: false,
            run_timeout_secs: None,
            retry_attempts: 3,
            retry_base_ms: 500,
            retry_max_ms: 8_000,
        }
    }
}

impl HarvestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Configuration with every delay zeroed, for tests and dry runs
    pub fn without_delays() -> Self {
        Self {
            delay_ms: 0,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            retry_base_ms: 0,
            retry_max_ms: 0,
            ..Self::default()
        }
    }
}

/// Page session (browser) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run the browser without a window
    pub headless: bool,
    /// Skip images, fonts and media while loading pages
    pub block_resources: bool,
    /// Proxy URL for all page traffic
    pub proxy: Option<String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            block_resources: true,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
