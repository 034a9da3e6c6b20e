//! Configuration for the review harvester

mod harvest;
mod logging;

pub use harvest::{BrowserConfig, HarvestConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default user agent for page sessions
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Harvest loop and pacing
    #[serde(default)]
    pub harvest: HarvestConfig,
    /// Page session settings
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        let h = &self.harvest;

        if h.limit == 0 {
            errors.push("limit must be positive".to_string());
        }
        if h.timeout_ms == 0 {
            errors.push("timeout_ms must be positive".to_string());
        }
        if h.jitter_min_ms > h.jitter_max_ms {
            errors.push(format!(
                "jitter_min_ms ({}) must not exceed jitter_max_ms ({})",
                h.jitter_min_ms, h.jitter_max_ms
            ));
        }
        if h.max_pages == 0 {
            errors.push("max_pages must be positive".to_string());
        }
        if h.max_scroll_attempts == 0 {
            errors.push("max_scroll_attempts must be positive".to_string());
        }
        if h.retry_attempts == 0 {
            errors.push("retry_attempts must be at least 1".to_string());
        }
        if h.retry_base_ms > h.retry_max_ms {
            errors.push(format!(
                "retry_base_ms ({}) must not exceed retry_max_ms ({})",
                h.retry_base_ms, h.retry_max_ms
            ));
        }
        if h.run_timeout_secs == Some(0) {
            errors.push("run_timeout_secs must be positive when set".to_string());
        }

        if let Some(proxy) = &self.browser.proxy {
            if let Err(e) = url::Url::parse(proxy) {
                errors.push(format!("proxy '{}' is not a valid URL: {}", proxy, e));
            }
        }
        if self.browser.user_agent.trim().is_empty() {
            errors.push("user_agent must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
