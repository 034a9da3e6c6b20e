//! Page driver abstraction
//!
//! A `PageDriver` is one isolated page session (a browser tab, or anything
//! that can load a URL and answer DOM queries). Source adapters only talk to
//! pages through this trait, so a real browser, a plain HTTP fetcher and a
//! scripted test double are interchangeable.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::BrowserConfig;
use crate::types::SourceKind;

/// Result of navigating to a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// URL after redirects
    pub final_url: String,
    /// HTTP status code
    pub status: u16,
    /// Document title
    pub title: String,
    /// Load time in milliseconds
    pub load_time_ms: u64,
}

/// Outcome of waiting for a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

/// Condition a driver can wait on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// At least one element matches the selector
    Selector(String),
    /// Document height grew past the given value
    HeightAbove(u64),
}

/// Where a field's value comes from inside a container element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Concatenated text content
    Text,
    /// Value of an attribute
    Attr(String),
}

/// One named field to pull out of every container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    /// Selector relative to the container; `None` means the container itself
    pub selector: Option<String>,
    pub source: FieldSource,
}

/// Structured extraction request: one record per `container` match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomQuery {
    pub container: String,
    pub fields: Vec<FieldSpec>,
}

impl DomQuery {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            fields: Vec::new(),
        }
    }

    /// Pull the text of `selector` into `name`
    pub fn text(mut self, name: &str, selector: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            selector: Some(selector.to_string()),
            source: FieldSource::Text,
        });
        self
    }

    /// Pull attribute `attr` of `selector` into `name`
    pub fn attr(mut self, name: &str, selector: &str, attr: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            selector: Some(selector.to_string()),
            source: FieldSource::Attr(attr.to_string()),
        });
        self
    }

    /// Pull attribute `attr` of the container itself into `name`
    pub fn own_attr(mut self, name: &str, attr: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            selector: None,
            source: FieldSource::Attr(attr.to_string()),
        });
        self
    }
}

/// Raw field values extracted from one container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomRecord {
    pub fields: HashMap<String, String>,
}

impl DomRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

/// Options every session is opened with
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub headless: bool,
    pub block_resources: bool,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

impl DriverOptions {
    pub fn from_config(browser: &BrowserConfig, timeout: Duration) -> Self {
        Self {
            headless: browser.headless,
            block_resources: browser.block_resources,
            proxy: browser.proxy.clone(),
            user_agent: browser.user_agent.clone(),
            timeout,
        }
    }
}

/// One page session
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL
    async fn load(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult>;
    /// Run a structured extraction against the current document
    async fn query_dom(&self, query: &DomQuery) -> Result<Vec<DomRecord>>;
    /// Scroll the viewport by `pixels`
    async fn scroll_by(&mut self, pixels: i64) -> Result<()>;
    /// Click the first element matching `selector`; false when none exists
    async fn click(&mut self, selector: &str) -> Result<bool>;
    /// Wait for a condition up to `timeout`
    async fn wait_for(&mut self, condition: &WaitCondition, timeout: Duration) -> Result<WaitOutcome>;
    /// Title of the current document
    async fn current_title(&self) -> Result<String>;
    /// Scrollable height of the current document
    async fn page_height(&self) -> Result<u64>;
    /// Release the session
    async fn close(self: Box<Self>) -> Result<()>;

    /// Whether any element matches `selector`
    async fn element_exists(&self, selector: &str) -> Result<bool> {
        Ok(!self.query_dom(&DomQuery::new(selector)).await?.is_empty())
    }
}

/// Opens isolated page sessions
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open_session(&self, source: SourceKind) -> Result<Box<dyn PageDriver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder_collects_fields_in_order() {
        let q = DomQuery::new(".review")
            .own_attr("id", "data-id")
            .text("body", ".body")
            .attr("rating", ".stars", "aria-label");

        assert_eq!(q.container, ".review");
        let names: Vec<_> = q.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "body", "rating"]);
        assert_eq!(q.fields[0].selector, None);
        assert_eq!(q.fields[2].source, FieldSource::Attr("aria-label".to_string()));
    }

    #[test]
    fn driver_options_follow_browser_config() {
        let browser = BrowserConfig {
            proxy: Some("http://proxy:3128".to_string()),
            headless: false,
            ..Default::default()
        };
        let opts = DriverOptions::from_config(&browser, Duration::from_secs(5));
        assert!(!opts.headless);
        assert!(opts.block_resources);
        assert_eq!(opts.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(opts.timeout, Duration::from_secs(5));
    }
}
