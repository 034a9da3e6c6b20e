//! In-memory page driver for tests
//!
//! Serves fixed HTML per URL. A page may have several versions: each scroll,
//! or each click on a matching element, reveals the next one. Clones share
//! the load log, so a factory can hand every session a copy of one script.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::driver::{DomQuery, DomRecord, NavigationResult, PageDriver, WaitCondition, WaitOutcome};
use super::http_driver::{document_title, run_query};

#[derive(Clone)]
struct ScriptedPage {
    status: u16,
    versions: Vec<String>,
    failures_left: u32,
}

#[derive(Clone, Default)]
pub struct ScriptedDriver {
    pages: HashMap<String, ScriptedPage>,
    current: Option<(String, usize)>,
    loads: Arc<Mutex<Vec<String>>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.versions(url, &[html])
    }

    pub fn page_with_status(self, url: &str, status: u16, html: &str) -> Self {
        self.page(url, html).status(url, status)
    }

    /// Serve `url` with a different HTTP status
    pub fn status(mut self, url: &str, status: u16) -> Self {
        if let Some(page) = self.pages.get_mut(url) {
            page.status = status;
        }
        self
    }

    pub fn versions(mut self, url: &str, versions: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            ScriptedPage {
                status: 200,
                versions: versions.iter().map(|v| v.to_string()).collect(),
                failures_left: 0,
            },
        );
        self
    }

    /// Fail the next `n` loads of `url`
    pub fn fail_times(mut self, url: &str, n: u32) -> Self {
        let page = self.pages.entry(url.to_string()).or_insert_with(|| ScriptedPage {
            status: 200,
            versions: vec![String::new()],
            failures_left: 0,
        });
        page.failures_left = n;
        self
    }

    /// URLs passed to `load`, in order
    pub fn load_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.loads.clone()
    }

    fn html(&self) -> Result<&str> {
        let Some((url, version)) = &self.current else {
            bail!("no page loaded");
        };
        let Some(page) = self.pages.get(url) else {
            bail!("unknown page {}", url);
        };
        Ok(&page.versions[*version])
    }

    fn advance(&mut self) -> bool {
        let Some((url, version)) = self.current.as_mut() else {
            return false;
        };
        let count = self.pages.get(url.as_str()).map(|p| p.versions.len()).unwrap_or(0);
        if *version + 1 < count {
            *version += 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn load(&mut self, url: &str, _timeout: Duration) -> Result<NavigationResult> {
        self.loads.lock().push(url.to_string());
        let Some(page) = self.pages.get_mut(url) else {
            bail!("no route for {}", url);
        };
        if page.failures_left > 0 {
            page.failures_left -= 1;
            bail!("connection reset");
        }
        let status = page.status;
        let title = document_title(&page.versions[0]);
        self.current = Some((url.to_string(), 0));
        Ok(NavigationResult {
            final_url: url.to_string(),
            status,
            title,
            load_time_ms: 1,
        })
    }

    async fn query_dom(&self, query: &DomQuery) -> Result<Vec<DomRecord>> {
        run_query(self.html()?, query)
    }

    async fn scroll_by(&mut self, _pixels: i64) -> Result<()> {
        self.advance();
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        if !self.element_exists(selector).await? {
            return Ok(false);
        }
        self.advance();
        Ok(true)
    }

    async fn wait_for(&mut self, condition: &WaitCondition, _timeout: Duration) -> Result<WaitOutcome> {
        let met = match condition {
            WaitCondition::Selector(selector) => self.element_exists(selector).await?,
            WaitCondition::HeightAbove(height) => self.page_height().await? > *height,
        };
        Ok(if met { WaitOutcome::Ready } else { WaitOutcome::TimedOut })
    }

    async fn current_title(&self) -> Result<String> {
        Ok(document_title(self.html()?))
    }

    async fn page_height(&self) -> Result<u64> {
        Ok(self.html().map(|h| h.len() as u64).unwrap_or(0))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
