//! HTTP-backed page driver
//!
//! Fetches documents with reqwest and answers DOM queries with an HTML
//! parser. Scripts never run, so scrolling and clicking cannot reveal more
//! content: `scroll_by` is a no-op, `click` reports that nothing was
//! clicked, and `wait_for` evaluates its condition once against the
//! document as loaded.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::{Duration, Instant};

use super::driver::{
    DomQuery, DomRecord, DriverFactory, DriverOptions, FieldSource, NavigationResult, PageDriver,
    WaitCondition, WaitOutcome,
};
use crate::types::SourceKind;
use crate::util::collapse_whitespace;

/// Document currently held by a session
#[derive(Debug, Clone)]
struct LoadedPage {
    body: String,
    title: String,
}

/// Page driver that fetches over plain HTTP
pub struct HttpPageDriver {
    client: reqwest::Client,
    page: Option<LoadedPage>,
}

impl HttpPageDriver {
    /// Build a session with its own HTTP client
    pub fn new(options: &DriverOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout.min(Duration::from_secs(10)))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(&options.user_agent)
            .gzip(true)
            .brotli(true);

        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .with_context(|| format!("invalid proxy URL '{}'", proxy))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build().context("failed to build HTTP client")?,
            page: None,
        })
    }

    fn page(&self) -> Result<&LoadedPage> {
        self.page.as_ref().ok_or_else(|| anyhow!("no page loaded"))
    }
}

#[async_trait]
impl PageDriver for HttpPageDriver {
    async fn load(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if status.is_server_error() {
            bail!("server error {} from {}", status.as_u16(), url);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read body from {}", url))?;
        let title = document_title(&body);

        self.page = Some(LoadedPage {
            body,
            title: title.clone(),
        });

        Ok(NavigationResult {
            final_url,
            status: status.as_u16(),
            title,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn query_dom(&self, query: &DomQuery) -> Result<Vec<DomRecord>> {
        run_query(&self.page()?.body, query)
    }

    async fn scroll_by(&mut self, _pixels: i64) -> Result<()> {
        Ok(())
    }

    async fn click(&mut self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn wait_for(&mut self, condition: &WaitCondition, _timeout: Duration) -> Result<WaitOutcome> {
        let met = match condition {
            WaitCondition::Selector(selector) => self.element_exists(selector).await?,
            WaitCondition::HeightAbove(height) => self.page_height().await? > *height,
        };
        Ok(if met { WaitOutcome::Ready } else { WaitOutcome::TimedOut })
    }

    async fn current_title(&self) -> Result<String> {
        Ok(self.page()?.title.clone())
    }

    async fn page_height(&self) -> Result<u64> {
        Ok(self.page.as_ref().map(|p| p.body.len() as u64).unwrap_or(0))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Opens one `HttpPageDriver` per source
pub struct HttpDriverFactory {
    options: DriverOptions,
}

impl HttpDriverFactory {
    pub fn new(options: DriverOptions) -> Self {
        if !options.headless {
            tracing::debug!("HTTP driver has no window; ignoring headless = false");
        }
        Self { options }
    }
}

#[async_trait]
impl DriverFactory for HttpDriverFactory {
    async fn open_session(&self, source: SourceKind) -> Result<Box<dyn PageDriver>> {
        tracing::debug!("Opening HTTP session for {}", source);
        Ok(Box::new(HttpPageDriver::new(&self.options)?))
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector '{}': {:?}", selector, e))
}

/// Whitespace-collapsed `<title>` text; empty when missing
pub fn document_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default()
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Evaluate a structured query against an HTML document
pub fn run_query(html: &str, query: &DomQuery) -> Result<Vec<DomRecord>> {
    let document = Html::parse_document(html);
    let container = parse_selector(&query.container)?;

    let selectors = query
        .fields
        .iter()
        .map(|f| f.selector.as_deref().map(parse_selector).transpose())
        .collect::<Result<Vec<Option<Selector>>>>()?;

    let mut records = Vec::new();
    for element in document.select(&container) {
        let mut record = DomRecord::default();
        for (field, selector) in query.fields.iter().zip(&selectors) {
            let target = match selector {
                Some(sel) => element.select(sel).next(),
                None => Some(element),
            };
            let Some(target) = target else { continue };

            let value = match &field.source {
                FieldSource::Text => Some(element_text(target)),
                FieldSource::Attr(attr) => target.value().attr(attr).map(|v| v.trim().to_string()),
            };
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                record.fields.insert(field.name.clone(), value);
            }
        }
        records.push(record);
    }

    Ok(records)
}
