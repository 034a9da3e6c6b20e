//! Capterra: search-and-match, then "show more" plus scrolling

use async_trait::async_trait;
use url::Url;

use super::{ensure_listed, records_from_cards, PaginationCursor, SourceDriver};
use crate::error::HarvestError;
use crate::harvest::driver::{DomQuery, DomRecord};
use crate::harvest::session::PageSession;
use crate::types::{HarvestBatch, SourceKind};

const SEARCH_URL: &str = "https://www.capterra.com/search/";
const SEARCH_RESULT: &str = "[data-testid='product-card'], .product-card";
const REVIEW_CARD: &str = "[data-test-id='review-card'], .review-card";
const SHOW_MORE: &str = "button[data-testid='show-more-reviews'], button.show-more";
const SCROLL_STEP: i64 = 2400;

fn search_query() -> DomQuery {
    DomQuery::new(SEARCH_RESULT)
        .text("name", "h2, .product-name")
        .attr("href", "a[href]", "href")
}

fn review_query() -> DomQuery {
    DomQuery::new(REVIEW_CARD)
        .own_attr("id", "data-review-id")
        .text("title", "h3, .review-title")
        .text("content", ".review-text, [data-testid='review-content']")
        .attr("rating", "[data-testid='rating']", "aria-label")
        .text("author", ".reviewer-name, [data-testid='reviewer-full-name']")
        .text("date", ".review-date, [data-testid='review-date']")
        .text("pros", ".review-pros, [data-testid='pros']")
        .text("cons", ".review-cons, [data-testid='cons']")
        .text("job_title", ".reviewer-title, [data-testid='reviewer-job-title']")
        .text("company_size", ".reviewer-company-size")
        .text("industry", ".reviewer-industry")
        .text("helpful", ".helpful-count")
}

/// Result whose name contains the identifier, else the first with a link
fn pick_result<'a>(results: &'a [DomRecord], identifier: &str) -> Option<&'a DomRecord> {
    let wanted = identifier.trim().to_lowercase();
    let linked = || results.iter().filter(|r| r.get("href").is_some());
    linked()
        .find(|r| r.get("name").is_some_and(|n| n.to_lowercase().contains(&wanted)))
        .or_else(|| linked().next())
}

/// Absolute review-listing URL for a product link
fn reviews_url(base: &Url, href: &str) -> Result<String, HarvestError> {
    let mut url = base.join(href).map_err(|e| HarvestError::navigation(href, e))?;
    url.set_query(None);
    url.set_fragment(None);
    if !url.path().contains("/reviews") {
        let path = format!("{}/reviews/", url.path().trim_end_matches('/'));
        url.set_path(&path);
    }
    Ok(url.to_string())
}

pub struct CapterraSource {
    session: PageSession,
    max_scroll_attempts: u32,
}

impl CapterraSource {
    pub fn new(session: PageSession, max_scroll_attempts: u32) -> Self {
        Self {
            session,
            max_scroll_attempts,
        }
    }

    /// Reveal more cards; false when the page offered nothing new
    async fn reveal_more(&mut self, last_height: u64) -> Result<bool, HarvestError> {
        self.session.pause().await?;
        let clicked = self.session.click(SHOW_MORE).await?;
        if !clicked {
            self.session.scroll_by(SCROLL_STEP).await?;
        }
        let grew = self.session.wait_for_growth(last_height).await?;
        self.session.recheck().await?;
        Ok(clicked || grew)
    }
}

#[async_trait]
impl SourceDriver for CapterraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Capterra
    }

    async fn resolve_product_url(&mut self, identifier: &str) -> Result<Option<String>, HarvestError> {
        let mut search = Url::parse(SEARCH_URL).map_err(|e| HarvestError::navigation(SEARCH_URL, e))?;
        search.query_pairs_mut().append_pair("query", identifier.trim());

        self.session.navigate(search.as_str()).await?;
        if !self.session.wait_for_content(SEARCH_RESULT).await? {
            tracing::info!("Capterra: no search results for '{}'", identifier);
            return Ok(None);
        }

        let results = self.session.extract(&search_query()).await?;
        let Some(hit) = pick_result(&results, identifier) else {
            return Ok(None);
        };
        let Some(href) = hit.get("href") else {
            return Ok(None);
        };
        tracing::debug!("Capterra: matched '{}'", hit.get("name").unwrap_or(href));
        reviews_url(&search, href).map(Some)
    }

    async fn fetch_next_batch(&mut self, cursor: &mut PaginationCursor) -> Result<HarvestBatch, HarvestError> {
        if cursor.page == 0 {
            let nav = self.session.navigate(&cursor.product_url).await?;
            ensure_listed(SourceKind::Capterra, &nav, &cursor.product_url)?;
            if !self.session.wait_for_content(REVIEW_CARD).await? {
                cursor.exhausted = true;
                return Ok(HarvestBatch::empty());
            }
        } else if !self.reveal_more(cursor.last_height).await? {
            tracing::debug!("Capterra: no show-more button and no growth after step {}", cursor.page);
            cursor.exhausted = true;
            return Ok(HarvestBatch::empty());
        }

        let step = cursor.page;
        cursor.page += 1;
        cursor.last_height = self.session.page_height().await;

        let cards = self.session.extract(&review_query()).await?;
        let records = records_from_cards(&self.session, &cards, cursor.offset, step);
        cursor.offset = cursor.offset.max(cards.len());

        if cursor.page > self.max_scroll_attempts {
            tracing::debug!("Capterra: reached max_scroll_attempts ({})", self.max_scroll_attempts);
            cursor.exhausted = true;
        }
        Ok(HarvestBatch::new(records))
    }

    async fn cleanup(&mut self) {
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::scripted::ScriptedDriver;
    use crate::harvest::sources::test_support::session;

    const SEARCH: &str = "https://www.capterra.com/search/?query=Acme+CRM";
    const PRODUCT: &str = "https://www.capterra.com/p/1234/Acme-CRM/reviews/";

    fn result(name: &str, href: &str) -> DomRecord {
        DomRecord::default().with("name", name).with("href", href)
    }

    fn cards(n: usize, more: bool) -> String {
        let cards: String = (0..n)
            .map(|i| format!(r#"<div class="review-card"><h3>T{i}</h3><p class="review-text">Text {i}</p></div>"#))
            .collect();
        let more = if more { r#"<button class="show-more">Show more</button>"# } else { "" };
        format!("<html><head><title>Acme CRM</title></head><body>{cards}{more}</body></html>")
    }

    #[test]
    fn substring_match_beats_first_result() {
        let results = vec![result("Other Suite", "/p/1/Other/"), result("ACME CRM Pro", "/p/2/Acme/")];
        assert_eq!(pick_result(&results, "acme crm").unwrap().get("href"), Some("/p/2/Acme/"));
        assert_eq!(pick_result(&results, "zzz").unwrap().get("href"), Some("/p/1/Other/"));
        assert!(pick_result(&[], "acme").is_none());
    }

    #[test]
    fn product_links_become_review_urls() {
        let base = Url::parse(SEARCH).unwrap();
        assert_eq!(reviews_url(&base, "/p/1234/Acme-CRM/").unwrap(), PRODUCT);
        assert_eq!(reviews_url(&base, "/p/1234/Acme-CRM/reviews/?page=2").unwrap(), PRODUCT);
    }

    #[tokio::test]
    async fn search_resolves_matching_product() {
        let page = r#"<html><body>
            <div class="product-card"><h2>Another CRM</h2><a href="/p/99/Another/">x</a></div>
            <div class="product-card"><h2>Acme CRM</h2><a href="/p/1234/Acme-CRM/">x</a></div>
        </body></html>"#;
        let driver = ScriptedDriver::new().page(SEARCH, page);
        let mut capterra = CapterraSource::new(session(SourceKind::Capterra, driver), 10);

        let url = capterra.resolve_product_url("Acme CRM").await.unwrap();
        assert_eq!(url.as_deref(), Some(PRODUCT));
    }

    #[tokio::test]
    async fn no_search_results_is_not_an_error() {
        let driver = ScriptedDriver::new().page(SEARCH, "<html><body>Nothing</body></html>");
        let mut capterra = CapterraSource::new(session(SourceKind::Capterra, driver), 10);
        assert_eq!(capterra.resolve_product_url("Acme CRM").await.unwrap(), None);
    }

    #[tokio::test]
    async fn show_more_reveals_only_new_cards() {
        let (v1, v2) = (cards(2, true), cards(5, false));
        let driver = ScriptedDriver::new().versions(PRODUCT, &[&v1, &v2]);
        let mut capterra = CapterraSource::new(session(SourceKind::Capterra, driver), 10);
        let mut cursor = PaginationCursor::new(PRODUCT);

        let first = capterra.fetch_next_batch(&mut cursor).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.records[0].id, "capterra-0-0");

        let second = capterra.fetch_next_batch(&mut cursor).await.unwrap();
        let titles: Vec<_> = second.records.iter().filter_map(|r| r.title.as_deref()).collect();
        assert_eq!(titles, vec!["T2", "T3", "T4"]);
        assert_eq!(second.records[0].id, "capterra-1-2");

        let third = capterra.fetch_next_batch(&mut cursor).await.unwrap();
        assert!(third.is_empty());
        assert!(cursor.exhausted);
    }
}
