//! G2: slug URLs, numbered pages

use async_trait::async_trait;
use url::Url;

use super::{ensure_listed, records_from_cards, slugify, PaginationCursor, SourceDriver};
use crate::error::HarvestError;
use crate::harvest::driver::DomQuery;
use crate::harvest::session::PageSession;
use crate::types::{HarvestBatch, SourceKind};

const PRODUCT_BASE: &str = "https://www.g2.com/products";
const REVIEW_CARD: &str = "div[itemprop='review']";
const NEXT_PAGE: &str = "a[rel='next'], li.pagination__item--next a";

fn review_query() -> DomQuery {
    DomQuery::new(REVIEW_CARD)
        .own_attr("id", "id")
        .text("title", "[itemprop='name']")
        .text("content", "[itemprop='reviewBody']")
        .attr("rating", "[itemprop='ratingValue']", "content")
        .text("author", "[itemprop='author']")
        .attr("date", "[itemprop='datePublished']", "content")
        .text("pros", "[data-test-id='review-pros']")
        .text("cons", "[data-test-id='review-cons']")
        .text("job_title", ".reviewer-job-title")
        .text("company_size", ".reviewer-company-size")
        .text("industry", ".reviewer-industry")
        .text("verified", ".verified-badge")
}

/// `product_url` with `?page=N`; page 1 is the bare URL
fn page_url(product_url: &str, page: u32) -> Result<String, HarvestError> {
    if page <= 1 {
        return Ok(product_url.to_string());
    }
    let mut url = Url::parse(product_url).map_err(|e| HarvestError::navigation(product_url, e))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page.to_string());
    Ok(url.to_string())
}

pub struct G2Source {
    session: PageSession,
    max_pages: u32,
}

impl G2Source {
    pub fn new(session: PageSession, max_pages: u32) -> Self {
        Self { session, max_pages }
    }
}

#[async_trait]
impl SourceDriver for G2Source {
    fn kind(&self) -> SourceKind {
        SourceKind::G2
    }

    async fn resolve_product_url(&mut self, identifier: &str) -> Result<Option<String>, HarvestError> {
        let slug = slugify(identifier);
        if slug.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("{}/{}/reviews", PRODUCT_BASE, slug)))
    }

    async fn fetch_next_batch(&mut self, cursor: &mut PaginationCursor) -> Result<HarvestBatch, HarvestError> {
        let page = cursor.page + 1;
        let url = page_url(&cursor.product_url, page)?;
        let nav = self.session.navigate(&url).await?;
        if page == 1 {
            ensure_listed(SourceKind::G2, &nav, &cursor.product_url)?;
        }
        cursor.page = page;

        if !self.session.wait_for_content(REVIEW_CARD).await? {
            tracing::debug!("G2: no reviews on page {}", page);
            cursor.exhausted = true;
            return Ok(HarvestBatch::empty());
        }

        let cards = self.session.extract(&review_query()).await?;
        let records = records_from_cards(&self.session, &cards, 0, page);

        if !self.session.element_exists(NEXT_PAGE).await {
            tracing::debug!("G2: page {} has no next link", page);
            cursor.exhausted = true;
        } else if page >= self.max_pages {
            tracing::debug!("G2: reached max_pages ({})", self.max_pages);
            cursor.exhausted = true;
        }

        Ok(HarvestBatch::new(records))
    }

    async fn cleanup(&mut self) {
        self.session.close().await;
    }
}
