//! TrustRadius: slug URLs, infinite scroll with no end marker

use async_trait::async_trait;

use super::{ensure_listed, records_from_cards, slugify, PaginationCursor, SourceDriver};
use crate::error::HarvestError;
use crate::harvest::driver::DomQuery;
use crate::harvest::session::PageSession;
use crate::types::{HarvestBatch, SourceKind};

const PRODUCT_BASE: &str = "https://www.trustradius.com/products";
const REVIEW_CARD: &str = "article[data-review-id], .review-card";
const SCROLL_STEP: i64 = 3000;

fn review_query() -> DomQuery {
    DomQuery::new(REVIEW_CARD)
        .own_attr("id", "data-review-id")
        .text("title", "h3, .review-title")
        .text("content", ".review-content, [data-testid='review-body']")
        .attr("rating", "[data-rating]", "data-rating")
        .text("author", ".reviewer-name")
        .attr("date", "time", "datetime")
        .text("pros", ".pros")
        .text("cons", ".cons")
        .text("job_title", ".reviewer-position")
        .text("company_size", ".company-size")
        .text("industry", ".reviewer-industry")
        .text("verified", ".verified-user")
}

pub struct TrustRadiusSource {
    session: PageSession,
    max_scroll_attempts: u32,
}

impl TrustRadiusSource {
    pub fn new(session: PageSession, max_scroll_attempts: u32) -> Self {
        Self {
            session,
            max_scroll_attempts,
        }
    }
}

#[async_trait]
impl SourceDriver for TrustRadiusSource {
    fn kind(&self) -> SourceKind {
        SourceKind::TrustRadius
    }

    async fn resolve_product_url(&mut self, identifier: &str) -> Result<Option<String>, HarvestError> {
        let slug = slugify(identifier);
        if slug.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("{}/{}/reviews", PRODUCT_BASE, slug)))
    }

    async fn fetch_next_batch(&mut self, cursor: &mut PaginationCursor) -> Result<HarvestBatch, HarvestError> {
        if cursor.page == 0 {
            let nav = self.session.navigate(&cursor.product_url).await?;
            ensure_listed(SourceKind::TrustRadius, &nav, &cursor.product_url)?;
            if !self.session.wait_for_content(REVIEW_CARD).await? {
                cursor.exhausted = true;
                return Ok(HarvestBatch::empty());
            }
        } else {
            self.session.pause().await?;
            self.session.scroll_by(SCROLL_STEP).await?;
            self.session.wait_for_growth(cursor.last_height).await?;
            self.session.recheck().await?;
        }

        let step = cursor.page;
        cursor.page += 1;
        cursor.last_height = self.session.page_height().await;

        let cards = self.session.extract(&review_query()).await?;
        let records = records_from_cards(&self.session, &cards, cursor.offset, step);
        cursor.offset = cursor.offset.max(cards.len());

        // The list never says it is done; only the attempt cap ends it
        if cursor.page > self.max_scroll_attempts {
            tracing::debug!("TrustRadius: reached max_scroll_attempts ({})", self.max_scroll_attempts);
            cursor.exhausted = true;
        }
        Ok(HarvestBatch::new(records))
    }

    async fn cleanup(&mut self) {
        self.session.close().await;
    }
}
