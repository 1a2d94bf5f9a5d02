//! Database fixtures shared by integration tests.

use chrono::{SubsecRound, Utc};
use crawl_client::{aggregate, CombinedDocument, ScrapeMethod, ScrapedPage};
use server_core::domains::website::Website;
use server_core::kernel::ManualClock;
use sqlx::PgPool;

/// Manual clock starting at a whole second, so timestamps survive the
/// microsecond precision of `TIMESTAMPTZ` unchanged.
pub fn db_clock() -> ManualClock {
    ManualClock::new(Utc::now().trunc_subsecs(0))
}

/// Insert a website row in `pending`.
pub async fn create_website(pool: &PgPool, url: &str) -> Website {
    Website::new(url, Some("Example".into()), None, Utc::now().trunc_subsecs(0))
        .insert(pool)
        .await
        .expect("Failed to insert website")
}

pub fn document(urls: &[&str]) -> CombinedDocument {
    let pages = urls
        .iter()
        .map(|url| ScrapedPage {
            url: url.to_string(),
            title: format!("Title for {}", url),
            content: format!("Content for {} with enough words to be useful.", url),
            description: None,
            keywords: None,
        })
        .collect();
    aggregate(pages, ScrapeMethod::MultiPageCrawl, Utc::now().trunc_subsecs(0))
}
