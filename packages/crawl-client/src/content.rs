//! Content normalization.
//!
//! Two pure functions: [`normalize_pages`] turns provider records into
//! [`ScrapedPage`]s, [`aggregate`] folds those pages into a
//! [`CombinedDocument`]. Neither touches the network or the clock.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;

use crate::types::{CombinedDocument, RawPage, ScrapeMethod, ScrapedPage};

/// Pages whose content is shorter than this (in characters) are dropped.
pub const MIN_CONTENT_CHARS: usize = 50;

/// Title used when the provider reports none.
pub const UNTITLED_PAGE: &str = "Untitled Page";

/// Normalize raw provider records.
///
/// `fallback_url` is used for records that carry no `sourceURL`, which is
/// the usual case for single-page scrapes.
pub fn normalize_pages(raw: &[RawPage], fallback_url: &str) -> Vec<ScrapedPage> {
    raw.iter()
        .map(|page| normalize_page(page, fallback_url))
        .filter(|page| page.content.chars().count() >= MIN_CONTENT_CHARS)
        .collect()
}

fn normalize_page(raw: &RawPage, fallback_url: &str) -> ScrapedPage {
    let metadata = raw.metadata.as_ref();

    let content = raw
        .markdown
        .as_deref()
        .filter(|m| !m.is_empty())
        .or(raw.content.as_deref())
        .unwrap_or_default()
        .to_string();

    let title = metadata
        .and_then(|m| m.title.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED_PAGE)
        .to_string();

    let url = metadata
        .and_then(|m| m.source_url.as_deref())
        .filter(|u| !u.is_empty())
        .unwrap_or(fallback_url)
        .to_string();

    let description = metadata
        .and_then(|m| m.description.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let keywords = metadata
        .and_then(|m| m.keywords.as_ref())
        .map(|k| k.to_vec())
        .filter(|k| !k.is_empty());

    ScrapedPage {
        url,
        title,
        content,
        description,
        keywords,
    }
}

/// Fold normalized pages into one document.
///
/// Keywords are deduplicated keeping first-seen order; page contents are
/// joined with a blank line between pages.
pub fn aggregate(
    pages: Vec<ScrapedPage>,
    method: ScrapeMethod,
    scraped_at: DateTime<Utc>,
) -> CombinedDocument {
    let main_content = pages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let titles = pages.iter().map(|p| p.title.clone()).collect();

    let descriptions = pages
        .iter()
        .filter_map(|p| p.description.clone())
        .collect();

    let keywords: IndexSet<String> = pages
        .iter()
        .filter_map(|p| p.keywords.as_ref())
        .flatten()
        .cloned()
        .collect();

    CombinedDocument {
        total_pages: pages.len(),
        pages,
        main_content,
        titles,
        descriptions,
        keywords: keywords.into_iter().collect(),
        scraped_at,
        method,
    }
}
