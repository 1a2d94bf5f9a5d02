//! Raw provider page records and the canonical page/document types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A page record as returned by the crawl provider.
///
/// Every field is optional on the wire; normalization decides what to do
/// with missing values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    /// Text extracted from the rendered HTML
    #[serde(default)]
    pub content: Option<String>,

    /// Markdown rendition, preferred over `content` when present
    #[serde(default)]
    pub markdown: Option<String>,

    #[serde(default)]
    pub metadata: Option<RawMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetadata {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub keywords: Option<Keywords>,

    #[serde(rename = "sourceURL", default)]
    pub source_url: Option<String>,
}

/// Keywords arrive either as a comma-separated string or as an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Keywords {
    List(Vec<String>),
    Csv(String),
}

impl Keywords {
    /// Trimmed, non-empty keywords in their original order.
    pub fn to_vec(&self) -> Vec<String> {
        let items: Vec<&str> = match self {
            Keywords::List(list) => list.iter().map(String::as_str).collect(),
            Keywords::Csv(csv) => csv.split(',').collect(),
        };

        items
            .into_iter()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A canonical page that survived normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

/// How the pages of a document were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrapeMethod {
    #[serde(rename = "multi-page-crawl")]
    MultiPageCrawl,
    #[serde(rename = "single-page-fallback")]
    SinglePageFallback,
}

impl ScrapeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeMethod::MultiPageCrawl => "multi-page-crawl",
            ScrapeMethod::SinglePageFallback => "single-page-fallback",
        }
    }
}

impl std::fmt::Display for ScrapeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate of every page scraped for one website.
///
/// Persisted as the website's `scraped_content` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedDocument {
    pub pages: Vec<ScrapedPage>,
    pub total_pages: usize,
    pub main_content: String,
    pub titles: Vec<String>,
    pub descriptions: Vec<String>,
    pub keywords: Vec<String>,
    pub scraped_at: DateTime<Utc>,
    pub method: ScrapeMethod,
}

impl CombinedDocument {
    pub fn is_empty(&self) -> bool {
        self.total_pages == 0
    }
}
