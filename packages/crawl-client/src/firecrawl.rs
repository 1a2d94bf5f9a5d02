//! Firecrawl HTTP client.
//!
//! Speaks the Firecrawl v0 API:
//! - `POST /crawl` starts a crawl and answers with a `jobId` (or, for small
//!   sites, the pages inline)
//! - `GET /crawl/status/{jobId}` reports progress and, once complete, the pages
//! - `POST /scrape` fetches a single page synchronously

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::credentials::SecretString;
use crate::error::{CrawlClientError, CrawlResult};
use crate::provider::{CrawlProvider, CrawlStart, CrawlStatus};
use crate::types::RawPage;

pub const DEFAULT_FIRECRAWL_API_URL: &str = "https://api.firecrawl.dev/v0";

const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Firecrawl-backed [`CrawlProvider`].
pub struct FirecrawlClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    page_limit: u32,
}

// Request/Response types for the Firecrawl API

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlRequest<'a> {
    url: &'a str,
    crawler_options: CrawlerOptions,
    page_options: PageOptions,
}

#[derive(Serialize)]
struct CrawlerOptions {
    limit: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageOptions {
    only_main_content: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    page_options: PageOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrawlStartResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    data: Option<Vec<RawPage>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrawlStatusResponse {
    status: String,
    #[serde(default)]
    data: Option<Vec<RawPage>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<RawPage>,
    #[serde(default)]
    error: Option<String>,
}

impl FirecrawlClient {
    /// Create a client against the public Firecrawl API.
    ///
    /// Fails with [`CrawlClientError::MissingCredential`] when the key is blank.
    pub fn new(api_key: impl Into<SecretString>) -> CrawlResult<Self> {
        let api_key = api_key.into();
        if api_key.is_blank() {
            return Err(CrawlClientError::MissingCredential);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(CrawlClientError::Transport)?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_FIRECRAWL_API_URL.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
        })
    }

    /// Point the client at another API root (self-hosted Firecrawl, test server).
    pub fn with_base_url(mut self, base_url: &str) -> CrawlResult<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| CrawlClientError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        self.base_url = parsed.as_str().trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Maximum number of pages requested per crawl.
    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &T,
    ) -> CrawlResult<R> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(CrawlClientError::Transport)?;

        Self::decode(response).await
    }

    async fn get<R: for<'de> Deserialize<'de>>(&self, path: &str) -> CrawlResult<R> {
        let response = self
            .client
            .get(self.endpoint(path))
            .bearer_auth(self.api_key.expose())
            .send()
            .await
            .map_err(CrawlClientError::Transport)?;

        Self::decode(response).await
    }

    async fn decode<R: for<'de> Deserialize<'de>>(response: reqwest::Response) -> CrawlResult<R> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CrawlClientError::from_status(status, text));
        }

        let bytes = response.bytes().await.map_err(CrawlClientError::Transport)?;
        serde_json::from_slice(&bytes).map_err(|e| CrawlClientError::Decode(e.to_string()))
    }
}

fn parse_crawl_start(body: CrawlStartResponse) -> CrawlResult<CrawlStart> {
    if body.success == Some(false) {
        return Err(CrawlClientError::Upstream {
            status: 200,
            message: body.error.unwrap_or_else(|| "crawl was not started".to_string()),
        });
    }

    match (body.job_id, body.data) {
        (Some(job_id), _) if !job_id.is_empty() => Ok(CrawlStart::Job(job_id)),
        (_, Some(pages)) => Ok(CrawlStart::Inline(pages)),
        _ => Err(CrawlClientError::Decode(
            "crawl response carried neither jobId nor data".to_string(),
        )),
    }
}

/// Only statuses known to be in progress keep the poll loop going. Anything
/// else, such as `cancelled`, ends the crawl as failed.
fn parse_crawl_status(body: CrawlStatusResponse) -> CrawlStatus {
    match body.status.as_str() {
        "completed" => CrawlStatus::Completed(body.data.unwrap_or_default()),
        "active" | "pending" | "queued" | "waiting" | "paused" | "scraping" => {
            CrawlStatus::Running
        }
        "failed" => CrawlStatus::Failed(body.error),
        other => CrawlStatus::Failed(Some(
            body.error
                .unwrap_or_else(|| format!("crawl ended with status '{}'", other)),
        )),
    }
}

fn parse_scrape(body: ScrapeResponse) -> CrawlResult<RawPage> {
    if body.success == Some(false) {
        return Err(CrawlClientError::Upstream {
            status: 200,
            message: body.error.unwrap_or_else(|| "scrape failed".to_string()),
        });
    }

    body.data
        .ok_or_else(|| CrawlClientError::Decode("scrape response carried no data".to_string()))
}

#[async_trait]
impl CrawlProvider for FirecrawlClient {
    async fn start_crawl(&self, url: &str) -> CrawlResult<CrawlStart> {
        tracing::info!(url = %url, limit = self.page_limit, "Starting Firecrawl crawl");

        let request = CrawlRequest {
            url,
            crawler_options: CrawlerOptions {
                limit: self.page_limit,
            },
            page_options: PageOptions {
                only_main_content: true,
            },
        };

        let response: CrawlStartResponse = self.post("/crawl", &request).await?;
        parse_crawl_start(response)
    }

    async fn poll_crawl(&self, job_id: &str) -> CrawlResult<CrawlStatus> {
        let response: CrawlStatusResponse =
            self.get(&format!("/crawl/status/{}", job_id)).await?;

        tracing::debug!(job_id = %job_id, status = %response.status, "Firecrawl crawl status");
        Ok(parse_crawl_status(response))
    }

    async fn scrape_single_page(&self, url: &str) -> CrawlResult<RawPage> {
        tracing::info!(url = %url, "Scraping single page via Firecrawl");

        let request = ScrapeRequest {
            url,
            page_options: PageOptions {
                only_main_content: true,
            },
        };

        let response: ScrapeResponse = self.post("/scrape", &request).await?;
        parse_scrape(response)
    }

    fn name(&self) -> &str {
        "firecrawl"
    }
}
