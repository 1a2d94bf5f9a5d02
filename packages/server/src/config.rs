use anyhow::{bail, Context, Result};
use crawl_client::DEFAULT_FIRECRAWL_API_URL;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub firecrawl_api_key: String,
    pub firecrawl_api_url: String,
    pub crawl_page_limit: u32,
    pub crawl_poll_interval: Duration,
    pub crawl_poll_max_attempts: u32,
    pub queue_tick_interval: Duration,
    pub stale_job_timeout: Duration,
    pub prompt_service_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            database_url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_or(&var, "PORT", 8080)?,
            firecrawl_api_key: var("FIRECRAWL_API_KEY")
                .context("FIRECRAWL_API_KEY must be set")?,
            firecrawl_api_url: var("FIRECRAWL_API_URL")
                .unwrap_or_else(|| DEFAULT_FIRECRAWL_API_URL.to_string()),
            crawl_page_limit: parse_or(&var, "CRAWL_PAGE_LIMIT", 10)?,
            crawl_poll_interval: parse_secs(&var, "CRAWL_POLL_INTERVAL_SECS", 10)?,
            crawl_poll_max_attempts: parse_or(&var, "CRAWL_POLL_MAX_ATTEMPTS", 30)?,
            queue_tick_interval: parse_secs(&var, "QUEUE_TICK_INTERVAL_SECS", 30)?,
            stale_job_timeout: parse_secs(&var, "STALE_JOB_TIMEOUT_SECS", 900)?,
            prompt_service_url: var("PROMPT_SERVICE_URL"),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

/// A period in whole seconds. Zero is rejected.
fn parse_secs<F>(var: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(var, key, default)?;
    if secs == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_secs(secs))
}
