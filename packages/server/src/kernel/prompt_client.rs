use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::BasePromptGenerator;
use crate::common::{ChatbotId, WebsiteId};

/// Client for the prompt-generation service.
pub struct HttpPromptGenerator {
    base_url: String,
    client: reqwest::Client,
}

/// Prompt service request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    website_id: WebsiteId,
}

/// Prompt service response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    chatbot_id: ChatbotId,
}

impl HttpPromptGenerator {
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url).context("Invalid PROMPT_SERVICE_URL")?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl BasePromptGenerator for HttpPromptGenerator {
    async fn generate_prompt(&self, website_id: WebsiteId) -> Result<Option<ChatbotId>> {
        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&GenerateRequest { website_id })
            .send()
            .await
            .context("Failed to reach prompt service")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Prompt service returned {}: {}", status, body);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse prompt service response")?;

        Ok(Some(body.chatbot_id))
    }
}

/// Stand-in used when no prompt service is configured.
#[derive(Debug, Default)]
pub struct NoopPromptGenerator;

#[async_trait]
impl BasePromptGenerator for NoopPromptGenerator {
    async fn generate_prompt(&self, website_id: WebsiteId) -> Result<Option<ChatbotId>> {
        warn!(website_id = %website_id, "PROMPT_SERVICE_URL not set, skipping prompt generation");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = HttpPromptGenerator::new("http://prompts.internal:9000/").unwrap();
        assert_eq!(client.base_url, "http://prompts.internal:9000");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(HttpPromptGenerator::new("prompts.internal").is_err());
    }

    #[test]
    fn request_uses_camel_case() {
        let id = WebsiteId::nil();
        let json = serde_json::to_value(GenerateRequest { website_id: id }).unwrap();
        assert_eq!(json, serde_json::json!({ "websiteId": id.to_string() }));
    }

    #[tokio::test]
    async fn noop_generator_skips() {
        let result = NoopPromptGenerator
            .generate_prompt(WebsiteId::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
