// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The ingestion pipeline and website register are domain code that use these traits.
//
// Naming convention: Base* for trait names (e.g., BasePromptGenerator)

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{ChatbotId, WebsiteId};
use crate::domains::website::WebsiteStatusChanged;

// =============================================================================
// Prompt Generation Trait (external collaborator)
// =============================================================================

#[async_trait]
pub trait BasePromptGenerator: Send + Sync {
    /// Turn a website's stored content into a chatbot system prompt.
    ///
    /// Returns the chatbot that now serves the prompt, or `None` when
    /// generation is disabled in this environment.
    async fn generate_prompt(&self, website_id: WebsiteId) -> Result<Option<ChatbotId>>;
}

// =============================================================================
// Website Event Sink Trait (realtime status notifications)
// =============================================================================

#[async_trait]
pub trait BaseWebsiteEventSink: Send + Sync {
    /// Publish a status change. Delivery is best effort.
    async fn publish(&self, event: &WebsiteStatusChanged) -> Result<()>;
}
