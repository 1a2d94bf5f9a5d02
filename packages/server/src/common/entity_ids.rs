//! Typed ID definitions for ingestion entities.

pub use super::id::Id;

/// Marker type for Website entities.
pub struct Website;

/// Marker type for IngestionJob entities.
pub struct IngestionJob;

/// Marker type for chatbots produced by prompt generation.
pub struct Chatbot;

/// Typed ID for Website entities.
pub type WebsiteId = Id<Website>;

/// Typed ID for IngestionJob entities.
pub type IngestionJobId = Id<IngestionJob>;

/// Typed ID for Chatbot entities.
pub type ChatbotId = Id<Chatbot>;
