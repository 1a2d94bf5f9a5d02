//! Website domain events
//!
//! Facts published to the website event sink after every status write.

use serde::{Deserialize, Serialize};

use crate::common::WebsiteId;
use crate::domains::website::models::WebsiteStatus;

/// A website row changed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteStatusChanged {
    pub website_id: WebsiteId,
    pub status: WebsiteStatus,
}

impl WebsiteStatusChanged {
    /// Stream topic carrying events for one website.
    pub fn topic(website_id: WebsiteId) -> String {
        format!("website:{}", website_id)
    }

    /// Wire form: `{"type": "website_status", "website_id", "status"}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "website_status",
            "website_id": self.website_id,
            "status": self.status,
        })
    }
}
