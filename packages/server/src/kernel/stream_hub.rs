//! Generic in-process pub/sub hub for real-time streaming.
//!
//! Provides topic-keyed broadcast channels for pushing events to SSE endpoints.
//! Topics are opaque strings; the hub has no knowledge of what's being streamed.
//!
//! # Usage
//!
//! Producers (the website status register, through [`BaseWebsiteEventSink`]):
//!   hub.publish("website:abc-123", json!({"type": "website_status", "status": "scraping"})).await;
//!
//! Consumers (SSE endpoints):
//!   let rx = hub.subscribe("website:abc-123").await;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use super::traits::BaseWebsiteEventSink;
use crate::domains::website::WebsiteStatusChanged;

/// Generic in-process pub/sub hub.
///
/// Thread-safe, cloneable. Keyed by string topics.
/// Payloads are `serde_json::Value`; domains serialize their own types.
#[derive(Clone)]
pub struct StreamHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>>,
    capacity: usize,
}

impl StreamHub {
    /// Create a new StreamHub with default capacity (64 messages per channel).
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a new StreamHub with the given channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Publish a JSON value to a topic. Returns the number of receivers
    /// reached; zero when nobody is subscribed.
    pub async fn publish(&self, topic: &str, value: serde_json::Value) -> usize {
        let channels = self.channels.read().await;
        match channels.get(topic) {
            Some(tx) => tx.send(value).unwrap_or(0),
            None => 0,
        }
    }

    /// Subscribe to a topic. Creates the channel if it doesn't exist.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<serde_json::Value> {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tx.subscribe()
    }

    /// Remove channels with zero subscribers (housekeeping).
    pub async fn cleanup(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseWebsiteEventSink for StreamHub {
    async fn publish(&self, event: &WebsiteStatusChanged) -> Result<()> {
        let topic = WebsiteStatusChanged::topic(event.website_id);
        StreamHub::publish(self, &topic, event.to_json()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::WebsiteId;
    use crate::domains::website::WebsiteStatus;

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let hub = StreamHub::new();
        let mut rx = hub.subscribe("website:abc").await;

        let value = serde_json::json!({"type": "website_status", "status": "ready"});
        assert_eq!(hub.publish("website:abc", value.clone()).await, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, value);
    }

    #[tokio::test]
    async fn test_publish_no_subscribers_is_noop() {
        let hub = StreamHub::new();
        let reached = hub
            .publish("nobody:listening", serde_json::json!({"data": "dropped"}))
            .await;
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn test_cleanup_removes_empty_channels() {
        let hub = StreamHub::new();
        let rx = hub.subscribe("ephemeral:topic").await;

        assert_eq!(hub.channels.read().await.len(), 1);

        drop(rx);
        hub.cleanup().await;

        assert_eq!(hub.channels.read().await.len(), 0);
    }

    #[tokio::test]
    async fn test_status_events_reach_only_that_website() {
        let hub = StreamHub::new();
        let watched = WebsiteId::new();
        let other = WebsiteId::new();
        let mut rx = hub.subscribe(&WebsiteStatusChanged::topic(watched)).await;

        let sink: &dyn BaseWebsiteEventSink = &hub;
        sink.publish(&WebsiteStatusChanged {
            website_id: other,
            status: WebsiteStatus::Ready,
        })
        .await
        .unwrap();
        sink.publish(&WebsiteStatusChanged {
            website_id: watched,
            status: WebsiteStatus::Scraping,
        })
        .await
        .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received["status"], "scraping");
        assert_eq!(received["website_id"], watched.to_string());
        assert!(rx.try_recv().is_err());
    }
}
