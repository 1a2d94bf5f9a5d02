//! SSE endpoint streaming website status changes.
//!
//! Subscribes to a website's StreamHub topic and forwards each event as SSE.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::stream_hub::StreamHub;
use crate::common::WebsiteId;
use crate::domains::website::WebsiteStatusChanged;

/// Shared state for the SSE routes.
#[derive(Clone)]
pub struct SseState {
    pub stream_hub: StreamHub,
}

/// Build the axum router for SSE endpoints.
pub fn router(state: SseState) -> Router {
    Router::new()
        .route("/api/streams/websites/:website_id", get(website_status_stream))
        .with_state(state)
}

async fn website_status_stream(
    State(state): State<SseState>,
    Path(website_id): Path<WebsiteId>,
) -> impl IntoResponse {
    let rx = state
        .stream_hub
        .subscribe(&WebsiteStatusChanged::topic(website_id))
        .await;

    let stream = BroadcastStream::new(rx).map(|result| match result {
        Ok(value) => {
            let event_type = value
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("message");

            Ok::<_, Infallible>(Event::default().event(event_type).data(value.to_string()))
        }
        Err(BroadcastStreamRecvError::Lagged(_)) => {
            Ok(Event::default().event("lagged").data("{}"))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
