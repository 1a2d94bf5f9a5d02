//! Application setup and server configuration.

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::sse::{self, SseState};
use crate::kernel::ServerDeps;
use crate::server::routes::{
    health_handler, register_website_handler, rescrape_website_handler, website_status_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: ServerDeps,
    /// Absent when running on in-memory stores
    pub db_pool: Option<PgPool>,
}

/// Build the Axum application router
pub fn build_app(deps: ServerDeps, db_pool: Option<PgPool>) -> Router {
    let sse_routes = sse::router(SseState {
        stream_hub: deps.stream_hub.clone(),
    });

    let app_state = AppState { deps, db_pool };

    // CORS configuration - allow any origin for development
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/websites", post(register_website_handler))
        .route(
            "/api/websites/:website_id/rescrape",
            post(rescrape_website_handler),
        )
        .route(
            "/api/websites/:website_id/status",
            get(website_status_handler),
        )
        .merge(sse_routes)
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
