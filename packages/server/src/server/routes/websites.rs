//! Website registration, re-scrape and status endpoints.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::common::{IngestionJobId, WebsiteId};
use crate::domains::website::actions::{self, RegisterWebsite};
use crate::domains::website::{StatusView, WebsiteError};
use crate::kernel::jobs::JobPriority;
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWebsiteRequest {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: JobPriority,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWebsiteResponse {
    pub website_id: WebsiteId,
    pub job_id: IngestionJobId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescrapeRequest {
    #[serde(default)]
    pub priority: JobPriority,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescrapeResponse {
    pub job_id: IngestionJobId,
}

/// JSON error response: `{ "error": "..." }`.
pub struct ApiError(WebsiteError);

impl From<WebsiteError> for ApiError {
    fn from(err: WebsiteError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WebsiteError::NotFound(_) => StatusCode::NOT_FOUND,
            WebsiteError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            WebsiteError::InvalidTransition { .. } | WebsiteError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            WebsiteError::JobNotQueued(_) => StatusCode::SERVICE_UNAVAILABLE,
            WebsiteError::MissingContent(_) | WebsiteError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = ?self.0, "request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// POST /api/websites
pub async fn register_website_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<RegisterWebsiteRequest>,
) -> Result<(StatusCode, Json<RegisterWebsiteResponse>), ApiError> {
    let registered = actions::register_website(
        RegisterWebsite {
            url: body.url,
            title: body.title,
            description: body.description,
            priority: body.priority,
        },
        &state.deps,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterWebsiteResponse {
            website_id: registered.website.id,
            job_id: registered.job_id,
        }),
    ))
}

/// POST /api/websites/:website_id/rescrape
pub async fn rescrape_website_handler(
    Extension(state): Extension<AppState>,
    Path(website_id): Path<WebsiteId>,
    body: Option<Json<RescrapeRequest>>,
) -> Result<Json<RescrapeResponse>, ApiError> {
    let priority = body.map(|Json(b)| b.priority).unwrap_or_default();
    let job_id = actions::request_rescrape(website_id, priority, &state.deps).await?;
    Ok(Json(RescrapeResponse { job_id }))
}

/// GET /api/websites/:website_id/status
pub async fn website_status_handler(
    Extension(state): Extension<AppState>,
    Path(website_id): Path<WebsiteId>,
) -> Result<Json<StatusView>, ApiError> {
    let view = actions::get_status(website_id, &state.deps).await?;
    Ok(Json(view))
}
