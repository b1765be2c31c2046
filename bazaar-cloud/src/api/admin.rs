//! Events office review endpoints

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use shared::error::{AppError, ErrorCode};
use shared::models::BazaarApplication;

use super::ApiResult;
use crate::auth::Principal;
use crate::state::AppState;

/// GET /admin/events/{eventId}/applications
pub async fn list_applications(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
) -> ApiResult<Vec<BazaarApplication>> {
    Ok(Json(
        state.lifecycle.list_for_event(&principal, &event_id).await?,
    ))
}

/// POST /admin/events/{eventId}/applications/{applicationId}/approve
pub async fn approve(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((event_id, application_id)): Path<(String, String)>,
) -> ApiResult<BazaarApplication> {
    let app = state
        .lifecycle
        .approve(&principal, &event_id, &application_id)
        .await?;
    Ok(Json(app))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /admin/events/{eventId}/applications/{applicationId}/reject
///
/// Body `{ "reason": "..." }` is optional; an empty body rejects without reason.
pub async fn reject(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((event_id, application_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<BazaarApplication> {
    let req: RejectRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RejectRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            AppError::with_message(ErrorCode::InvalidFormat, format!("Invalid body: {e}"))
        })?
    };
    let app = state
        .lifecycle
        .reject(&principal, &event_id, &application_id, req.reason)
        .await?;
    Ok(Json(app))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    pub booth_location: String,
}

/// PUT /admin/events/{eventId}/applications/{applicationId}/location
pub async fn assign_location(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((event_id, application_id)): Path<(String, String)>,
    Json(req): Json<LocationRequest>,
) -> ApiResult<BazaarApplication> {
    let app = state
        .lifecycle
        .assign_location(&principal, &event_id, &application_id, &req.booth_location)
        .await?;
    Ok(Json(app))
}
