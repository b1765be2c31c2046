//! Vendor application endpoints
//!
//! All routes act on the caller's own application, addressed by event id.

use std::collections::HashMap;

use axum::extract::{Multipart, Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use shared::error::{ApiResponse, AppError, ErrorCode};
use shared::models::{Attendee, BazaarApplication, QrCode};

use super::ApiResult;
use crate::auth::Principal;
use crate::services::attendees::{AttendeeInput, AttendeeSubmission, UploadedDocument};
use crate::services::lifecycle::ApplyRequest;
use crate::services::payment::IntentResponse;
use crate::state::AppState;

/// POST /vendors/applications/{eventId}
pub async fn apply(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
    Json(req): Json<ApplyRequest>,
) -> ApiResult<BazaarApplication> {
    let app = state.lifecycle.apply(&principal, &event_id, req).await?;
    Ok(Json(app))
}

/// GET /vendors/applications/{eventId}
pub async fn get_application(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
) -> ApiResult<BazaarApplication> {
    Ok(Json(state.lifecycle.get_own(&principal, &event_id).await?))
}

/// GET /vendors/my-applications
pub async fn my_applications(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Vec<BazaarApplication>> {
    Ok(Json(state.lifecycle.list_own(&principal).await?))
}

/// DELETE /vendors/my-applications/{eventId}
pub async fn cancel(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    state.lifecycle.cancel_for_event(&principal, &event_id).await?;
    Ok(ApiResponse::success_with_message("Application cancelled", ()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AttendeeMetadata {
    List(Vec<AttendeeInput>),
    Wrapped { attendees: Vec<AttendeeInput> },
}

#[derive(Serialize)]
pub struct AttendeesResponse {
    pub attendees: Vec<Attendee>,
}

/// Index of an attendee file field: `file_{n}` or `files[{n}]`
fn file_field_index(name: &str) -> Option<usize> {
    name.strip_prefix("file_")
        .or_else(|| name.strip_prefix("files[").and_then(|r| r.strip_suffix(']')))
        .and_then(|n| n.parse().ok())
}

fn multipart_error(e: impl std::fmt::Display) -> AppError {
    AppError::with_message(ErrorCode::InvalidRequest, format!("Multipart error: {e}"))
}

/// POST /vendors/applications/{eventId}/attendees
///
/// Multipart body: a `metadata` JSON field (attendee list) plus one optional
/// file field per attendee named `file_{index}`.
pub async fn update_attendees(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<AttendeesResponse> {
    let mut metadata: Option<Vec<AttendeeInput>> = None;
    let mut files: HashMap<usize, UploadedDocument> = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "metadata" {
            let text = field.text().await.map_err(multipart_error)?;
            let parsed: AttendeeMetadata = serde_json::from_str(&text).map_err(|e| {
                AppError::with_message(
                    ErrorCode::InvalidFormat,
                    format!("Invalid attendee metadata: {e}"),
                )
            })?;
            metadata = Some(match parsed {
                AttendeeMetadata::List(list) => list,
                AttendeeMetadata::Wrapped { attendees } => attendees,
            });
        } else if let Some(index) = file_field_index(&name) {
            let filename = field.file_name().map(String::from);
            let content_type = field.content_type().map(String::from);
            let data = field.bytes().await.map_err(multipart_error)?.to_vec();
            files.insert(
                index,
                UploadedDocument {
                    filename,
                    content_type,
                    data,
                },
            );
        } else {
            tracing::debug!(field = %name, "Ignoring unknown multipart field");
        }
    }

    let metadata = metadata.ok_or_else(|| {
        AppError::with_message(ErrorCode::RequiredField, "Missing attendee metadata")
    })?;

    if let Some(stray) = files.keys().copied().find(|i| *i >= metadata.len()) {
        return Err(AppError::with_message(
            ErrorCode::InvalidRequest,
            format!("file_{stray} does not match any attendee"),
        )
        .with_detail("attendee_index", stray));
    }

    let submissions = metadata
        .into_iter()
        .enumerate()
        .map(|(i, attendee)| AttendeeSubmission {
            attendee,
            file: files.remove(&i),
        })
        .collect();

    let attendees = state
        .attendees
        .update(&principal, &event_id, submissions)
        .await?;
    Ok(Json(AttendeesResponse { attendees }))
}

/// POST /vendors/applications/{eventId}/payment/intent
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
) -> ApiResult<IntentResponse> {
    Ok(Json(state.payments.create_intent(&principal, &event_id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub payment_intent_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub receipt_number: Option<String>,
    pub qr_codes: Vec<QrCode>,
}

/// POST /vendors/applications/{eventId}/payment/confirm
pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
    Json(req): Json<ConfirmRequest>,
) -> Result<ApiResponse<ConfirmResponse>, AppError> {
    let outcome = state
        .payments
        .confirm(&principal, &event_id, &req.payment_intent_id)
        .await?;
    let app = outcome.application;
    let message = if outcome.newly_paid {
        "Payment confirmed"
    } else {
        "Payment already confirmed"
    };
    Ok(ApiResponse::success_with_message(
        message,
        ConfirmResponse {
            receipt_number: app.payment.and_then(|p| p.receipt_number),
            qr_codes: app.qr_codes,
        },
    ))
}

/// GET /vendors/applications/{eventId}/qr-codes
pub async fn qr_codes(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
) -> ApiResult<Vec<QrCode>> {
    let app = state.lifecycle.get_own(&principal, &event_id).await?;
    Ok(Json(app.qr_codes))
}
