//! GET /qr/verify/{token}: visitor pass check at the gate

use axum::Json;
use axum::extract::{Path, State};
use shared::error::AppError;

use crate::services::qr::QrClaims;
use crate::state::AppState;

pub async fn verify(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<QrClaims>, AppError> {
    let claims = state.qr.verify_pass(&token).await?;
    tracing::info!(
        application_id = %claims.application_id,
        event_id = %claims.event_id,
        "Visitor QR code verified"
    );
    Ok(Json(claims))
}
