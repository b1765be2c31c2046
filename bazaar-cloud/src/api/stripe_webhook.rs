//! Stripe webhook handler
//!
//! POST /stripe/webhook: payment intent events (raw body for signature verification)

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::error::ServiceError;
use crate::state::AppState;
use crate::stripe::{self, PaymentIntent};

/// Handle incoming Stripe webhook events
///
/// Must receive raw body (not JSON) for HMAC signature verification.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // 1. Get Stripe-Signature header
    let sig_header = match headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    {
        Some(s) => s,
        None => {
            tracing::warn!("Missing Stripe-Signature header");
            return StatusCode::BAD_REQUEST;
        }
    };

    // 2. Verify signature
    if let Err(e) =
        stripe::verify_webhook_signature(&body, sig_header, &state.stripe_webhook_secret)
    {
        tracing::warn!(error = e, "Webhook signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    // 3. Parse JSON event
    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%e, "Failed to parse webhook JSON");
            return StatusCode::BAD_REQUEST;
        }
    };

    let event_type = event["type"].as_str().unwrap_or("");
    tracing::info!(event_type = event_type, "Received Stripe webhook");

    // 4. Idempotency: record first, skip if already seen
    let event_id = match event["id"].as_str() {
        Some(id) => id,
        None => {
            tracing::warn!("Webhook event missing id");
            return StatusCode::BAD_REQUEST;
        }
    };

    match state
        .store
        .record_webhook_event(event_id, event_type, chrono::Utc::now())
        .await
    {
        Ok(false) => {
            tracing::info!(event_id = event_id, "Duplicate webhook event, skipping");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::error!(%e, "DB error recording webhook event");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        Ok(true) => {}
    }

    // 5. Handle event types
    let status = match event_type {
        "payment_intent.succeeded" => handle_intent_succeeded(&state, &event).await,
        "payment_intent.payment_failed" => handle_intent_failed(&state, &event).await,
        _ => {
            tracing::debug!(event_type = event_type, "Unhandled webhook event type");
            StatusCode::OK
        }
    };

    // Transient failure: let Stripe's retry through the idempotency check
    if status.is_server_error() {
        if let Err(e) = state.store.release_webhook_event(event_id).await {
            tracing::error!(%e, event_id = event_id, "Failed to release webhook event");
        }
    }
    status
}

fn intent_from_event(event: &serde_json::Value) -> Option<PaymentIntent> {
    let obj = event.get("data").and_then(|d| d.get("object"))?;
    match PaymentIntent::from_json(obj) {
        Ok(intent) => Some(intent),
        Err(e) => {
            tracing::warn!(error = %e, "Webhook payment intent malformed");
            None
        }
    }
}

/// payment_intent.succeeded → same finalize path as the client confirm
async fn handle_intent_succeeded(state: &AppState, event: &serde_json::Value) -> StatusCode {
    let Some(intent) = intent_from_event(event) else {
        return StatusCode::OK;
    };
    let Some(application_id) = intent.application_id.as_deref() else {
        tracing::warn!(payment_intent_id = %intent.id, "payment_intent.succeeded missing application_id");
        return StatusCode::OK;
    };

    match state.payments.finalize(application_id, &intent.id).await {
        Ok(outcome) => {
            tracing::info!(
                application_id = application_id,
                payment_intent_id = %intent.id,
                newly_paid = outcome.newly_paid,
                "Payment finalized via webhook"
            );
            StatusCode::OK
        }
        Err(e @ (ServiceError::Gateway(_) | ServiceError::Storage(_))) => {
            tracing::error!(
                application_id = application_id,
                payment_intent_id = %intent.id,
                error = %e,
                "Webhook finalize failed, will be retried"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            tracing::warn!(
                application_id = application_id,
                payment_intent_id = %intent.id,
                error = %e,
                "Webhook finalize rejected"
            );
            StatusCode::OK
        }
    }
}

/// payment_intent.payment_failed → notify the vendor with the decline reason
async fn handle_intent_failed(state: &AppState, event: &serde_json::Value) -> StatusCode {
    let Some(intent) = intent_from_event(event) else {
        return StatusCode::OK;
    };
    match state.payments.record_failure(&intent).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!(payment_intent_id = %intent.id, error = %e, "Failed to record payment failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
