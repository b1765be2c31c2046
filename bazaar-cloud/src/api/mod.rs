//! API routes for bazaar-cloud

pub mod admin;
pub mod health;
pub mod qr;
pub mod stripe_webhook;
pub mod vendor;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::{Router, middleware};
use shared::error::AppError;
use shared::models::MAX_ATTENDEES;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::services::attendees::MAX_DOCUMENT_SIZE;
use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

/// Multipart attendee uploads: one document per attendee plus metadata
const MAX_BODY_SIZE: usize = MAX_ATTENDEES * MAX_DOCUMENT_SIZE + 1024 * 1024;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Vendor self-service (JWT)
    let vendor = Router::new()
        .route(
            "/vendors/applications/{event_id}",
            post(vendor::apply).get(vendor::get_application),
        )
        .route(
            "/vendors/applications/{event_id}/attendees",
            post(vendor::update_attendees),
        )
        .route(
            "/vendors/applications/{event_id}/payment/intent",
            post(vendor::create_payment_intent),
        )
        .route(
            "/vendors/applications/{event_id}/payment/confirm",
            post(vendor::confirm_payment),
        )
        .route(
            "/vendors/applications/{event_id}/qr-codes",
            get(vendor::qr_codes),
        )
        .route("/vendors/my-applications", get(vendor::my_applications))
        .route(
            "/vendors/my-applications/{event_id}",
            axum::routing::delete(vendor::cancel),
        );

    // Events office / admin review (JWT + role)
    let admin = Router::new()
        .route(
            "/admin/events/{event_id}/applications",
            get(admin::list_applications),
        )
        .route(
            "/admin/events/{event_id}/applications/{application_id}/approve",
            post(admin::approve),
        )
        .route(
            "/admin/events/{event_id}/applications/{application_id}/reject",
            post(admin::reject),
        )
        .route(
            "/admin/events/{event_id}/applications/{application_id}/location",
            put(admin::assign_location),
        );

    let authenticated = vendor
        .merge(admin)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Stripe webhook (signature-verified, raw body)
    let webhook = Router::new().route("/stripe/webhook", post(stripe_webhook::handle_webhook));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/qr/verify/{token}", get(qr::verify))
        .merge(webhook)
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
