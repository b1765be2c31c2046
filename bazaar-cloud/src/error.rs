//! Service-layer error type for bazaar-cloud
//!
//! `ServiceError` is what the lifecycle, attendee, payment and QR services
//! return. It converts into the API-layer `AppError` so handlers can use `?`
//! without per-call `map_err` boilerplate.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad input shape or missing required data (client-fixable)
    #[error("{message}")]
    Validation {
        code: ErrorCode,
        message: String,
        /// Zero-based index of the offending attendee, when there is one
        attendee_index: Option<usize>,
    },

    /// Operation not legal in the application's current state
    #[error("{0}")]
    InvalidState(String),

    /// Ownership or role violation
    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Payment provider failure (retryable)
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// Lost a state-transition race and the end state does not match intent
    #[error("{0}")]
    Conflict(String),

    /// Database or infrastructure error (logged, surfaced as InternalError)
    #[error("storage error: {0}")]
    Storage(BoxError),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::ValidationFailed,
            message: message.into(),
            attendee_index: None,
        }
    }

    pub fn validation_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            attendee_index: None,
        }
    }

    pub fn attendee(code: ErrorCode, index: usize, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            attendee_index: Some(index),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn application_not_found() -> Self {
        Self::NotFound("Application".to_string())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Storage(e.into())
    }
}

impl From<BoxError> for ServiceError {
    fn from(e: BoxError) -> Self {
        ServiceError::Storage(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation {
                code,
                message,
                attendee_index,
            } => {
                let err = AppError::with_message(code, message);
                match attendee_index {
                    Some(i) => err.with_detail("attendee_index", i),
                    None => err,
                }
            }
            ServiceError::InvalidState(msg) => AppError::invalid_state(msg),
            ServiceError::Forbidden(msg) => AppError::forbidden(msg),
            ServiceError::NotFound(resource) => {
                AppError::with_message(ErrorCode::ApplicationNotFound, format!("{resource} not found"))
            }
            ServiceError::Gateway(msg) => {
                tracing::warn!(error = %msg, "Payment gateway error");
                AppError::new(ErrorCode::PaymentGatewayError)
            }
            ServiceError::Conflict(msg) => AppError::conflict(msg),
            ServiceError::Storage(err) => {
                tracing::error!(error = %err, "Service storage error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
