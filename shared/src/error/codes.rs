//! Unified error codes for the bazaar portal
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Application lifecycle errors
//! - 4xxx: Attendee / document errors
//! - 5xxx: Payment errors
//! - 6xxx: QR credential errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so the frontend can
/// localize them without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied (ownership or role)
    PermissionDenied = 2001,
    /// Specific role required
    RoleRequired = 2002,

    // ==================== 3xxx: Application ====================
    /// Bazaar application not found
    ApplicationNotFound = 3001,
    /// Operation not legal in the application's current state
    InvalidApplicationState = 3002,
    /// Vendor already applied to this event
    ApplicationAlreadyExists = 3003,
    /// Lost a concurrent state transition
    StateConflict = 3004,
    /// Booth start/end window is invalid
    InvalidBoothWindow = 3005,

    // ==================== 4xxx: Attendee / Document ====================
    /// Attendee count outside 1..=5
    AttendeeCountOutOfRange = 4001,
    /// Attendee has neither a stored nor an uploaded ID document
    AttendeeDocumentMissing = 4002,
    /// Uploaded document exceeds the size limit
    DocumentTooLarge = 4003,
    /// Uploaded document format is not accepted
    UnsupportedDocumentFormat = 4004,
    /// Document could not be stored
    DocumentStorageFailed = 4005,

    // ==================== 5xxx: Payment ====================
    /// Payment provider unreachable or misconfigured (retryable)
    PaymentGatewayError = 5001,
    /// Gateway reports the payment did not succeed
    PaymentNotCompleted = 5002,
    /// Card declined by the issuer
    CardDeclined = 5003,
    /// Application already paid
    PaymentAlreadyPaid = 5004,
    /// Payment intent does not belong to this application
    PaymentIntentMismatch = 5005,

    // ==================== 6xxx: QR ====================
    /// QR token is malformed or its signature does not verify
    QrTokenInvalid = 6001,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Timeout error
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::RoleRequired => "Specific role is required",

            // Application
            ErrorCode::ApplicationNotFound => "Bazaar application not found",
            ErrorCode::InvalidApplicationState => {
                "Operation is not allowed in the application's current state"
            }
            ErrorCode::ApplicationAlreadyExists => "You have already applied to this event",
            ErrorCode::StateConflict => "The application was changed by another request",
            ErrorCode::InvalidBoothWindow => "Booth end time must be after its start time",

            // Attendee / Document
            ErrorCode::AttendeeCountOutOfRange => "Between 1 and 5 attendees are required",
            ErrorCode::AttendeeDocumentMissing => "Attendee is missing an ID document",
            ErrorCode::DocumentTooLarge => "Document is too large",
            ErrorCode::UnsupportedDocumentFormat => "Document format is not supported",
            ErrorCode::DocumentStorageFailed => "Document could not be stored",

            // Payment
            ErrorCode::PaymentGatewayError => {
                "Payment provider is unavailable, please try again"
            }
            ErrorCode::PaymentNotCompleted => "Payment has not been completed",
            ErrorCode::CardDeclined => "Card was declined",
            ErrorCode::PaymentAlreadyPaid => "Participation fee is already paid",
            ErrorCode::PaymentIntentMismatch => "Payment does not match this application",

            // QR
            ErrorCode::QrTokenInvalid => "QR code is not valid",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::RoleRequired),

            // Application
            3001 => Ok(ErrorCode::ApplicationNotFound),
            3002 => Ok(ErrorCode::InvalidApplicationState),
            3003 => Ok(ErrorCode::ApplicationAlreadyExists),
            3004 => Ok(ErrorCode::StateConflict),
            3005 => Ok(ErrorCode::InvalidBoothWindow),

            // Attendee / Document
            4001 => Ok(ErrorCode::AttendeeCountOutOfRange),
            4002 => Ok(ErrorCode::AttendeeDocumentMissing),
            4003 => Ok(ErrorCode::DocumentTooLarge),
            4004 => Ok(ErrorCode::UnsupportedDocumentFormat),
            4005 => Ok(ErrorCode::DocumentStorageFailed),

            // Payment
            5001 => Ok(ErrorCode::PaymentGatewayError),
            5002 => Ok(ErrorCode::PaymentNotCompleted),
            5003 => Ok(ErrorCode::CardDeclined),
            5004 => Ok(ErrorCode::PaymentAlreadyPaid),
            5005 => Ok(ErrorCode::PaymentIntentMismatch),

            // QR
            6001 => Ok(ErrorCode::QrTokenInvalid),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
