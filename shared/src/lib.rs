//! Shared types for the bazaar portal
//!
//! Wire/domain models, the unified error-code system and currency helpers
//! used by the service and its clients.

pub mod error;
pub mod models;
pub mod money;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
