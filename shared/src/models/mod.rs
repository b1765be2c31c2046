//! Data models
//!
//! Shared between bazaar-cloud and the portal frontend (via API).
//! JSON field names are camelCase to match the frontend.

pub mod bazaar;

pub use bazaar::*;
