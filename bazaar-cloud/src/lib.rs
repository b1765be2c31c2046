//! bazaar-cloud: vendor bazaar application service
//!
//! - Vendors apply for a booth, upload attendee ID documents and pay the
//!   participation fee (Stripe)
//! - The events office approves, rejects and places booths
//! - Paid applications receive one visitor QR code per attendee

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod notify;
pub mod services;
pub mod state;
pub mod storage;
pub mod stripe;

pub use config::Config;
pub use error::{BoxError, ServiceError, ServiceResult};
pub use state::AppState;
