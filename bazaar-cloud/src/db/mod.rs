//! Database access layer
//!
//! Every state transition is a single conditional write scoped by the expected
//! prior state. A method returning `None`/`false` means the precondition no
//! longer held when the write reached the store; callers re-read to find out
//! what won.

pub mod applications;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{ApplicationStatus, Attendee, BazaarApplication, Payment, QrCode};

pub use applications::PgApplicationStore;
pub use memory::MemoryApplicationStore;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Review decision written by the events office
#[derive(Debug, Clone)]
pub struct Decision {
    pub status: ApplicationStatus,
    pub rejection_reason: Option<String>,
    /// Payment record opened on approval
    pub payment: Option<Payment>,
}

/// Stamp written on the `pending|overdue -> paid` transition
#[derive(Debug, Clone)]
pub struct PaidStamp {
    /// Amount/currency settled (the stored fee, or the default when none existed)
    pub payment: Payment,
    pub paid_at: DateTime<Utc>,
    pub receipt_number: String,
    pub transaction_reference: String,
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Insert a new application. `false` if the vendor already applied to the event.
    async fn insert(&self, app: &BazaarApplication) -> Result<bool, BoxError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<BazaarApplication>, BoxError>;

    async fn find_by_vendor_event(
        &self,
        vendor_id: &str,
        event_id: &str,
    ) -> Result<Option<BazaarApplication>, BoxError>;

    async fn list_by_vendor(&self, vendor_id: &str) -> Result<Vec<BazaarApplication>, BoxError>;

    async fn list_by_event(&self, event_id: &str) -> Result<Vec<BazaarApplication>, BoxError>;

    /// `pending -> approved|rejected`, applied only while still pending
    async fn decide(
        &self,
        id: &str,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError>;

    /// Set the booth location unless the application was rejected
    async fn set_booth_location(
        &self,
        id: &str,
        location: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError>;

    /// Replace the whole attendee list, applied only while not rejected and not paid
    async fn replace_attendees(
        &self,
        id: &str,
        attendees: &[Attendee],
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError>;

    /// Delete the application, applied only while owned by `vendor_id`,
    /// pending and unpaid
    async fn delete_if_cancellable(&self, id: &str, vendor_id: &str) -> Result<bool, BoxError>;

    /// `pending|overdue -> paid`, applied only while approved and not already paid
    async fn mark_paid(
        &self,
        id: &str,
        stamp: &PaidStamp,
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError>;

    /// Replace the QR list, applied only while paid and while the stored list
    /// still has `expected_len` entries
    async fn set_qr_codes(
        &self,
        id: &str,
        expected_len: usize,
        codes: &[QrCode],
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError>;

    /// `pending -> overdue` for every payment whose due date passed
    async fn mark_overdue(&self, now: DateTime<Utc>) -> Result<Vec<BazaarApplication>, BoxError>;

    /// Record a gateway webhook event id. `false` if it was already processed.
    async fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, BoxError>;

    /// Forget a recorded event so a gateway retry is processed again
    async fn release_webhook_event(&self, event_id: &str) -> Result<(), BoxError>;
}
