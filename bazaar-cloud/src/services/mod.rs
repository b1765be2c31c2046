//! Bazaar application services
//!
//! Every operation takes the calling [`crate::auth::Principal`] explicitly and
//! expresses each state change as a conditional write on the store.

pub mod attendees;
pub mod booth_window;
pub mod lifecycle;
pub mod payment;
pub mod qr;

pub use attendees::AttendeeDocumentManager;
pub use lifecycle::ApplicationLifecycle;
pub use payment::PaymentOrchestrator;
pub use qr::QrCodeIssuer;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use shared::models::{BazaarApplication, Payment};

/// Participation fee charged on approval
#[derive(Debug, Clone)]
pub struct FeePolicy {
    pub amount: Decimal,
    pub currency: String,
    /// Days between approval and the payment due date
    pub due_days: i64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            amount: Decimal::from(1000),
            currency: "EGP".to_string(),
            due_days: 14,
        }
    }
}

impl FeePolicy {
    /// Payment record opened when an application is approved
    pub fn open_payment(&self, now: DateTime<Utc>) -> Payment {
        let due = (self.due_days > 0).then(|| now + Duration::days(self.due_days));
        Payment::pending(self.amount, self.currency.clone(), due)
    }

    /// Amount and currency owed: the stored record, or the policy fee when
    /// none exists yet
    pub fn amount_due(&self, app: &BazaarApplication) -> (Decimal, String) {
        match &app.payment {
            Some(p) => (p.amount, p.currency.clone()),
            None => (self.amount, self.currency.clone()),
        }
    }
}
