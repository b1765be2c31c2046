//! Bazaar application model
//!
//! A vendor's request to run a booth at one event. The event is referenced by
//! id only; event details are looked up when needed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Minimum number of attendees per application
pub const MIN_ATTENDEES: usize = 1;
/// Maximum number of attendees per application
pub const MAX_ATTENDEES: usize = 5;

/// Application review status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    /// Submitted, awaiting events-office review
    Pending,
    /// Accepted by the events office
    Approved,
    /// Declined by the events office
    Rejected,
}

impl ApplicationStatus {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Participation fee status
///
/// Only moves forward: `pending -> paid`, `pending -> overdue -> paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
}

impl PaymentStatus {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }

    /// Whether `self -> next` is a legal forward transition
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid) | (Self::Pending, Self::Overdue) | (Self::Overdue, Self::Paid)
        )
    }
}

/// Booth footprint offered at bazaars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoothSize {
    #[serde(rename = "2x2")]
    TwoByTwo,
    #[serde(rename = "4x4")]
    FourByFour,
}

impl BoothSize {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "2x2" => Some(Self::TwoByTwo),
            "4x4" => Some(Self::FourByFour),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::TwoByTwo => "2x2",
            Self::FourByFour => "4x4",
        }
    }
}

/// Person who will staff the booth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub name: String,
    pub email: String,
    /// Storage key of the uploaded ID document (not the file itself)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_document_path: Option<String>,
}

impl Attendee {
    pub fn has_document(&self) -> bool {
        self.id_document_path
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }
}

/// Participation fee record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    /// Gateway payment-intent id that settled this payment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_reference: Option<String>,
}

impl Payment {
    /// New unpaid fee record
    pub fn pending(amount: Decimal, currency: impl Into<String>, due_date: Option<DateTime<Utc>>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            due_date,
            paid_at: None,
            receipt_number: None,
            transaction_reference: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

/// Visitor credential issued per attendee once the fee is paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCode {
    pub visitor_email: String,
    pub qr_code_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

/// One vendor's application to one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BazaarApplication {
    pub id: String,
    pub vendor_id: String,
    pub vendor_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub event_id: String,
    pub status: ApplicationStatus,
    /// Free-text reason supplied on rejection, shown to the vendor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub attendees: Vec<Attendee>,
    pub booth_size: BoothSize,
    /// Assigned by the events office; vendors cannot set it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booth_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booth_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booth_end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booth_duration_weeks: Option<f64>,
    pub payment: Option<Payment>,
    pub qr_codes: Vec<QrCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BazaarApplication {
    pub fn is_paid(&self) -> bool {
        self.payment.as_ref().is_some_and(Payment::is_paid)
    }

    pub fn payment_status(&self) -> Option<PaymentStatus> {
        self.payment.as_ref().map(|p| p.status)
    }

    /// Vendor may withdraw only while pending and unpaid
    pub fn can_cancel(&self) -> bool {
        self.status == ApplicationStatus::Pending && !self.is_paid()
    }

    /// Attendee list may change until the fee is paid (and never after rejection)
    pub fn accepts_attendee_updates(&self) -> bool {
        self.status != ApplicationStatus::Rejected && !self.is_paid()
    }

    /// Every attendee has an ID document on file
    pub fn attendees_complete(&self) -> bool {
        (MIN_ATTENDEES..=MAX_ATTENDEES).contains(&self.attendees.len())
            && self.attendees.iter().all(Attendee::has_document)
    }

    /// Index of the first attendee without an ID document
    pub fn first_attendee_missing_document(&self) -> Option<usize> {
        self.attendees.iter().position(|a| !a.has_document())
    }

    /// Attendees that do not yet hold a QR credential (matched by email)
    pub fn attendees_missing_qr(&self) -> Vec<&Attendee> {
        self.attendees
            .iter()
            .filter(|a| {
                !self
                    .qr_codes
                    .iter()
                    .any(|q| q.visitor_email.eq_ignore_ascii_case(&a.email))
            })
            .collect()
    }
}
