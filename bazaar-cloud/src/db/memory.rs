//! In-memory application store (development without DATABASE_URL, tests)
//!
//! Conditional writes hold the entry's shard lock between the precondition
//! check and the mutation, which gives the same single-document atomicity as
//! the SQL `UPDATE ... WHERE` statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::models::{
    ApplicationStatus, Attendee, BazaarApplication, Payment, PaymentStatus, QrCode,
};

use super::{ApplicationStore, BoxError, Decision, PaidStamp};

#[derive(Default)]
pub struct MemoryApplicationStore {
    apps: DashMap<String, BazaarApplication>,
    /// (vendor_id, event_id) -> application id
    by_vendor_event: DashMap<(String, String), String>,
    webhook_events: DashMap<String, String>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` under the entry lock when `cond` holds
    fn update_if(
        &self,
        id: &str,
        cond: impl FnOnce(&BazaarApplication) -> bool,
        f: impl FnOnce(&mut BazaarApplication),
    ) -> Option<BazaarApplication> {
        let mut entry = self.apps.get_mut(id)?;
        if !cond(&entry) {
            return None;
        }
        f(&mut entry);
        Some(entry.clone())
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn insert(&self, app: &BazaarApplication) -> Result<bool, BoxError> {
        let key = (app.vendor_id.clone(), app.event_id.clone());
        match self.by_vendor_event.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                self.apps.insert(app.id.clone(), app.clone());
                slot.insert(app.id.clone());
                Ok(true)
            }
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<BazaarApplication>, BoxError> {
        Ok(self.apps.get(id).map(|a| a.clone()))
    }

    async fn find_by_vendor_event(
        &self,
        vendor_id: &str,
        event_id: &str,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        let id = self
            .by_vendor_event
            .get(&(vendor_id.to_string(), event_id.to_string()))
            .map(|id| id.clone());
        Ok(id.and_then(|id| self.apps.get(&id).map(|a| a.clone())))
    }

    async fn list_by_vendor(&self, vendor_id: &str) -> Result<Vec<BazaarApplication>, BoxError> {
        let mut apps: Vec<_> = self
            .apps
            .iter()
            .filter(|a| a.vendor_id == vendor_id)
            .map(|a| a.clone())
            .collect();
        apps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apps)
    }

    async fn list_by_event(&self, event_id: &str) -> Result<Vec<BazaarApplication>, BoxError> {
        let mut apps: Vec<_> = self
            .apps
            .iter()
            .filter(|a| a.event_id == event_id)
            .map(|a| a.clone())
            .collect();
        apps.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(apps)
    }

    async fn decide(
        &self,
        id: &str,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        Ok(self.update_if(
            id,
            |a| a.status == ApplicationStatus::Pending,
            |a| {
                a.status = decision.status;
                a.rejection_reason = decision.rejection_reason.clone();
                if let Some(p) = &decision.payment {
                    a.payment = Some(p.clone());
                }
                a.updated_at = now;
            },
        ))
    }

    async fn set_booth_location(
        &self,
        id: &str,
        location: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        Ok(self.update_if(
            id,
            |a| a.status != ApplicationStatus::Rejected,
            |a| {
                a.booth_location = Some(location.to_string());
                a.updated_at = now;
            },
        ))
    }

    async fn replace_attendees(
        &self,
        id: &str,
        attendees: &[Attendee],
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        Ok(self.update_if(
            id,
            BazaarApplication::accepts_attendee_updates,
            |a| {
                a.attendees = attendees.to_vec();
                a.updated_at = now;
            },
        ))
    }

    async fn delete_if_cancellable(&self, id: &str, vendor_id: &str) -> Result<bool, BoxError> {
        let removed = self
            .apps
            .remove_if(id, |_, a| a.vendor_id == vendor_id && a.can_cancel());
        match removed {
            Some((_, app)) => {
                self.by_vendor_event.remove(&(app.vendor_id, app.event_id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_paid(
        &self,
        id: &str,
        stamp: &PaidStamp,
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        Ok(self.update_if(
            id,
            |a| a.status == ApplicationStatus::Approved && !a.is_paid() && a.attendees_complete(),
            |a| {
                let due_date = a.payment.as_ref().and_then(|p| p.due_date);
                a.payment = Some(Payment {
                    amount: stamp.payment.amount,
                    currency: stamp.payment.currency.clone(),
                    status: PaymentStatus::Paid,
                    due_date,
                    paid_at: Some(stamp.paid_at),
                    receipt_number: Some(stamp.receipt_number.clone()),
                    transaction_reference: Some(stamp.transaction_reference.clone()),
                });
                a.updated_at = now;
            },
        ))
    }

    async fn set_qr_codes(
        &self,
        id: &str,
        expected_len: usize,
        codes: &[QrCode],
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        Ok(self.update_if(
            id,
            |a| a.is_paid() && a.qr_codes.len() == expected_len,
            |a| {
                a.qr_codes = codes.to_vec();
                a.updated_at = now;
            },
        ))
    }

    async fn mark_overdue(&self, now: DateTime<Utc>) -> Result<Vec<BazaarApplication>, BoxError> {
        let mut changed = Vec::new();
        for mut entry in self.apps.iter_mut() {
            let due = entry.payment.as_ref().is_some_and(|p| {
                p.status == PaymentStatus::Pending && p.due_date.is_some_and(|d| d < now)
            });
            if due {
                if let Some(p) = entry.payment.as_mut() {
                    p.status = PaymentStatus::Overdue;
                }
                entry.updated_at = now;
                changed.push(entry.clone());
            }
        }
        Ok(changed)
    }

    async fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        _now: DateTime<Utc>,
    ) -> Result<bool, BoxError> {
        match self.webhook_events.entry(event_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(event_type.to_string());
                Ok(true)
            }
        }
    }

    async fn release_webhook_event(&self, event_id: &str) -> Result<(), BoxError> {
        self.webhook_events.remove(event_id);
        Ok(())
    }
}
