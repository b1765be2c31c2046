//! Application state machine
//!
//! `pending -> approved | rejected` by the events office, `pending -> (deleted)`
//! by the owning vendor while unpaid. Approved and rejected are terminal for
//! the review status.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use shared::error::ErrorCode;
use shared::models::{ApplicationStatus, Attendee, BazaarApplication, BoothSize};

use super::FeePolicy;
use super::attendees::{AttendeeInput, check_count, check_identities};
use super::booth_window::{self, BoothWindowInput};
use crate::auth::Principal;
use crate::db::{ApplicationStore, Decision};
use crate::error::{ServiceError, ServiceResult};
use crate::notify::{NotificationDispatcher, NotifyKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub booth_size: BoothSize,
    #[serde(flatten)]
    pub window: BoothWindowInput,
    pub attendees: Vec<AttendeeInput>,
}

pub struct ApplicationLifecycle {
    store: Arc<dyn ApplicationStore>,
    notifier: NotificationDispatcher,
    fee: FeePolicy,
}

impl ApplicationLifecycle {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        notifier: NotificationDispatcher,
        fee: FeePolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            fee,
        }
    }

    /// Vendor applies for a booth at `event_id`
    pub async fn apply(
        &self,
        principal: &Principal,
        event_id: &str,
        req: ApplyRequest,
    ) -> ServiceResult<BazaarApplication> {
        principal.require_vendor()?;
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Err(ServiceError::validation_code(
                ErrorCode::RequiredField,
                "Event id is required",
            ));
        }

        check_count(req.attendees.len())?;
        check_identities(
            req.attendees
                .iter()
                .map(|a| (a.name.as_str(), a.email.as_str())),
        )?;
        let window = booth_window::resolve(&req.window)?;

        let now = Utc::now();
        let app = BazaarApplication {
            id: uuid::Uuid::new_v4().to_string(),
            vendor_id: principal.user_id.clone(),
            vendor_email: principal.email.clone(),
            company_name: principal.company_name.clone(),
            event_id: event_id.to_string(),
            status: ApplicationStatus::Pending,
            rejection_reason: None,
            attendees: req
                .attendees
                .into_iter()
                .map(|a| Attendee {
                    name: a.name.trim().to_string(),
                    email: a.email.trim().to_string(),
                    id_document_path: None,
                })
                .collect(),
            booth_size: req.booth_size,
            booth_location: None,
            booth_start_time: window.start(),
            booth_end_time: window.end(),
            booth_duration_weeks: req
                .window
                .duration_weeks
                .filter(|w| w.is_finite() && *w > 0.0),
            payment: None,
            qr_codes: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        if !self.store.insert(&app).await? {
            return Err(ServiceError::validation_code(
                ErrorCode::ApplicationAlreadyExists,
                "You have already applied to this event",
            ));
        }

        tracing::info!(
            application_id = %app.id,
            event_id = %app.event_id,
            vendor_id = %app.vendor_id,
            scheduled = window.is_scheduled(),
            "Bazaar application submitted"
        );
        Ok(app)
    }

    pub async fn get_own(
        &self,
        principal: &Principal,
        event_id: &str,
    ) -> ServiceResult<BazaarApplication> {
        principal.require_vendor()?;
        self.store
            .find_by_vendor_event(&principal.user_id, event_id)
            .await?
            .ok_or_else(ServiceError::application_not_found)
    }

    pub async fn list_own(&self, principal: &Principal) -> ServiceResult<Vec<BazaarApplication>> {
        principal.require_vendor()?;
        Ok(self.store.list_by_vendor(&principal.user_id).await?)
    }

    pub async fn list_for_event(
        &self,
        principal: &Principal,
        event_id: &str,
    ) -> ServiceResult<Vec<BazaarApplication>> {
        principal.require_reviewer()?;
        Ok(self.store.list_by_event(event_id).await?)
    }

    /// Load an application addressed through its event
    async fn load_in_event(
        &self,
        event_id: &str,
        application_id: &str,
    ) -> ServiceResult<BazaarApplication> {
        self.store
            .find_by_id(application_id)
            .await?
            .filter(|a| a.event_id == event_id)
            .ok_or_else(ServiceError::application_not_found)
    }

    pub async fn approve(
        &self,
        principal: &Principal,
        event_id: &str,
        application_id: &str,
    ) -> ServiceResult<BazaarApplication> {
        principal.require_reviewer()?;
        let now = Utc::now();
        let decision = Decision {
            status: ApplicationStatus::Approved,
            rejection_reason: None,
            payment: Some(self.fee.open_payment(now)),
        };
        let (app, applied) = self.decide(event_id, application_id, decision).await?;

        if let Some(payment) = app.payment.as_ref().filter(|_| applied) {
            self.notifier.notify(
                NotifyKind::Approved,
                &app.vendor_email,
                &app.event_id,
                Some(serde_json::json!({
                    "amount": shared::money::format_amount(payment.amount, &payment.currency),
                    "dueDate": payment.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
                })),
            );
        }
        Ok(app)
    }

    pub async fn reject(
        &self,
        principal: &Principal,
        event_id: &str,
        application_id: &str,
        reason: Option<String>,
    ) -> ServiceResult<BazaarApplication> {
        principal.require_reviewer()?;
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let decision = Decision {
            status: ApplicationStatus::Rejected,
            rejection_reason: reason.clone(),
            payment: None,
        };
        let (app, applied) = self.decide(event_id, application_id, decision).await?;

        if applied {
            self.notifier.notify(
                NotifyKind::Rejected,
                &app.vendor_email,
                &app.event_id,
                reason.map(|r| serde_json::json!({ "reason": r })),
            );
        }
        Ok(app)
    }

    /// Apply a review decision. The flag is false when a concurrent request
    /// already applied the same decision.
    async fn decide(
        &self,
        event_id: &str,
        application_id: &str,
        decision: Decision,
    ) -> ServiceResult<(BazaarApplication, bool)> {
        let app = self.load_in_event(event_id, application_id).await?;
        if app.status != ApplicationStatus::Pending {
            return Err(ServiceError::invalid_state(format!(
                "Application is already {}",
                app.status.as_db()
            )));
        }

        match self.store.decide(&app.id, &decision, Utc::now()).await? {
            Some(updated) => {
                tracing::info!(
                    application_id = %updated.id,
                    event_id = %updated.event_id,
                    status = updated.status.as_db(),
                    "Application reviewed"
                );
                Ok((updated, true))
            }
            None => {
                let current = self
                    .store
                    .find_by_id(&app.id)
                    .await?
                    .ok_or_else(ServiceError::application_not_found)?;
                if current.status == decision.status {
                    tracing::info!(
                        application_id = %current.id,
                        status = current.status.as_db(),
                        "Review decision already applied by a concurrent request"
                    );
                    return Ok((current, false));
                }
                Err(ServiceError::invalid_state(format!(
                    "Application is already {}",
                    current.status.as_db()
                )))
            }
        }
    }

    /// Vendor withdraws an application (deletes it)
    pub async fn cancel(
        &self,
        principal: &Principal,
        application_id: &str,
    ) -> ServiceResult<()> {
        principal.require_vendor()?;
        let app = self
            .store
            .find_by_id(application_id)
            .await?
            .ok_or_else(ServiceError::application_not_found)?;
        if app.vendor_id != principal.user_id {
            return Err(ServiceError::Forbidden(
                "Application belongs to another vendor".into(),
            ));
        }
        ensure_cancellable(&app)?;

        if self
            .store
            .delete_if_cancellable(&app.id, &principal.user_id)
            .await?
        {
            tracing::info!(
                application_id = %app.id,
                event_id = %app.event_id,
                "Application cancelled by vendor"
            );
            return Ok(());
        }

        // Lost a race: reviewed or paid in between, or already deleted
        match self.store.find_by_id(&app.id).await? {
            None => Ok(()),
            Some(current) => {
                ensure_cancellable(&current)?;
                Err(ServiceError::Conflict(
                    "Application changed while cancelling; please retry".into(),
                ))
            }
        }
    }

    /// `DELETE /vendors/my-applications/{eventId}`
    pub async fn cancel_for_event(&self, principal: &Principal, event_id: &str) -> ServiceResult<()> {
        let app = self.get_own(principal, event_id).await?;
        self.cancel(principal, &app.id).await
    }

    pub async fn assign_location(
        &self,
        principal: &Principal,
        event_id: &str,
        application_id: &str,
        location: &str,
    ) -> ServiceResult<BazaarApplication> {
        principal.require_reviewer()?;
        let location = location.trim();
        if location.is_empty() {
            return Err(ServiceError::validation_code(
                ErrorCode::RequiredField,
                "Booth location is required",
            ));
        }
        let app = self.load_in_event(event_id, application_id).await?;
        if app.status == ApplicationStatus::Rejected {
            return Err(ServiceError::invalid_state(
                "Cannot place a booth for a rejected application",
            ));
        }

        match self
            .store
            .set_booth_location(&app.id, location, Utc::now())
            .await?
        {
            Some(updated) => {
                tracing::info!(
                    application_id = %updated.id,
                    booth_location = %location,
                    "Booth location assigned"
                );
                Ok(updated)
            }
            None => match self.store.find_by_id(&app.id).await? {
                None => Err(ServiceError::application_not_found()),
                Some(_) => Err(ServiceError::invalid_state(
                    "Cannot place a booth for a rejected application",
                )),
            },
        }
    }
}

fn ensure_cancellable(app: &BazaarApplication) -> ServiceResult<()> {
    if app.is_paid() {
        return Err(ServiceError::invalid_state(
            "Application cannot be cancelled after payment",
        ));
    }
    if app.status != ApplicationStatus::Pending {
        return Err(ServiceError::invalid_state(format!(
            "Only pending applications can be cancelled (status: {})",
            app.status.as_db()
        )));
    }
    Ok(())
}
