//! Participation fee payments
//!
//! The server never trusts a client-asserted success: `finalize` re-reads the
//! intent from the gateway and only then applies the conditional
//! `pending|overdue -> paid` transition. Repeated finalization (client retry,
//! webhook racing the confirm call) returns the paid state without re-issuing
//! anything.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::error::ErrorCode;
use shared::models::{ApplicationStatus, BazaarApplication, Payment};
use shared::money;

use super::attendees::check_count;
use super::{FeePolicy, QrCodeIssuer};
use crate::auth::Principal;
use crate::db::{ApplicationStore, PaidStamp};
use crate::error::{ServiceError, ServiceResult};
use crate::notify::{NotificationDispatcher, NotifyKind};
use crate::stripe::{GatewayError, IntentStatus, PaymentGateway, PaymentIntent, is_valid_intent_id};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    /// Display string, e.g. "EGP 1,000.00"
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub application: BazaarApplication,
    /// False when the application was already paid before this call
    pub newly_paid: bool,
}

/// `RCPT-YYYYMMDD-<first 8 hex of sha256(intent id)>`
pub fn receipt_number(paid_at: DateTime<Utc>, payment_intent_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(payment_intent_id.as_bytes()));
    format!("RCPT-{}-{}", paid_at.format("%Y%m%d"), &digest[..8])
}

/// Every attendee must hold an ID document before the fee can be charged
fn ensure_documents(app: &BazaarApplication) -> ServiceResult<()> {
    check_count(app.attendees.len())?;
    match app.first_attendee_missing_document() {
        Some(index) => Err(ServiceError::attendee(
            ErrorCode::AttendeeDocumentMissing,
            index,
            format!(
                "Attendee {} ({}) has no ID document; upload one before paying",
                index + 1,
                app.attendees[index].name
            ),
        )),
        None => Ok(()),
    }
}

fn not_approved(app: &BazaarApplication) -> ServiceError {
    ServiceError::invalid_state(format!(
        "Payment is only possible for approved applications (status: {})",
        app.status.as_db()
    ))
}

/// Display string for a stored payment; the stored amount is left untouched
pub fn display_amount(payment: &Payment) -> String {
    money::format_amount(payment.amount, &payment.currency)
}

pub struct PaymentOrchestrator {
    store: Arc<dyn ApplicationStore>,
    gateway: Arc<dyn PaymentGateway>,
    qr: Arc<QrCodeIssuer>,
    notifier: NotificationDispatcher,
    fee: FeePolicy,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        gateway: Arc<dyn PaymentGateway>,
        qr: Arc<QrCodeIssuer>,
        notifier: NotificationDispatcher,
        fee: FeePolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            qr,
            notifier,
            fee,
        }
    }

    /// Amount owed in minor units, with its currency
    fn charge_for(&self, app: &BazaarApplication) -> ServiceResult<(i64, String)> {
        let (amount, currency) = self.fee.amount_due(app);
        let minor = money::to_minor_units(amount, &currency).ok_or_else(|| {
            ServiceError::validation_code(
                ErrorCode::ValueOutOfRange,
                format!("Payment amount {amount} {currency} cannot be charged"),
            )
        })?;
        Ok((minor, currency.to_ascii_uppercase()))
    }

    /// Obtain a client secret for the caller's application at `event_id`.
    /// Leaves the stored payment untouched.
    pub async fn create_intent(
        &self,
        principal: &Principal,
        event_id: &str,
    ) -> ServiceResult<IntentResponse> {
        principal.require_vendor()?;
        let app = self
            .store
            .find_by_vendor_event(&principal.user_id, event_id)
            .await?
            .ok_or_else(ServiceError::application_not_found)?;
        self.create_intent_for(&app).await
    }

    pub async fn create_intent_for(&self, app: &BazaarApplication) -> ServiceResult<IntentResponse> {
        if app.is_paid() {
            return Err(ServiceError::invalid_state("Participation fee is already paid"));
        }
        if app.status != ApplicationStatus::Approved {
            return Err(not_approved(app));
        }
        ensure_documents(app)?;

        let (amount_minor, currency) = self.charge_for(app)?;
        let created = self
            .gateway
            .create_payment_intent(amount_minor, &currency, &app.id)
            .await
            .map_err(|e| {
                tracing::warn!(application_id = %app.id, error = %e, "Creating payment intent failed");
                ServiceError::from(e)
            })?;

        tracing::info!(
            application_id = %app.id,
            payment_intent_id = %created.id,
            amount_minor = amount_minor,
            currency = %currency,
            "Payment intent created"
        );

        Ok(IntentResponse {
            client_secret: created.client_secret,
            payment_intent_id: created.id,
            amount: money::format_amount(money::from_minor_units(amount_minor, &currency), &currency),
            currency,
        })
    }

    /// Client confirm for the caller's application at `event_id`
    pub async fn confirm(
        &self,
        principal: &Principal,
        event_id: &str,
        payment_intent_id: &str,
    ) -> ServiceResult<FinalizeOutcome> {
        principal.require_vendor()?;
        let app = self
            .store
            .find_by_vendor_event(&principal.user_id, event_id)
            .await?
            .ok_or_else(ServiceError::application_not_found)?;
        self.finalize(&app.id, payment_intent_id).await
    }

    /// Verify the intent with the gateway and mark the application paid
    pub async fn finalize(
        &self,
        application_id: &str,
        payment_intent_id: &str,
    ) -> ServiceResult<FinalizeOutcome> {
        let payment_intent_id = payment_intent_id.trim();
        let app = self.store.find_by_id(application_id).await?.ok_or_else(|| {
            ServiceError::Conflict("Application no longer exists; it was cancelled".into())
        })?;

        // Already paid: success for any intent id, no gateway round-trip
        if app.is_paid() {
            tracing::info!(
                application_id = %app.id,
                payment_intent_id = %payment_intent_id,
                "Application already paid, finalize is a no-op"
            );
            return Ok(FinalizeOutcome {
                application: self.with_credentials(app).await,
                newly_paid: false,
            });
        }
        if !is_valid_intent_id(payment_intent_id) {
            return Err(ServiceError::validation_code(
                ErrorCode::InvalidFormat,
                "Invalid payment intent id",
            ));
        }
        if app.status != ApplicationStatus::Approved {
            return Err(not_approved(&app));
        }
        ensure_documents(&app)?;

        let intent = self
            .gateway
            .retrieve_payment_intent(payment_intent_id)
            .await
            .map_err(|e| match e {
                GatewayError::InvalidRequest(msg) => {
                    tracing::warn!(
                        application_id = %app.id,
                        payment_intent_id = %payment_intent_id,
                        error = %msg,
                        "Gateway rejected payment intent lookup"
                    );
                    ServiceError::validation_code(
                        ErrorCode::PaymentIntentMismatch,
                        "Payment intent is unknown to the payment provider",
                    )
                }
                other => other.into(),
            })?;
        self.check_intent(&app, &intent)?;

        let paid_at = Utc::now();
        let (amount, currency) = self.fee.amount_due(&app);
        let stamp = PaidStamp {
            payment: Payment::pending(amount, currency, None),
            paid_at,
            receipt_number: receipt_number(paid_at, &intent.id),
            transaction_reference: intent.id.clone(),
        };

        match self.store.mark_paid(&app.id, &stamp, paid_at).await? {
            Some(updated) => {
                tracing::info!(
                    application_id = %updated.id,
                    event_id = %updated.event_id,
                    payment_intent_id = %intent.id,
                    receipt_number = %stamp.receipt_number,
                    "Participation fee paid"
                );
                self.notifier.notify(
                    NotifyKind::Paid,
                    &updated.vendor_email,
                    &updated.event_id,
                    Some(serde_json::json!({
                        "receiptNumber": stamp.receipt_number,
                        "amount": money::format_amount(amount, &stamp.payment.currency),
                    })),
                );
                Ok(FinalizeOutcome {
                    application: self.with_credentials(updated).await,
                    newly_paid: true,
                })
            }
            None => match self.store.find_by_id(&app.id).await? {
                None => {
                    tracing::warn!(
                        application_id = %app.id,
                        payment_intent_id = %intent.id,
                        "Payment succeeded for an application cancelled concurrently"
                    );
                    Err(ServiceError::Conflict(
                        "Application no longer exists; it was cancelled".into(),
                    ))
                }
                Some(current) if current.is_paid() => Ok(FinalizeOutcome {
                    application: self.with_credentials(current).await,
                    newly_paid: false,
                }),
                Some(current) if current.status == ApplicationStatus::Approved => {
                    ensure_documents(&current)?;
                    Err(ServiceError::Conflict(
                        "Application changed while confirming payment; please retry".into(),
                    ))
                }
                Some(current) => Err(not_approved(&current)),
            },
        }
    }

    /// The intent must belong to this application, match the amount owed and
    /// have succeeded
    fn check_intent(&self, app: &BazaarApplication, intent: &PaymentIntent) -> ServiceResult<()> {
        if intent.application_id.as_deref() != Some(app.id.as_str()) {
            tracing::warn!(
                application_id = %app.id,
                payment_intent_id = %intent.id,
                intent_application = ?intent.application_id,
                "Payment intent belongs to another application"
            );
            return Err(ServiceError::validation_code(
                ErrorCode::PaymentIntentMismatch,
                "Payment intent does not belong to this application",
            ));
        }

        let (amount_minor, currency) = self.charge_for(app)?;
        if intent.amount != amount_minor || intent.currency != currency {
            tracing::warn!(
                application_id = %app.id,
                payment_intent_id = %intent.id,
                expected = amount_minor,
                actual = intent.amount,
                "Payment intent amount mismatch"
            );
            return Err(ServiceError::validation_code(
                ErrorCode::PaymentIntentMismatch,
                "Payment intent amount does not match the participation fee",
            ));
        }

        match &intent.status {
            IntentStatus::Succeeded => Ok(()),
            IntentStatus::Processing => Err(ServiceError::validation_code(
                ErrorCode::PaymentNotCompleted,
                "Payment is still processing; please check again shortly",
            )),
            status => {
                tracing::info!(
                    application_id = %app.id,
                    payment_intent_id = %intent.id,
                    status = ?status,
                    "Payment intent not succeeded"
                );
                match &intent.last_error {
                    Some(message) => Err(ServiceError::validation_code(
                        ErrorCode::CardDeclined,
                        format!("Card payment failed: {message}"),
                    )),
                    None => Err(ServiceError::validation_code(
                        ErrorCode::PaymentNotCompleted,
                        "Payment has not been completed",
                    )),
                }
            }
        }
    }

    /// Issue any missing QR codes. Failures leave the paid state intact and are
    /// retried by the next finalize call.
    async fn with_credentials(&self, app: BazaarApplication) -> BazaarApplication {
        match self.qr.issue_for_application(&app.id).await {
            Ok(qr_codes) => BazaarApplication { qr_codes, ..app },
            Err(e) => {
                tracing::error!(application_id = %app.id, error = %e, "QR issuance failed");
                app
            }
        }
    }

    /// Gateway reported a failed charge (webhook)
    pub async fn record_failure(&self, intent: &PaymentIntent) -> ServiceResult<()> {
        let Some(application_id) = intent.application_id.as_deref() else {
            tracing::warn!(payment_intent_id = %intent.id, "Failed intent without application_id");
            return Ok(());
        };
        let Some(app) = self.store.find_by_id(application_id).await? else {
            tracing::info!(
                application_id = application_id,
                payment_intent_id = %intent.id,
                "Failed intent for unknown application"
            );
            return Ok(());
        };
        if app.is_paid() {
            return Ok(());
        }

        let message = intent
            .last_error
            .clone()
            .unwrap_or_else(|| "The payment could not be completed.".to_string());
        tracing::info!(
            application_id = %app.id,
            payment_intent_id = %intent.id,
            reason = %message,
            "Payment attempt failed"
        );
        self.notifier.notify(
            NotifyKind::PaymentFailed,
            &app.vendor_email,
            &app.event_id,
            Some(serde_json::json!({ "message": message })),
        );
        Ok(())
    }

    /// `pending -> overdue` for every payment past its due date
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> ServiceResult<usize> {
        let overdue = self.store.mark_overdue(now).await?;
        for app in &overdue {
            tracing::info!(
                application_id = %app.id,
                event_id = %app.event_id,
                "Payment marked overdue"
            );
            self.notifier
                .notify(NotifyKind::PaymentOverdue, &app.vendor_email, &app.event_id, None);
        }
        Ok(overdue.len())
    }
}
