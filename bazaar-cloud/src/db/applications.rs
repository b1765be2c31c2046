//! PostgreSQL-backed application store
//!
//! One row per application; attendees and QR codes live in JSONB columns so a
//! single-row UPDATE replaces them atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::models::{
    ApplicationStatus, Attendee, BazaarApplication, BoothSize, MAX_ATTENDEES, MIN_ATTENDEES,
    Payment, PaymentStatus, QrCode,
};
use sqlx::PgPool;
use sqlx::types::Json;

use super::{ApplicationStore, BoxError, Decision, PaidStamp};

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: String,
    vendor_id: String,
    vendor_email: String,
    company_name: Option<String>,
    event_id: String,
    status: String,
    rejection_reason: Option<String>,
    attendees: Json<Vec<Attendee>>,
    booth_size: String,
    booth_location: Option<String>,
    booth_start_time: Option<DateTime<Utc>>,
    booth_end_time: Option<DateTime<Utc>>,
    booth_duration_weeks: Option<f64>,
    payment_amount: Option<Decimal>,
    payment_currency: Option<String>,
    payment_status: Option<String>,
    payment_due_date: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    receipt_number: Option<String>,
    transaction_reference: Option<String>,
    qr_codes: Json<Vec<QrCode>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ApplicationRow {
    fn into_model(self) -> Result<BazaarApplication, BoxError> {
        let status = ApplicationStatus::from_db(&self.status)
            .ok_or_else(|| format!("Unknown application status: {}", self.status))?;
        let booth_size = BoothSize::from_db(&self.booth_size)
            .ok_or_else(|| format!("Unknown booth size: {}", self.booth_size))?;

        let payment = match (self.payment_status, self.payment_amount, self.payment_currency) {
            (None, _, _) => None,
            (Some(s), Some(amount), Some(currency)) => Some(Payment {
                amount,
                currency,
                status: PaymentStatus::from_db(&s)
                    .ok_or_else(|| format!("Unknown payment status: {s}"))?,
                due_date: self.payment_due_date,
                paid_at: self.paid_at,
                receipt_number: self.receipt_number,
                transaction_reference: self.transaction_reference,
            }),
            (Some(_), _, _) => {
                return Err(format!("Application {} has an incomplete payment record", self.id).into());
            }
        };

        Ok(BazaarApplication {
            id: self.id,
            vendor_id: self.vendor_id,
            vendor_email: self.vendor_email,
            company_name: self.company_name,
            event_id: self.event_id,
            status,
            rejection_reason: self.rejection_reason,
            attendees: self.attendees.0,
            booth_size,
            booth_location: self.booth_location,
            booth_start_time: self.booth_start_time,
            booth_end_time: self.booth_end_time,
            booth_duration_weeks: self.booth_duration_weeks,
            payment,
            qr_codes: self.qr_codes.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_model(row: Option<ApplicationRow>) -> Result<Option<BazaarApplication>, BoxError> {
    row.map(ApplicationRow::into_model).transpose()
}

fn into_models(rows: Vec<ApplicationRow>) -> Result<Vec<BazaarApplication>, BoxError> {
    rows.into_iter().map(ApplicationRow::into_model).collect()
}

#[derive(Clone)]
pub struct PgApplicationStore {
    pool: PgPool,
}

impl PgApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationStore for PgApplicationStore {
    async fn insert(&self, app: &BazaarApplication) -> Result<bool, BoxError> {
        let payment = app.payment.as_ref();
        let result = sqlx::query(
            "INSERT INTO bazaar_applications (
                id, vendor_id, vendor_email, company_name, event_id, status, rejection_reason,
                attendees, booth_size, booth_location, booth_start_time, booth_end_time,
                booth_duration_weeks, payment_amount, payment_currency, payment_status,
                payment_due_date, paid_at, receipt_number, transaction_reference, qr_codes,
                created_at, updated_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                       $17, $18, $19, $20, $21, $22, $23)
             ON CONFLICT (vendor_id, event_id) DO NOTHING",
        )
        .bind(&app.id)
        .bind(&app.vendor_id)
        .bind(&app.vendor_email)
        .bind(&app.company_name)
        .bind(&app.event_id)
        .bind(app.status.as_db())
        .bind(&app.rejection_reason)
        .bind(Json(&app.attendees))
        .bind(app.booth_size.as_db())
        .bind(&app.booth_location)
        .bind(app.booth_start_time)
        .bind(app.booth_end_time)
        .bind(app.booth_duration_weeks)
        .bind(payment.map(|p| p.amount))
        .bind(payment.map(|p| p.currency.as_str()))
        .bind(payment.map(|p| p.status.as_db()))
        .bind(payment.and_then(|p| p.due_date))
        .bind(payment.and_then(|p| p.paid_at))
        .bind(payment.and_then(|p| p.receipt_number.as_deref()))
        .bind(payment.and_then(|p| p.transaction_reference.as_deref()))
        .bind(Json(&app.qr_codes))
        .bind(app.created_at)
        .bind(app.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<BazaarApplication>, BoxError> {
        let row: Option<ApplicationRow> =
            sqlx::query_as("SELECT * FROM bazaar_applications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        into_model(row)
    }

    async fn find_by_vendor_event(
        &self,
        vendor_id: &str,
        event_id: &str,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        let row: Option<ApplicationRow> = sqlx::query_as(
            "SELECT * FROM bazaar_applications WHERE vendor_id = $1 AND event_id = $2",
        )
        .bind(vendor_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        into_model(row)
    }

    async fn list_by_vendor(&self, vendor_id: &str) -> Result<Vec<BazaarApplication>, BoxError> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(
            "SELECT * FROM bazaar_applications WHERE vendor_id = $1 ORDER BY created_at DESC",
        )
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await?;
        into_models(rows)
    }

    async fn list_by_event(&self, event_id: &str) -> Result<Vec<BazaarApplication>, BoxError> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(
            "SELECT * FROM bazaar_applications WHERE event_id = $1 ORDER BY created_at ASC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        into_models(rows)
    }

    async fn decide(
        &self,
        id: &str,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        let payment = decision.payment.as_ref();
        let row: Option<ApplicationRow> = sqlx::query_as(
            "UPDATE bazaar_applications SET
                status = $2,
                rejection_reason = $3,
                payment_amount = COALESCE($4, payment_amount),
                payment_currency = COALESCE($5, payment_currency),
                payment_status = COALESCE($6, payment_status),
                payment_due_date = COALESCE($7, payment_due_date),
                updated_at = $8
             WHERE id = $1 AND status = 'pending'
             RETURNING *",
        )
        .bind(id)
        .bind(decision.status.as_db())
        .bind(&decision.rejection_reason)
        .bind(payment.map(|p| p.amount))
        .bind(payment.map(|p| p.currency.as_str()))
        .bind(payment.map(|p| p.status.as_db()))
        .bind(payment.and_then(|p| p.due_date))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        into_model(row)
    }

    async fn set_booth_location(
        &self,
        id: &str,
        location: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        let row: Option<ApplicationRow> = sqlx::query_as(
            "UPDATE bazaar_applications SET booth_location = $2, updated_at = $3
             WHERE id = $1 AND status <> 'rejected'
             RETURNING *",
        )
        .bind(id)
        .bind(location)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        into_model(row)
    }

    async fn replace_attendees(
        &self,
        id: &str,
        attendees: &[Attendee],
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        let row: Option<ApplicationRow> = sqlx::query_as(
            "UPDATE bazaar_applications SET attendees = $2, updated_at = $3
             WHERE id = $1
               AND status <> 'rejected'
               AND payment_status IS DISTINCT FROM 'paid'
             RETURNING *",
        )
        .bind(id)
        .bind(Json(attendees))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        into_model(row)
    }

    async fn delete_if_cancellable(&self, id: &str, vendor_id: &str) -> Result<bool, BoxError> {
        let result = sqlx::query(
            "DELETE FROM bazaar_applications
             WHERE id = $1
               AND vendor_id = $2
               AND status = 'pending'
               AND payment_status IS DISTINCT FROM 'paid'",
        )
        .bind(id)
        .bind(vendor_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_paid(
        &self,
        id: &str,
        stamp: &PaidStamp,
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        let row: Option<ApplicationRow> = sqlx::query_as(
            "UPDATE bazaar_applications SET
                payment_status = 'paid',
                payment_amount = $2,
                payment_currency = $3,
                paid_at = $4,
                receipt_number = $5,
                transaction_reference = $6,
                updated_at = $7
             WHERE id = $1
               AND status = 'approved'
               AND (payment_status IS NULL OR payment_status IN ('pending', 'overdue'))
               AND jsonb_array_length(attendees) BETWEEN $8 AND $9
               AND NOT EXISTS (
                   SELECT 1 FROM jsonb_array_elements(attendees) AS a
                   WHERE COALESCE(btrim(a->>'idDocumentPath'), '') = ''
               )
             RETURNING *",
        )
        .bind(id)
        .bind(stamp.payment.amount)
        .bind(&stamp.payment.currency)
        .bind(stamp.paid_at)
        .bind(&stamp.receipt_number)
        .bind(&stamp.transaction_reference)
        .bind(now)
        .bind(MIN_ATTENDEES as i32)
        .bind(MAX_ATTENDEES as i32)
        .fetch_optional(&self.pool)
        .await?;
        into_model(row)
    }

    async fn set_qr_codes(
        &self,
        id: &str,
        expected_len: usize,
        codes: &[QrCode],
        now: DateTime<Utc>,
    ) -> Result<Option<BazaarApplication>, BoxError> {
        let expected = i32::try_from(expected_len)?;
        let row: Option<ApplicationRow> = sqlx::query_as(
            "UPDATE bazaar_applications SET qr_codes = $3, updated_at = $4
             WHERE id = $1
               AND payment_status = 'paid'
               AND jsonb_array_length(qr_codes) = $2
             RETURNING *",
        )
        .bind(id)
        .bind(expected)
        .bind(Json(codes))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        into_model(row)
    }

    async fn mark_overdue(&self, now: DateTime<Utc>) -> Result<Vec<BazaarApplication>, BoxError> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(
            "UPDATE bazaar_applications SET payment_status = 'overdue', updated_at = $1
             WHERE payment_status = 'pending'
               AND payment_due_date IS NOT NULL
               AND payment_due_date < $1
             RETURNING *",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        into_models(rows)
    }

    async fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, BoxError> {
        let result = sqlx::query(
            "INSERT INTO processed_webhook_events (event_id, event_type, processed_at)
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_webhook_event(&self, event_id: &str) -> Result<(), BoxError> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
