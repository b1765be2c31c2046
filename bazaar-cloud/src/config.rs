//! Service configuration

use rust_decimal::Decimal;
use std::str::FromStr;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// HTTP port
    pub http_port: u16,
    /// PostgreSQL connection URL (optional in development: in-memory store)
    pub database_url: Option<String>,
    /// JWT secret shared with the auth service that issues principals
    pub jwt_secret: String,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Stripe REST base URL
    pub stripe_api_base: String,
    /// Timeout applied to every gateway call
    pub gateway_timeout_secs: u64,
    /// S3 bucket for attendee ID documents (local storage when unset)
    pub document_s3_bucket: Option<String>,
    /// Local directory for attendee ID documents
    pub document_dir: String,
    /// SES sender address (notifications are only logged when unset)
    pub ses_from_email: Option<String>,
    /// Participation fee charged when no payment record exists yet
    pub participation_fee: Decimal,
    /// ISO 4217 currency of the participation fee
    pub participation_currency: String,
    /// Days between approval and the payment due date
    pub payment_due_days: i64,
    /// HMAC key for visitor QR tokens
    pub qr_signing_secret: String,
    /// QR image renderer; the verification URL is passed as `data`
    pub qr_render_base_url: String,
    /// Public base URL of this service (QR verification links)
    pub public_base_url: String,
    /// Interval of the overdue-payment sweep
    pub overdue_sweep_secs: u64,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn parse_or<T: FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn optional(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|s| !s.is_empty())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let database_url = Self::optional("DATABASE_URL");
        if database_url.is_none() && environment != "development" {
            return Err("DATABASE_URL must be set".into());
        }

        let participation_fee = match std::env::var("PARTICIPATION_FEE") {
            Ok(v) => Decimal::from_str(&v)
                .map_err(|e| format!("PARTICIPATION_FEE is not a decimal: {e}"))?,
            Err(_) => Decimal::from(1000),
        };

        Ok(Self {
            http_port: Self::parse_or("HTTP_PORT", 8080),
            database_url,
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            stripe_api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".into()),
            gateway_timeout_secs: Self::parse_or("GATEWAY_TIMEOUT_SECS", 15),
            document_s3_bucket: Self::optional("DOCUMENT_S3_BUCKET"),
            document_dir: std::env::var("DOCUMENT_DIR")
                .unwrap_or_else(|_| "data/documents".into()),
            ses_from_email: Self::optional("SES_FROM_EMAIL"),
            participation_fee,
            participation_currency: std::env::var("PARTICIPATION_CURRENCY")
                .unwrap_or_else(|_| "EGP".into())
                .to_ascii_uppercase(),
            payment_due_days: Self::parse_or("PAYMENT_DUE_DAYS", 14),
            qr_signing_secret: Self::require_secret("QR_SIGNING_SECRET", &environment)?,
            qr_render_base_url: std::env::var("QR_RENDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.qrserver.com/v1/create-qr-code/".into()),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            overdue_sweep_secs: Self::parse_or("OVERDUE_SWEEP_SECS", 300),
            environment,
        })
    }
}
