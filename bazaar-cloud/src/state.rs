//! Application state for bazaar-cloud

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_sesv2::Client as SesClient;
use sqlx::PgPool;

use crate::config::Config;
use crate::db::{ApplicationStore, MemoryApplicationStore, PgApplicationStore};
use crate::email::{LogNotifier, SesNotifier};
use crate::error::BoxError;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::services::{
    AttendeeDocumentManager, ApplicationLifecycle, FeePolicy, PaymentOrchestrator, QrCodeIssuer,
};
use crate::storage::{DocumentStore, LocalDocumentStore, S3DocumentStore};
use crate::stripe::{PaymentGateway, StripeGateway};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ApplicationStore>,
    pub lifecycle: Arc<ApplicationLifecycle>,
    pub attendees: Arc<AttendeeDocumentManager>,
    pub payments: Arc<PaymentOrchestrator>,
    pub qr: Arc<QrCodeIssuer>,
    /// JWT secret for principal authentication
    pub jwt_secret: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
}

/// Collaborators an [`AppState`] is assembled from
pub struct StateParts {
    pub store: Arc<dyn ApplicationStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub documents: Arc<dyn DocumentStore>,
    pub notifier: NotificationDispatcher,
    pub fee: FeePolicy,
    pub jwt_secret: String,
    pub stripe_webhook_secret: String,
    pub qr_signing_secret: String,
    pub qr_render_base_url: String,
    pub public_base_url: String,
}

impl AppState {
    pub fn from_parts(parts: StateParts) -> Result<Self, BoxError> {
        let qr = Arc::new(QrCodeIssuer::new(
            parts.store.clone(),
            &parts.qr_signing_secret,
            &parts.qr_render_base_url,
            &parts.public_base_url,
        )?);

        Ok(Self {
            lifecycle: Arc::new(ApplicationLifecycle::new(
                parts.store.clone(),
                parts.notifier.clone(),
                parts.fee.clone(),
            )),
            attendees: Arc::new(AttendeeDocumentManager::new(
                parts.store.clone(),
                parts.documents,
            )),
            payments: Arc::new(PaymentOrchestrator::new(
                parts.store.clone(),
                parts.gateway,
                qr.clone(),
                parts.notifier,
                parts.fee,
            )),
            qr,
            store: parts.store,
            jwt_secret: parts.jwt_secret,
            stripe_webhook_secret: parts.stripe_webhook_secret,
        })
    }

    /// Create a new AppState
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let store: Arc<dyn ApplicationStore> = match &config.database_url {
            Some(url) => {
                let pool = PgPool::connect(url).await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("PostgreSQL store ready");
                Arc::new(PgApplicationStore::new(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store (data is not persisted)");
                Arc::new(MemoryApplicationStore::new())
            }
        };

        let needs_aws = config.document_s3_bucket.is_some() || config.ses_from_email.is_some();
        let aws_config = if needs_aws {
            Some(aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await)
        } else {
            None
        };

        let documents: Arc<dyn DocumentStore> = match (&config.document_s3_bucket, &aws_config) {
            (Some(bucket), Some(aws)) => {
                tracing::info!(bucket = %bucket, "Attendee documents stored in S3");
                Arc::new(S3DocumentStore::new(S3Client::new(aws), bucket))
            }
            _ => {
                tracing::info!(dir = %config.document_dir, "Attendee documents stored on local disk");
                Arc::new(LocalDocumentStore::new(&config.document_dir))
            }
        };

        let notifier: Arc<dyn Notifier> = match (&config.ses_from_email, &aws_config) {
            (Some(from), Some(aws)) => {
                let ses = if let Ok(ses_region) = std::env::var("SES_REGION") {
                    let ses_config = aws
                        .to_builder()
                        .region(aws_config::Region::new(ses_region))
                        .build();
                    SesClient::new(&ses_config)
                } else {
                    SesClient::new(aws)
                };
                Arc::new(SesNotifier::new(ses, from))
            }
            _ => {
                tracing::warn!("SES_FROM_EMAIL not set, notifications are only logged");
                Arc::new(LogNotifier)
            }
        };

        let gateway = StripeGateway::new(
            &config.stripe_secret_key,
            &config.stripe_api_base,
            Duration::from_secs(config.gateway_timeout_secs),
        )?;

        Self::from_parts(StateParts {
            store,
            gateway: Arc::new(gateway),
            documents,
            notifier: NotificationDispatcher::spawn(notifier),
            fee: FeePolicy {
                amount: config.participation_fee,
                currency: config.participation_currency.clone(),
                due_days: config.payment_due_days,
            },
            jwt_secret: config.jwt_secret.clone(),
            stripe_webhook_secret: config.stripe_webhook_secret.clone(),
            qr_signing_secret: config.qr_signing_secret.clone(),
            qr_render_base_url: config.qr_render_base_url.clone(),
            public_base_url: config.public_base_url.clone(),
        })
    }
}
