#![allow(dead_code)]

mod gateway;

pub use gateway::ScriptedGateway;

use std::sync::Arc;

use bazaar_cloud::auth::{Principal, Role};
use bazaar_cloud::db::{ApplicationStore, MemoryApplicationStore};
use bazaar_cloud::notify::{NotificationDispatcher, NotifyIntent, NotifyKind};
use bazaar_cloud::services::FeePolicy;
use bazaar_cloud::services::attendees::AttendeeSubmission;
use bazaar_cloud::services::lifecycle::ApplyRequest;
use bazaar_cloud::state::{AppState, StateParts};
use bazaar_cloud::storage::LocalDocumentStore;
use shared::models::BazaarApplication;
use tokio::sync::mpsc::UnboundedReceiver;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryApplicationStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub notifications: UnboundedReceiver<NotifyIntent>,
    pub documents: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryApplicationStore::new());
        let gateway = Arc::new(ScriptedGateway::new());
        let documents = tempfile::tempdir().unwrap();
        let (notifier, notifications) = NotificationDispatcher::channel();

        let state = AppState::from_parts(StateParts {
            store: store.clone(),
            gateway: gateway.clone(),
            documents: Arc::new(LocalDocumentStore::new(documents.path())),
            notifier,
            fee: FeePolicy::default(),
            jwt_secret: JWT_SECRET.into(),
            stripe_webhook_secret: WEBHOOK_SECRET.into(),
            qr_signing_secret: "qr-secret".into(),
            qr_render_base_url: "https://qr.example.com/render".into(),
            public_base_url: "https://bazaar.example.com".into(),
        })
        .unwrap();

        Self {
            state,
            store,
            gateway,
            notifications,
            documents,
        }
    }

    /// Drain queued notification kinds
    pub fn notified(&mut self) -> Vec<NotifyKind> {
        let mut kinds = Vec::new();
        while let Ok(intent) = self.notifications.try_recv() {
            kinds.push(intent.kind);
        }
        kinds
    }

    pub async fn reload(&self, id: &str) -> Option<BazaarApplication> {
        self.store.find_by_id(id).await.unwrap()
    }

    /// Pending application with `n` attendees and no documents
    pub async fn applied(&self, vendor: &Principal, event_id: &str, n: usize) -> BazaarApplication {
        self.state
            .lifecycle
            .apply(vendor, event_id, apply_request(n))
            .await
            .unwrap()
    }

    /// Approved application whose attendees all have documents
    pub async fn approved_with_documents(
        &self,
        vendor: &Principal,
        event_id: &str,
        n: usize,
    ) -> BazaarApplication {
        let app = self.applied(vendor, event_id, n).await;
        self.state
            .lifecycle
            .approve(&office(), event_id, &app.id)
            .await
            .unwrap();
        self.state
            .attendees
            .update(vendor, event_id, uploads(n))
            .await
            .unwrap();
        self.reload(&app.id).await.unwrap()
    }

    /// Create an intent for the vendor's application and script it to succeed
    pub async fn paid_intent(&self, vendor: &Principal, event_id: &str) -> String {
        let intent = self
            .state
            .payments
            .create_intent(vendor, event_id)
            .await
            .unwrap();
        self.gateway.succeed(&intent.payment_intent_id);
        intent.payment_intent_id
    }
}

pub fn vendor(id: &str) -> Principal {
    Principal::new(id, format!("{id}@vendors.example.com"), Role::Vendor).with_company("Koshary Co")
}

pub fn office() -> Principal {
    Principal::new("office-1", "office@example.com", Role::EventsOffice)
}

pub fn attendee_email(i: usize) -> String {
    format!("attendee{i}@example.com")
}

pub fn apply_request(n: usize) -> ApplyRequest {
    let attendees: Vec<_> = (0..n)
        .map(|i| serde_json::json!({ "name": format!("Attendee {i}"), "email": attendee_email(i) }))
        .collect();
    serde_json::from_value(serde_json::json!({
        "boothSize": "4x4",
        "startDate": "2024-01-01",
        "durationWeeks": 2,
        "attendees": attendees,
    }))
    .unwrap()
}

/// One fresh PDF per attendee
pub fn uploads(n: usize) -> Vec<AttendeeSubmission> {
    (0..n)
        .map(|i| {
            AttendeeSubmission::new(&format!("Attendee {i}"), &attendee_email(i))
                .with_file(&format!("id-{i}.pdf"), format!("%PDF-1.4 attendee {i}").into_bytes())
        })
        .collect()
}
