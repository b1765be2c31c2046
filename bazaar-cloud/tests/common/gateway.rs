//! In-process payment gateway
//!
//! Intents live in memory; tests script their outcome with [`ScriptedGateway::succeed`]
//! and [`ScriptedGateway::decline`] before finalizing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use bazaar_cloud::stripe::{CreatedIntent, GatewayError, IntentStatus, PaymentGateway, PaymentIntent};

#[derive(Default)]
pub struct ScriptedGateway {
    intents: DashMap<String, PaymentIntent>,
    next_id: AtomicUsize,
    timeout: AtomicBool,
    created: AtomicUsize,
    retrieved: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`GatewayError::Timeout`] until cleared
    pub fn set_timeout(&self, on: bool) {
        self.timeout.store(on, Ordering::SeqCst);
    }

    /// Register an intent as-is (foreign or tampered intents)
    pub fn insert(&self, intent: PaymentIntent) {
        self.intents.insert(intent.id.clone(), intent);
    }

    pub fn succeed(&self, intent_id: &str) {
        if let Some(mut intent) = self.intents.get_mut(intent_id) {
            intent.status = IntentStatus::Succeeded;
            intent.last_error = None;
        }
    }

    pub fn decline(&self, intent_id: &str, message: &str) {
        if let Some(mut intent) = self.intents.get_mut(intent_id) {
            intent.status = IntentStatus::RequiresPaymentMethod;
            intent.last_error = Some(message.to_string());
        }
    }

    pub fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.intents.get(intent_id).map(|i| i.clone())
    }

    pub fn create_calls(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieved.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        application_id: &str,
    ) -> Result<CreatedIntent, GatewayError> {
        if self.timeout.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        self.created.fetch_add(1, Ordering::SeqCst);

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_mock{n}");
        self.intents.insert(
            id.clone(),
            PaymentIntent {
                id: id.clone(),
                status: IntentStatus::RequiresPaymentMethod,
                amount: amount_minor,
                currency: currency.to_ascii_uppercase(),
                application_id: Some(application_id.to_string()),
                last_error: None,
            },
        );
        Ok(CreatedIntent {
            client_secret: format!("{id}_secret_mock"),
            id,
        })
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        if self.timeout.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        self.retrieved.fetch_add(1, Ordering::SeqCst);
        self.intent(intent_id)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("No such payment_intent: '{intent_id}'")))
    }
}
