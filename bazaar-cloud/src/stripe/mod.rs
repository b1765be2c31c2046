//! Stripe integration via REST API (no SDK dependency)
//!
//! The payment services only see [`PaymentGateway`]; [`StripeGateway`] is the
//! production implementation.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{BoxError, ServiceError};

/// Max age of a webhook timestamp before it is treated as a replay
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway timed out")]
    Timeout,
    #[error("payment gateway unreachable: {0}")]
    Transport(String),
    #[error("payment gateway error: {0}")]
    Api(String),
    /// 400/404 from the provider; not retryable
    #[error("payment gateway rejected request: {0}")]
    InvalidRequest(String),
    #[error("unexpected payment gateway response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::Malformed(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

impl From<GatewayError> for ServiceError {
    fn from(e: GatewayError) -> Self {
        ServiceError::Gateway(e.to_string())
    }
}

/// Freshly created payment intent handed to the client
#[derive(Debug, Clone)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentStatus {
    Succeeded,
    Processing,
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    RequiresCapture,
    Canceled,
    Other(String),
}

impl IntentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "succeeded" => Self::Succeeded,
            "processing" => Self::Processing,
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Authoritative intent state as reported by the gateway
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    /// Amount in minor units
    pub amount: i64,
    /// ISO 4217, uppercase
    pub currency: String,
    /// `metadata[application_id]` set at creation
    pub application_id: Option<String>,
    /// Decline message from `last_payment_error`
    pub last_error: Option<String>,
}

impl PaymentIntent {
    pub fn from_json(v: &serde_json::Value) -> Result<Self, GatewayError> {
        let id = v["id"]
            .as_str()
            .ok_or_else(|| GatewayError::Malformed("payment intent missing id".into()))?;
        let status = v["status"]
            .as_str()
            .ok_or_else(|| GatewayError::Malformed("payment intent missing status".into()))?;
        let amount = v["amount"]
            .as_i64()
            .ok_or_else(|| GatewayError::Malformed("payment intent missing amount".into()))?;
        let currency = v["currency"]
            .as_str()
            .ok_or_else(|| GatewayError::Malformed("payment intent missing currency".into()))?;

        Ok(Self {
            id: id.to_string(),
            status: IntentStatus::parse(status),
            amount,
            currency: currency.to_ascii_uppercase(),
            application_id: v["metadata"]["application_id"].as_str().map(String::from),
            last_error: v["last_payment_error"]["message"].as_str().map(String::from),
        })
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        application_id: &str,
    ) -> Result<CreatedIntent, GatewayError>;

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;
}

/// Stripe intent ids are `pi_` followed by alphanumerics
pub fn is_valid_intent_id(id: &str) -> bool {
    id.strip_prefix("pi_").is_some_and(|rest| {
        !rest.is_empty() && rest.len() <= 255 && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: &str, api_base: &str, timeout: Duration) -> Result<Self, BoxError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            secret_key: secret_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value, GatewayError> {
        let status = resp.status();
        let body = match resp.json::<serde_json::Value>().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => serde_json::Value::Null,
            Err(e) => return Err(e.into()),
        };
        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }
        Ok(body)
    }
}

/// Client errors are final; auth, rate-limit and 5xx replies stay retryable
fn classify_failure(status: reqwest::StatusCode, body: &serde_json::Value) -> GatewayError {
    let msg = body["error"]["message"]
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        reqwest::StatusCode::BAD_REQUEST | reqwest::StatusCode::NOT_FOUND => {
            GatewayError::InvalidRequest(msg)
        }
        _ => GatewayError::Api(msg),
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        application_id: &str,
    ) -> Result<CreatedIntent, GatewayError> {
        let amount = amount_minor.to_string();
        let currency = currency.to_ascii_lowercase();
        let resp = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency.as_str()),
                ("metadata[application_id]", application_id),
                ("automatic_payment_methods[enabled]", "true"),
            ])
            .send()
            .await?;
        let body = Self::read_json(resp).await?;

        let id = body["id"].as_str();
        let client_secret = body["client_secret"].as_str();
        match (id, client_secret) {
            (Some(id), Some(secret)) => Ok(CreatedIntent {
                id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            _ => Err(GatewayError::Malformed(format!(
                "Stripe create_payment_intent failed: {body}"
            ))),
        }
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        if !is_valid_intent_id(intent_id) {
            return Err(GatewayError::InvalidRequest(format!(
                "invalid payment intent id: {intent_id}"
            )));
        }
        let resp = self
            .client
            .get(format!("{}/v1/payment_intents/{intent_id}", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;
        let body = Self::read_json(resp).await?;
        PaymentIntent::from_json(&body)
    }
}

/// Verify Stripe webhook signature (HMAC-SHA256)
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), &'static str> {
    verify_webhook_signature_at(payload, sig_header, secret, chrono::Utc::now().timestamp())
}

pub fn verify_webhook_signature_at(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err("Invalid Stripe-Signature header");
    }

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // Secret rotation: any v1 entry may match
    let matched = signatures.iter().any(|sig| {
        hex::decode(sig).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });
    if !matched {
        return Err("Webhook signature mismatch");
    }

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (now - ts).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err("Webhook timestamp too old");
    }

    Ok(())
}

/// Build a `Stripe-Signature` header value (tests and local tooling)
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return format!("t={timestamp}"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn test_signature_roundtrip() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign_webhook_payload(payload, SECRET, 1_700_000_000);
        assert!(verify_webhook_signature_at(payload, &header, SECRET, 1_700_000_010).is_ok());
    }

    #[test]
    fn test_signature_rejects_tampered_payload() {
        let header = sign_webhook_payload(br#"{"id":"evt_1"}"#, SECRET, 1_700_000_000);
        assert_eq!(
            verify_webhook_signature_at(br#"{"id":"evt_2"}"#, &header, SECRET, 1_700_000_000),
            Err("Webhook signature mismatch")
        );
    }

    #[test]
    fn test_signature_rejects_replay() {
        let payload = b"{}";
        let header = sign_webhook_payload(payload, SECRET, 1_700_000_000);
        assert_eq!(
            verify_webhook_signature_at(payload, &header, SECRET, 1_700_001_000),
            Err("Webhook timestamp too old")
        );
    }

    #[test]
    fn test_signature_accepts_any_v1_entry() {
        let payload = b"{}";
        let good = sign_webhook_payload(payload, SECRET, 1_700_000_000);
        let v1 = good.split(",v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1=deadbeef,v1={v1}");
        assert!(verify_webhook_signature_at(payload, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_missing_header_parts() {
        assert!(verify_webhook_signature_at(b"{}", "v1=abc", SECRET, 0).is_err());
        assert!(verify_webhook_signature_at(b"{}", "t=1", SECRET, 0).is_err());
    }

    #[test]
    fn test_parse_intent() {
        let v = serde_json::json!({
            "id": "pi_123",
            "status": "requires_payment_method",
            "amount": 100000,
            "currency": "egp",
            "metadata": { "application_id": "app-1" },
            "last_payment_error": { "message": "Your card was declined." }
        });
        let intent = PaymentIntent::from_json(&v).unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
        assert_eq!(intent.currency, "EGP");
        assert_eq!(intent.application_id.as_deref(), Some("app-1"));
        assert_eq!(intent.last_error.as_deref(), Some("Your card was declined."));
    }

    #[test]
    fn test_intent_id_shape() {
        assert!(is_valid_intent_id("pi_3Nabc123"));
        assert!(!is_valid_intent_id("pi_"));
        assert!(!is_valid_intent_id("pi_../../v1/customers"));
        assert!(!is_valid_intent_id("ch_123"));
    }

    #[test]
    fn test_failure_classification() {
        let body = serde_json::json!({
            "error": { "message": "No such payment_intent: 'pi_gone'" }
        });
        match classify_failure(reqwest::StatusCode::NOT_FOUND, &body) {
            GatewayError::InvalidRequest(msg) => assert!(msg.contains("pi_gone")),
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
        assert!(matches!(
            classify_failure(reqwest::StatusCode::BAD_REQUEST, &serde_json::Value::Null),
            GatewayError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify_failure(reqwest::StatusCode::BAD_GATEWAY, &serde_json::Value::Null),
            GatewayError::Api(_)
        ));
        assert!(matches!(
            classify_failure(reqwest::StatusCode::TOO_MANY_REQUESTS, &body),
            GatewayError::Api(_)
        ));
    }
}
