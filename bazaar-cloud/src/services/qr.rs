//! Visitor QR credentials
//!
//! One credential per attendee, issued only once the participation fee is
//! paid. The QR image encodes a verification link carrying an HMAC-signed
//! token bound to the application, the event and the attendee's email.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use shared::error::ErrorCode;
use shared::models::{BazaarApplication, QrCode};

use crate::db::ApplicationStore;
use crate::error::{BoxError, ServiceError, ServiceResult};

/// Compare-and-set attempts before giving up on a contended application
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Rendered QR image size
const QR_IMAGE_SIZE: &str = "300x300";

/// Claims carried by a visitor token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrClaims {
    pub application_id: String,
    pub event_id: String,
    pub visitor_email: String,
}

pub struct QrCodeIssuer {
    store: Arc<dyn ApplicationStore>,
    mac: Hmac<Sha256>,
    render_base: Url,
    verify_base: String,
}

impl QrCodeIssuer {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        secret: &str,
        render_base_url: &str,
        public_base_url: &str,
    ) -> Result<Self, BoxError> {
        if secret.is_empty() {
            return Err("QR signing secret must not be empty".into());
        }
        let mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|_| "Invalid QR signing secret")?;
        Ok(Self {
            store,
            mac,
            render_base: Url::parse(render_base_url)?,
            verify_base: format!("{}/qr/verify", public_base_url.trim_end_matches('/')),
        })
    }

    /// `base64url(claims json) . base64url(hmac)`
    pub fn sign(&self, claims: &QrClaims) -> String {
        let payload = serde_json::to_vec(claims).unwrap_or_default();
        let mut mac = self.mac.clone();
        mac.update(&payload);
        let sig = mac.finalize().into_bytes();
        format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), URL_SAFE_NO_PAD.encode(sig))
    }

    /// Check a token's signature and decode its claims
    pub fn verify_token(&self, token: &str) -> ServiceResult<QrClaims> {
        let invalid = || ServiceError::validation_code(ErrorCode::QrTokenInvalid, "Invalid QR code");

        let (payload_b64, sig_b64) = token.split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| invalid())?;
        let sig = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| invalid())?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        mac.verify_slice(&sig).map_err(|_| invalid())?;

        serde_json::from_slice(&payload).map_err(|_| invalid())
    }

    /// Verify a token against the live application: it must still exist, be
    /// paid, and hold a credential for the visitor
    pub async fn verify_pass(&self, token: &str) -> ServiceResult<QrClaims> {
        let claims = self.verify_token(token)?;
        let app = self.store.find_by_id(&claims.application_id).await?;
        let valid = app.is_some_and(|a| {
            a.event_id == claims.event_id
                && a.is_paid()
                && a.qr_codes
                    .iter()
                    .any(|q| q.visitor_email.eq_ignore_ascii_case(&claims.visitor_email))
        });
        if !valid {
            return Err(ServiceError::validation_code(
                ErrorCode::QrTokenInvalid,
                "QR code is no longer valid",
            ));
        }
        Ok(claims)
    }

    fn credential_for(&self, app: &BazaarApplication, email: &str) -> QrCode {
        let token = self.sign(&QrClaims {
            application_id: app.id.clone(),
            event_id: app.event_id.clone(),
            visitor_email: email.to_ascii_lowercase(),
        });
        let mut url = self.render_base.clone();
        url.query_pairs_mut()
            .append_pair("size", QR_IMAGE_SIZE)
            .append_pair("data", &format!("{}/{token}", self.verify_base));
        QrCode {
            visitor_email: email.to_string(),
            qr_code_url: url.to_string(),
            issued_at: Some(Utc::now()),
        }
    }

    /// Issue credentials for every attendee that lacks one. A no-op when all
    /// attendees are covered.
    pub async fn issue_for_application(&self, application_id: &str) -> ServiceResult<Vec<QrCode>> {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let app = self
                .store
                .find_by_id(application_id)
                .await?
                .ok_or_else(ServiceError::application_not_found)?;
            if !app.is_paid() {
                return Err(ServiceError::invalid_state(
                    "QR codes are issued only after payment",
                ));
            }

            let missing: Vec<String> = app
                .attendees_missing_qr()
                .into_iter()
                .map(|a| a.email.clone())
                .collect();
            if missing.is_empty() {
                return Ok(app.qr_codes);
            }

            let mut codes = app.qr_codes.clone();
            codes.extend(missing.iter().map(|email| self.credential_for(&app, email)));

            if let Some(updated) = self
                .store
                .set_qr_codes(&app.id, app.qr_codes.len(), &codes, Utc::now())
                .await?
            {
                tracing::info!(
                    application_id = %app.id,
                    event_id = %app.event_id,
                    issued = missing.len(),
                    total = updated.qr_codes.len(),
                    "Visitor QR codes issued"
                );
                return Ok(updated.qr_codes);
            }
            tracing::debug!(application_id = %app.id, "QR list changed concurrently, retrying");
        }

        Err(ServiceError::Conflict(
            "QR codes changed concurrently; please retry".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryApplicationStore;

    fn issuer() -> QrCodeIssuer {
        QrCodeIssuer::new(
            Arc::new(MemoryApplicationStore::new()),
            "qr-secret",
            "https://qr.example.com/render",
            "https://bazaar.example.com/",
        )
        .unwrap()
    }

    fn claims() -> QrClaims {
        QrClaims {
            application_id: "app-1".into(),
            event_id: "e1".into(),
            visitor_email: "mona@example.com".into(),
        }
    }

    #[test]
    fn test_token_roundtrip() {
        let qr = issuer();
        let token = qr.sign(&claims());
        assert_eq!(qr.verify_token(&token).unwrap(), claims());
    }

    #[test]
    fn test_token_from_other_key_rejected() {
        let other = QrCodeIssuer::new(
            Arc::new(MemoryApplicationStore::new()),
            "different",
            "https://qr.example.com/render",
            "https://bazaar.example.com",
        )
        .unwrap();
        let token = other.sign(&claims());
        assert!(matches!(
            issuer().verify_token(&token).unwrap_err(),
            ServiceError::Validation { code: ErrorCode::QrTokenInvalid, .. }
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let qr = issuer();
        let token = qr.sign(&claims());
        let (_, sig) = token.split_once('.').unwrap();
        let mut forged = claims();
        forged.visitor_email = "intruder@example.com".into();
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        assert!(qr.verify_token(&format!("{payload}.{sig}")).is_err());
        assert!(qr.verify_token("garbage").is_err());
    }

    #[test]
    fn test_render_url_embeds_verification_link() {
        let qr = issuer();
        let now = Utc::now();
        let app = BazaarApplication {
            id: "app-1".into(),
            vendor_id: "v1".into(),
            vendor_email: "v1@example.com".into(),
            company_name: None,
            event_id: "e1".into(),
            status: shared::models::ApplicationStatus::Approved,
            rejection_reason: None,
            attendees: vec![],
            booth_size: shared::models::BoothSize::TwoByTwo,
            booth_location: None,
            booth_start_time: None,
            booth_end_time: None,
            booth_duration_weeks: None,
            payment: None,
            qr_codes: vec![],
            created_at: now,
            updated_at: now,
        };
        let code = qr.credential_for(&app, "Mona@Example.com");
        let url = Url::parse(&code.qr_code_url).unwrap();
        let data = url
            .query_pairs()
            .find(|(k, _)| k == "data")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(data.starts_with("https://bazaar.example.com/qr/verify/"));
        let token = data.rsplit('/').next().unwrap();
        assert_eq!(qr.verify_token(token).unwrap().visitor_email, "mona@example.com");
        assert!(code.issued_at.is_some());
    }
}
