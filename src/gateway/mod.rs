//! Boundary to the external payment processor.
//!
//! The gateway is consumed through the [`PaymentGateway`] trait so the
//! reconciliation core never depends on the concrete HTTP integration.
//! Contract: each initiated attempt eventually yields at most one terminal
//! result per reference, never both success and failure.

use crate::{config::AppConfig, errors::ServiceError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Result of initiating a charge: where to send the payer, and the opaque
/// reference correlating every later signal for this attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatedPayment {
    pub reference: String,
    pub redirect_url: String,
}

/// Authoritative verification result as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Succeeded,
    Failed,
    Pending,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiate a charge for an order. Network failure here is retryable;
    /// the order has not left `pending`.
    async fn initiate(
        &self,
        order_id: Uuid,
        amount: Decimal,
        payer_contact: &str,
    ) -> Result<InitiatedPayment, ServiceError>;

    /// Server-side verification of an attempt. This is the only signal the
    /// reconciliation core trusts; redirect callbacks are advisory.
    async fn verify(
        &self,
        reference: &str,
        order_id: Uuid,
    ) -> Result<VerificationStatus, ServiceError>;
}

#[derive(Debug, Serialize)]
struct InitiateChargeRequest<'a> {
    order_id: Uuid,
    amount: Decimal,
    contact: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyChargeResponse {
    status: VerificationStatus,
}

/// reqwest-backed gateway client.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret: String,
}

impl HttpPaymentGateway {
    pub fn new(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.gateway_request_timeout())
            .build()
            .map_err(|e| ServiceError::InternalError(format!("gateway client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.gateway_base_url.trim_end_matches('/').to_string(),
            secret: cfg.gateway_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate(
        &self,
        order_id: Uuid,
        amount: Decimal,
        payer_contact: &str,
    ) -> Result<InitiatedPayment, ServiceError> {
        let url = format!("{}/v1/charges", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret)
            .json(&InitiateChargeRequest {
                order_id,
                amount,
                contact: payer_contact,
            })
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(format!("initiate: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewayUnavailable(format!(
                "initiate returned {}",
                response.status()
            )));
        }

        response
            .json::<InitiatedPayment>()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(format!("initiate body: {e}")))
    }

    async fn verify(
        &self,
        reference: &str,
        order_id: Uuid,
    ) -> Result<VerificationStatus, ServiceError> {
        let url = format!("{}/v1/charges/{}/verify", self.base_url, reference);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret)
            .query(&[("order_id", order_id.to_string())])
            .send()
            .await
            .map_err(|e| ServiceError::GatewayUnavailable(format!("verify: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::GatewayUnavailable(format!(
                "verify returned {}",
                response.status()
            )));
        }

        response
            .json::<VerifyChargeResponse>()
            .await
            .map(|body| body.status)
            .map_err(|e| ServiceError::GatewayUnavailable(format!("verify body: {e}")))
    }
}

/// Check the HMAC-SHA256 signature the gateway attaches to webhook
/// deliveries. Verification is constant-time via `Mac::verify_slice`.
pub fn verify_webhook_signature(
    secret: &str,
    body: &[u8],
    signature_hex: &str,
) -> Result<(), ServiceError> {
    let signature = hex::decode(signature_hex)
        .map_err(|_| ServiceError::AuthError("malformed webhook signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("hmac key: {e}")))?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| ServiceError::AuthError("webhook signature mismatch".to_string()))
}

/// Sign a webhook body the way the gateway does. Used by tests and local
/// tooling.
pub fn sign_webhook_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_signature_roundtrip() {
        let body = br#"{"order_id":"x","reference":"ref-1","status":"succeeded"}"#;
        let signature = sign_webhook_body("secret", body);
        assert!(verify_webhook_signature("secret", body, &signature).is_ok());
    }

    #[test]
    fn tampered_body_rejected() {
        let signature = sign_webhook_body("secret", b"original");
        assert!(verify_webhook_signature("secret", b"tampered", &signature).is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let signature = sign_webhook_body("secret", b"payload");
        assert!(verify_webhook_signature("other", b"payload", &signature).is_err());
    }

    #[test]
    fn malformed_hex_rejected() {
        assert!(verify_webhook_signature("secret", b"payload", "not-hex").is_err());
    }

    #[test]
    fn verification_status_deserializes_snake_case() {
        let parsed: VerificationStatus = serde_json::from_str("\"succeeded\"").unwrap();
        assert_eq!(parsed, VerificationStatus::Succeeded);
        let parsed: VerificationStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(parsed, VerificationStatus::Pending);
    }
}
