//! Alert emitter client
//!
//! POSTs outbox events as JSON to the configured endpoint. Each body is
//! signed with HMAC-SHA256 over the exact bytes sent, base64-encoded in the
//! `X-Signature` header.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::models::AlertEvent;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Webhook client for the external alert emitter
#[derive(Clone)]
pub struct AlertWebhookClient {
    client: Client,
    url: String,
    signing_secret: String,
}

impl AlertWebhookClient {
    pub fn new(url: String, signing_secret: String) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url,
            signing_secret,
        })
    }

    /// Base64 HMAC-SHA256 of `body`
    pub fn sign(&self, body: &[u8]) -> AppResult<String> {
        sign_payload(&self.signing_secret, body)
    }

    /// Deliver one event; any non-2xx answer counts as a failure
    pub async fn deliver(&self, event: &AlertEvent) -> AppResult<()> {
        let body = serde_json::to_vec(event)
            .map_err(|e| AppError::Internal(format!("Failed to encode alert: {}", e)))?;
        let signature = self.sign(&body)?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::AlertDelivery(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AlertDelivery(format!("{} - {}", status, body)));
        }

        Ok(())
    }
}

pub fn sign_payload(secret: &str, body: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Failed to create HMAC".to_string()))?;
    mac.update(body);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
