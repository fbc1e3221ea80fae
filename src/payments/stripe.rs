use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Maximum accepted age of a webhook signature timestamp.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("malformed Stripe-Signature header")]
    MalformedSignatureHeader,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stripe api error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// One Checkout line item, amounts in minor currency units.
#[derive(Debug)]
pub struct LineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionStatus {
    pub id: String,
    pub payment_status: String,
}

/// Signed event delivered to the webhook endpoint. Unknown fields are
/// ignored so new event shapes do not break deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub object: WebhookObject,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl WebhookEvent {
    /// Correlation token linking the session back to the originating order.
    pub fn order_id(&self) -> Option<Uuid> {
        let metadata = self.data.object.metadata.as_ref()?;
        let raw = metadata.get("order_id").or_else(|| metadata.get("orderId"))?;
        Uuid::parse_str(raw).ok()
    }
}

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Open a Checkout session. `metadata[order_id]` carries the correlation
    /// token the webhook reconciler resolves the order by.
    pub async fn create_checkout_session(
        &self,
        line_items: &[LineItem],
        success_url: &str,
        cancel_url: &str,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<CheckoutSession, StripeError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("success_url".into(), success_url.into()),
            ("cancel_url".into(), cancel_url.into()),
            ("metadata[order_id]".into(), order_id.to_string()),
            ("metadata[user_id]".into(), user_id.to_string()),
        ];
        for (i, item) in line_items.iter().enumerate() {
            params.push((
                format!("line_items[{i}][price_data][currency]"),
                "inr".into(),
            ));
            params.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.name.clone(),
            ));
            params.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            params.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }

        let resp = self
            .http
            .post(format!("{STRIPE_API_BASE}/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(StripeError::Api { status, message });
        }

        Ok(resp.json::<CheckoutSession>().await?)
    }

    pub async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, StripeError> {
        let resp = self
            .http
            .get(format!("{STRIPE_API_BASE}/checkout/sessions/{session_id}"))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(StripeError::Api { status, message });
        }

        Ok(resp.json::<SessionStatus>().await?)
    }

    /// Verify a `Stripe-Signature` header (`t=<ts>,v1=<hex>`) against the raw
    /// request body. Returns `Ok(false)` for a well-formed but wrong or stale
    /// signature; errors only when the header cannot be parsed at all.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<bool, StripeError> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(StripeError::MalformedSignatureHeader)?;
        if signatures.is_empty() {
            return Err(StripeError::MalformedSignatureHeader);
        }

        let age = chrono::Utc::now().timestamp() - timestamp;
        if age.abs() > SIGNATURE_TOLERANCE_SECS {
            return Ok(false);
        }

        let mut signed_payload = timestamp.to_string().into_bytes();
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);

        let verified = signatures.iter().any(|sig| match hex::decode(sig) {
            Ok(bytes) => {
                let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
                    .expect("HMAC can take key of any size");
                mac.update(&signed_payload);
                mac.verify_slice(&bytes).is_ok()
            }
            Err(_) => false,
        });

        Ok(verified)
    }
}
