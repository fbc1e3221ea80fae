//! Webhook signature verification and event decoding tests

use axum_food_ordering_api::payments::stripe::{StripeClient, StripeConfig, WebhookEvent};

const WEBHOOK_SECRET: &str = "whsec_test123secret456";

fn test_client() -> StripeClient {
    let config = StripeConfig {
        secret_key: "sk_test_xxx".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
    };
    StripeClient::new(&config)
}

fn current_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Beyond the 5-minute tolerance.
fn old_timestamp() -> String {
    (chrono::Utc::now().timestamp() - 600).to_string()
}

fn compute_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[test]
fn valid_signature_is_accepted() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = current_timestamp();
    let signature = compute_signature(payload, WEBHOOK_SECRET, &timestamp);
    let header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &header)
        .expect("verification should not error");

    assert!(result, "valid signature should be accepted");
}

#[test]
fn wrong_secret_is_rejected() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = current_timestamp();
    let signature = compute_signature(payload, "wrong_secret", &timestamp);
    let header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &header)
        .expect("verification should not error");

    assert!(!result, "invalid signature should be rejected");
}

#[test]
fn modified_payload_is_rejected() {
    let client = test_client();
    let original = b"{\"type\":\"checkout.session.completed\"}";
    let modified = b"{\"type\":\"checkout.session.completed\",\"tampered\":true}";
    let timestamp = current_timestamp();
    let signature = compute_signature(original, WEBHOOK_SECRET, &timestamp);
    let header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(modified, &header)
        .expect("verification should not error");

    assert!(!result, "modified payload should be rejected");
}

#[test]
fn stale_timestamp_is_rejected() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = old_timestamp();
    let signature = compute_signature(payload, WEBHOOK_SECRET, &timestamp);
    let header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &header)
        .expect("verification should not error");

    assert!(!result, "old timestamp should be rejected");
}

#[test]
fn missing_timestamp_errors() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";

    let result = client.verify_webhook_signature(payload, "v1=somesignature");

    assert!(result.is_err(), "missing timestamp should error");
}

#[test]
fn missing_signature_errors() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";

    let result = client.verify_webhook_signature(payload, "t=1234567890");

    assert!(result.is_err(), "missing v1 signature should error");
}

#[test]
fn malformed_header_errors() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";

    assert!(client.verify_webhook_signature(payload, "garbage").is_err());
    assert!(client.verify_webhook_signature(payload, "").is_err());
}

#[test]
fn non_hex_signature_is_rejected_not_error() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = current_timestamp();
    let header = format!("t={},v1=not-hex-at-all", timestamp);

    let result = client
        .verify_webhook_signature(payload, &header)
        .expect("verification should not error");

    assert!(!result);
}

#[test]
fn event_with_order_metadata_decodes() {
    let body = serde_json::json!({
        "id": "evt_123",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_123",
                "payment_status": "paid",
                "metadata": {
                    "order_id": "7f2c1b54-58be-4f4c-9ce7-3f2a9c1d2e3f",
                    "user_id": "c0ffee00-0000-4000-8000-000000000000"
                }
            }
        }
    });
    let event: WebhookEvent = serde_json::from_value(body).expect("event should decode");

    assert_eq!(event.event_type, "checkout.session.completed");
    let order_id = event.order_id().expect("order id should be present");
    assert_eq!(
        order_id.to_string(),
        "7f2c1b54-58be-4f4c-9ce7-3f2a9c1d2e3f"
    );
}

#[test]
fn event_accepts_camel_case_metadata_key() {
    let body = serde_json::json!({
        "type": "checkout.session.expired",
        "data": {
            "object": {
                "metadata": { "orderId": "7f2c1b54-58be-4f4c-9ce7-3f2a9c1d2e3f" }
            }
        }
    });
    let event: WebhookEvent = serde_json::from_value(body).expect("event should decode");

    assert!(event.order_id().is_some());
}

#[test]
fn event_without_metadata_yields_no_order_id() {
    let body = serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_test_123" } }
    });
    let event: WebhookEvent = serde_json::from_value(body).expect("event should decode");

    assert!(event.order_id().is_none());
}

#[test]
fn event_with_unparseable_order_id_yields_none() {
    let body = serde_json::json!({
        "type": "checkout.session.completed",
        "data": {
            "object": { "metadata": { "order_id": "not-a-uuid" } }
        }
    });
    let event: WebhookEvent = serde_json::from_value(body).expect("event should decode");

    assert!(event.order_id().is_none());
}

#[test]
fn unknown_event_type_still_decodes() {
    let body = serde_json::json!({
        "type": "payment_intent.succeeded",
        "data": { "object": {} }
    });
    let event: WebhookEvent = serde_json::from_value(body).expect("event should decode");

    assert_eq!(event.event_type, "payment_intent.succeeded");
    assert!(event.order_id().is_none());
}
