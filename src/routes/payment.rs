use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
};

use crate::{
    dto::payment::{
        CheckoutSessionResponse, CreateCheckoutSessionRequest, VerifyPaymentResponse, WebhookAck,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    payments::stripe::{StripeClient, WebhookEvent},
    response::{ApiResponse, Meta},
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/webhook", post(stripe_webhook))
        .route("/verify/{session_id}", get(verify_payment))
}

#[utoipa::path(
    post,
    path = "/api/payment/create-checkout-session",
    request_body = CreateCheckoutSessionRequest,
    responses(
        (status = 200, description = "Checkout session opened for the current cart", body = ApiResponse<CheckoutSessionResponse>),
        (status = 400, description = "Cart is empty"),
        (status = 502, description = "Gateway failure; order kept pending/unpaid"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCheckoutSessionRequest>,
) -> AppResult<Json<ApiResponse<CheckoutSessionResponse>>> {
    let resp = payment_service::create_checkout_session(&state, &user, payload).await?;
    Ok(Json(resp))
}

// Signature verification is byte-exact over the original payload, so this
// handler consumes the raw body and must never sit behind a JSON extractor.
#[utoipa::path(
    post,
    path = "/api/payment/webhook",
    request_body(content = String, description = "Raw Stripe webhook payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Signature verification failed"),
    ),
    tag = "Payment"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::SignatureInvalid)?;

    let client = StripeClient::new(&state.config.stripe);
    match client.verify_webhook_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) | Err(_) => return Err(AppError::SignatureInvalid),
    }

    // A verified but unparseable payload is acknowledged; the gateway will
    // not retry an accepted event and there is nothing to apply from it.
    match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) => payment_service::handle_webhook_event(&state, &event).await?,
        Err(err) => tracing::warn!(error = %err, "undecodable webhook payload, acknowledging"),
    }

    Ok(Json(ApiResponse::success(
        "Webhook processed",
        WebhookAck { received: true },
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    get,
    path = "/api/payment/verify/{session_id}",
    params(
        ("session_id" = String, Path, description = "Checkout session ID")
    ),
    responses(
        (status = 200, description = "Session payment status with the matching order", body = ApiResponse<VerifyPaymentResponse>),
        (status = 404, description = "No order for this session"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payment"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> AppResult<Json<ApiResponse<VerifyPaymentResponse>>> {
    let resp = payment_service::verify_payment(&state, &user, &session_id).await?;
    Ok(Json(resp))
}
