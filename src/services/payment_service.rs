use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    dto::payment::{CheckoutSessionResponse, CreateCheckoutSessionRequest, VerifyPaymentResponse},
    entity::orders::{Column as OrderCol, Entity as Orders},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{OrderStatus, PaymentMethod, PaymentStatus},
    payments::stripe::{StripeClient, WebhookEvent},
    response::{ApiResponse, Meta},
    services::order_service::{order_from_entity, place_order_core},
    state::AppState,
};

/// Card-flavored checkout: snapshots the cart into an order and opens a
/// Checkout session for it.
pub async fn create_checkout_session(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCheckoutSessionRequest,
) -> AppResult<ApiResponse<CheckoutSessionResponse>> {
    let placed = place_order_core(
        state,
        user,
        payload.address.unwrap_or_default(),
        PaymentMethod::Card,
    )
    .await?;

    let session_id = placed
        .session_id
        .ok_or_else(|| AppError::Gateway("gateway returned no session id".into()))?;

    Ok(ApiResponse::success(
        "Checkout session created. Redirect user to checkout_url.",
        CheckoutSessionResponse {
            session_id,
            checkout_url: placed.checkout_url,
            order_id: placed.order.id,
        },
        Some(Meta::empty()),
    ))
}

/// Apply a verified gateway event to order state. Events the system cannot
/// use (unknown type, missing or unparseable correlation token) are logged
/// and dropped; the webhook endpoint still acknowledges them so the gateway
/// does not retry forever.
pub async fn handle_webhook_event(state: &AppState, event: &WebhookEvent) -> AppResult<()> {
    match event.event_type.as_str() {
        "checkout.session.completed" | "session.completed" => {
            let Some(order_id) = event.order_id() else {
                tracing::warn!(
                    event_type = %event.event_type,
                    "gateway event without usable order metadata, ignoring"
                );
                return Ok(());
            };
            let updated = mark_session_completed(state, order_id).await?;
            if updated == 0 {
                tracing::info!(%order_id, "completed event had no effect (already reconciled or not pending)");
            } else {
                tracing::info!(%order_id, "order marked paid and confirmed");
            }
        }
        "checkout.session.expired" | "session.expired" => {
            let Some(order_id) = event.order_id() else {
                tracing::warn!(
                    event_type = %event.event_type,
                    "gateway event without usable order metadata, ignoring"
                );
                return Ok(());
            };
            let updated = mark_session_expired(state, order_id).await?;
            if updated == 0 {
                tracing::info!(%order_id, "expired event had no effect (already reconciled or not pending)");
            } else {
                tracing::info!(%order_id, "order cancelled after session expiry");
            }
        }
        other => {
            tracing::debug!(event_type = other, "ignoring unhandled gateway event");
        }
    }
    Ok(())
}

/// `pending/unpaid → confirmed/paid`, guarded on the current status so a
/// duplicate delivery or a late event against a cancelled order is a no-op.
pub async fn mark_session_completed(state: &AppState, order_id: Uuid) -> AppResult<u64> {
    let result = Orders::update_many()
        .col_expr(
            OrderCol::PaymentStatus,
            Expr::value(PaymentStatus::Paid.as_str()),
        )
        .col_expr(
            OrderCol::Status,
            Expr::value(OrderStatus::Confirmed.as_str()),
        )
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
        .exec(&state.orm)
        .await?;

    Ok(result.rows_affected)
}

/// `pending → cancelled`, payment stays unpaid. Same guard as above: an
/// expiry arriving after completion cannot undo a paid order.
pub async fn mark_session_expired(state: &AppState, order_id: Uuid) -> AppResult<u64> {
    let result = Orders::update_many()
        .col_expr(
            OrderCol::PaymentStatus,
            Expr::value(PaymentStatus::Unpaid.as_str()),
        )
        .col_expr(
            OrderCol::Status,
            Expr::value(OrderStatus::Cancelled.as_str()),
        )
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
        .exec(&state.orm)
        .await?;

    Ok(result.rows_affected)
}

pub async fn verify_payment(
    state: &AppState,
    user: &AuthUser,
    session_id: &str,
) -> AppResult<ApiResponse<VerifyPaymentResponse>> {
    let client = StripeClient::new(&state.config.stripe);
    let session = client
        .retrieve_session(session_id)
        .await
        .map_err(|err| AppError::Gateway(err.to_string()))?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::StripeSessionId.eq(session_id))
                .add(OrderCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    Ok(ApiResponse::success(
        "Payment status retrieved",
        VerifyPaymentResponse {
            payment_status: session.payment_status,
            order: order_from_entity(order),
        },
        Some(Meta::empty()),
    ))
}
