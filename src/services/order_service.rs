use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderList, OrderWithItems, PlaceOrderRequest, PlaceOrderResponse},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        foods::{Column as FoodCol, Entity as Foods},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus},
    payments::stripe::{LineItem, StripeClient},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders fetched",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Order fetched",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<PlaceOrderResponse>> {
    let method = match payload.payment_method.as_deref() {
        None | Some("") => PaymentMethod::Cod,
        Some(raw) => PaymentMethod::parse(raw)
            .ok_or_else(|| AppError::BadRequest(format!("invalid payment method: {raw}")))?,
    };

    let response = place_order_core(state, user, payload.address.unwrap_or_default(), method).await?;

    Ok(ApiResponse::success(
        "Order placed",
        response,
        Some(Meta::empty()),
    ))
}

/// Cart → Order transition. The order (with its deep-copied items) is
/// committed before the gateway is contacted and before the cart is
/// drained; a gateway failure leaves a pending/unpaid order behind for
/// retry or manual reconciliation, with the cart untouched.
pub(crate) async fn place_order_core(
    state: &AppState,
    user: &AuthUser,
    address: String,
    method: PaymentMethod,
) -> AppResult<PlaceOrderResponse> {
    let txn = state.orm.begin().await?;

    let lines = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .all(&txn)
        .await?;

    if lines.is_empty() {
        return Err(AppError::BadRequest("cart is empty".into()));
    }

    // Totals come from the snapshots taken at add-to-cart time; the catalog
    // is not consulted again.
    let total_amount: i64 = lines
        .iter()
        .map(|line| line.price_snapshot * line.quantity as i64)
        .sum();

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        total_amount: Set(total_amount),
        address: Set(address),
        payment_method: Set(method.as_str().into()),
        status: Set(OrderStatus::Pending.as_str().into()),
        payment_status: Set(PaymentStatus::Unpaid.as_str().into()),
        stripe_session_id: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            food_id: Set(line.food_id),
            quantity: Set(line.quantity),
            price: Set(line.price_snapshot),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    txn.commit().await?;

    let mut order = order_from_entity(order);

    if method == PaymentMethod::Card {
        let session = open_checkout_session(state, user, &order, &lines).await?;
        Orders::update_many()
            .col_expr(OrderCol::StripeSessionId, Expr::value(session.id.clone()))
            .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(OrderCol::Id.eq(order.id))
            .exec(&state.orm)
            .await?;

        order.stripe_session_id = Some(session.id.clone());

        drain_cart(state, user, order.id).await?;

        return Ok(PlaceOrderResponse {
            order,
            items,
            session_id: Some(session.id),
            checkout_url: session.url,
        });
    }

    drain_cart(state, user, order.id).await?;

    Ok(PlaceOrderResponse {
        order,
        items,
        session_id: None,
        checkout_url: None,
    })
}

async fn open_checkout_session(
    state: &AppState,
    user: &AuthUser,
    order: &Order,
    lines: &[crate::entity::cart_items::Model],
) -> AppResult<crate::payments::stripe::CheckoutSession> {
    let food_ids: Vec<Uuid> = lines.iter().map(|line| line.food_id).collect();
    let foods = Foods::find()
        .filter(FoodCol::Id.is_in(food_ids))
        .all(&state.orm)
        .await?;
    let names: HashMap<Uuid, String> = foods.into_iter().map(|f| (f.id, f.name)).collect();

    let line_items: Vec<LineItem> = lines
        .iter()
        .map(|line| LineItem {
            name: names
                .get(&line.food_id)
                .cloned()
                .unwrap_or_else(|| "Food Item".to_string()),
            unit_amount: line.price_snapshot,
            quantity: line.quantity as i64,
        })
        .collect();

    let success_url = format!(
        "{}/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
        state.config.client_url
    );
    let cancel_url = format!("{}/payment-cancel", state.config.client_url);

    let client = StripeClient::new(&state.config.stripe);
    client
        .create_checkout_session(&line_items, &success_url, &cancel_url, order.id, user.user_id)
        .await
        .map_err(|err| {
            tracing::error!(
                order_id = %order.id,
                error = %err,
                "checkout session creation failed; order kept pending/unpaid"
            );
            AppError::Gateway(format!(
                "checkout session creation failed for order {}",
                order.id
            ))
        })
}

async fn drain_cart(state: &AppState, user: &AuthUser, order_id: Uuid) -> AppResult<()> {
    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(())
}

/// Conditional cancel: a single update guarded on `status = 'pending'`, so a
/// concurrently applied webhook transition cannot be overwritten.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let existing = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let result = Orders::update_many()
        .col_expr(
            OrderCol::Status,
            Expr::value(OrderStatus::Cancelled.as_str()),
        )
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::Id.eq(id))
        .filter(OrderCol::Status.eq(OrderStatus::Pending.as_str()))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::InvalidTransition);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let mut order = order_from_entity(existing);
    order.status = OrderStatus::Cancelled.as_str().into();

    Ok(ApiResponse::success(
        "Order cancelled",
        order,
        Some(Meta::empty()),
    ))
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        total_amount: model.total_amount,
        address: model.address,
        payment_method: model.payment_method,
        status: model.status,
        payment_status: model.payment_status,
        stripe_session_id: model.stripe_session_id,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        food_id: model.food_id,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
