use chrono::DateTime;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::cart::{AddToCartRequest, CartLineDto, CartList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, FoodItem},
    response::{ApiResponse, Meta},
};

#[derive(FromRow)]
struct CartWithFoodRow {
    cart_id: Uuid,
    quantity: i32,
    price_snapshot: i64,
    food_id: Uuid,
    name: String,
    description: Option<String>,
    price: i64,
    category: Option<String>,
    available: bool,
    image_url: Option<String>,
    created_at: DateTime<chrono::Utc>,
}

pub async fn get_cart(pool: &DbPool, user: &AuthUser) -> AppResult<ApiResponse<CartList>> {
    let rows = sqlx::query_as::<_, CartWithFoodRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity, ci.price_snapshot,
               f.id AS food_id, f.name, f.description, f.price, f.category,
               f.available, f.image_url, f.created_at
        FROM cart_items ci
        JOIN foods f ON f.id = ci.food_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at ASC
        "#,
    )
    .bind(user.user_id)
    .fetch_all(pool)
    .await?;

    let items = rows
        .into_iter()
        .map(|row| CartLineDto {
            id: row.cart_id,
            food: FoodItem {
                id: row.food_id,
                name: row.name,
                description: row.description,
                price: row.price,
                category: row.category,
                available: row.available,
                image_url: row.image_url,
                created_at: row.created_at,
            },
            quantity: row.quantity,
            price_snapshot: row.price_snapshot,
        })
        .collect();

    // An absent cart reads as an empty one.
    Ok(ApiResponse::success("OK", CartList { items }, None))
}

pub async fn add_to_cart(
    pool: &DbPool,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity < 1 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let food: Option<(i64, bool)> = sqlx::query_as("SELECT price, available FROM foods WHERE id = $1")
        .bind(payload.food_id)
        .fetch_optional(pool)
        .await?;
    let (price, available) = match food {
        Some(f) => f,
        None => return Err(AppError::NotFound),
    };
    if !available {
        return Err(AppError::BadRequest(
            "food item is currently unavailable".to_string(),
        ));
    }

    // Single upsert: a repeated add increments the quantity while the
    // price snapshot of the first add is kept.
    let cart_item = sqlx::query_as::<_, CartItem>(
        r#"
        INSERT INTO cart_items (id, user_id, food_id, quantity, price_snapshot)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, food_id)
        DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.food_id)
    .bind(payload.quantity)
    .bind(price)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "food_id": payload.food_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Cart updated", cart_item, None))
}

pub async fn remove_item(
    pool: &DbPool,
    user: &AuthUser,
    food_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM cart_items WHERE food_id = $1 AND user_id = $2")
        .bind(food_id)
        .bind(user.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "food_id": food_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Item removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Idempotent: clearing an empty or absent cart succeeds.
pub async fn clear_cart(
    pool: &DbPool,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .execute(pool)
        .await?;

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
