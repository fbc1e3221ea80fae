use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::foods::{CreateFoodRequest, FoodList, UpdateFoodRequest},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::FoodItem,
    response::{ApiResponse, Meta},
    routes::params::FoodQuery,
};

pub async fn list_foods(pool: &DbPool, query: FoodQuery) -> AppResult<ApiResponse<FoodList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut builder: sqlx::QueryBuilder<sqlx::Postgres> =
        sqlx::QueryBuilder::new("SELECT * FROM foods WHERE 1=1");
    if let Some(category) = query.category.as_ref().filter(|c| !c.is_empty()) {
        builder.push(" AND category = ").push_bind(category);
    }
    if let Some(available) = query.available {
        builder.push(" AND available = ").push_bind(available);
    }
    builder.push(" ORDER BY created_at DESC");
    builder.push(" LIMIT ").push_bind(limit);
    builder.push(" OFFSET ").push_bind(offset);

    let items = builder
        .build_query_as::<FoodItem>()
        .fetch_all(pool)
        .await?;

    let mut count_builder: sqlx::QueryBuilder<sqlx::Postgres> =
        sqlx::QueryBuilder::new("SELECT COUNT(*) FROM foods WHERE 1=1");
    if let Some(category) = query.category.as_ref().filter(|c| !c.is_empty()) {
        count_builder.push(" AND category = ").push_bind(category);
    }
    if let Some(available) = query.available {
        count_builder.push(" AND available = ").push_bind(available);
    }
    let total: (i64,) = count_builder.build_query_as().fetch_one(pool).await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Foods", FoodList { items }, Some(meta)))
}

pub async fn get_food(pool: &DbPool, id: Uuid) -> AppResult<ApiResponse<FoodItem>> {
    let food = sqlx::query_as::<_, FoodItem>("SELECT * FROM foods WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let food = match food {
        Some(f) => f,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("Food", food, None))
}

pub async fn create_food(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateFoodRequest,
) -> AppResult<ApiResponse<FoodItem>> {
    ensure_admin(user)?;
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    if payload.price < 0 {
        return Err(AppError::BadRequest("price must not be negative".to_string()));
    }

    let food = sqlx::query_as::<_, FoodItem>(
        r#"
        INSERT INTO foods (id, name, description, price, category, available, image_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.name)
    .bind(payload.description)
    .bind(payload.price)
    .bind(payload.category)
    .bind(payload.available.unwrap_or(true))
    .bind(payload.image_url)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "food_create",
        Some("foods"),
        Some(serde_json::json!({ "food_id": food.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Food created",
        food,
        Some(Meta::empty()),
    ))
}

pub async fn update_food(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateFoodRequest,
) -> AppResult<ApiResponse<FoodItem>> {
    ensure_admin(user)?;

    let existing = sqlx::query_as::<_, FoodItem>("SELECT * FROM foods WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let existing = match existing {
        Some(f) => f,
        None => return Err(AppError::NotFound),
    };

    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.or(existing.description);
    let price = payload.price.unwrap_or(existing.price);
    if price < 0 {
        return Err(AppError::BadRequest("price must not be negative".to_string()));
    }
    let category = payload.category.or(existing.category);
    let available = payload.available.unwrap_or(existing.available);
    let image_url = payload.image_url.or(existing.image_url);

    let food = sqlx::query_as::<_, FoodItem>(
        r#"
        UPDATE foods
        SET name = $2, description = $3, price = $4, category = $5, available = $6, image_url = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(price)
    .bind(category)
    .bind(available)
    .bind(image_url)
    .fetch_one(pool)
    .await?;

    Ok(ApiResponse::success(
        "Food updated",
        food,
        Some(Meta::empty()),
    ))
}

pub async fn delete_food(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let result = sqlx::query("DELETE FROM foods WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Food deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
