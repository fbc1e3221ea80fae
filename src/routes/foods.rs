use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::foods::{CreateFoodRequest, FoodList, UpdateFoodRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::FoodItem,
    response::ApiResponse,
    routes::params::FoodQuery,
    services::food_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_foods))
        .route("/", post(create_food))
        .route("/{id}", get(get_food))
        .route("/{id}", put(update_food))
        .route("/{id}", delete(delete_food))
}

#[utoipa::path(
    get,
    path = "/api/foods",
    params(
        ("category" = Option<String>, Query, description = "Filter by category"),
        ("available" = Option<bool>, Query, description = "Filter by availability"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List foods", body = ApiResponse<FoodList>)
    ),
    tag = "Foods"
)]
pub async fn list_foods(
    State(state): State<AppState>,
    Query(query): Query<FoodQuery>,
) -> AppResult<Json<ApiResponse<FoodList>>> {
    let resp = food_service::list_foods(&state.pool, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/foods/{id}",
    params(
        ("id" = Uuid, Path, description = "Food ID")
    ),
    responses(
        (status = 200, description = "Get food", body = ApiResponse<FoodItem>),
        (status = 404, description = "Food not found"),
    ),
    tag = "Foods"
)]
pub async fn get_food(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<FoodItem>>> {
    let resp = food_service::get_food(&state.pool, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/foods",
    request_body = CreateFoodRequest,
    responses(
        (status = 200, description = "Create food (admin only)", body = ApiResponse<FoodItem>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Foods"
)]
pub async fn create_food(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateFoodRequest>,
) -> AppResult<Json<ApiResponse<FoodItem>>> {
    let resp = food_service::create_food(&state.pool, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/foods/{id}",
    params(
        ("id" = Uuid, Path, description = "Food ID")
    ),
    request_body = UpdateFoodRequest,
    responses(
        (status = 200, description = "Update food (admin only)", body = ApiResponse<FoodItem>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Foods"
)]
pub async fn update_food(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateFoodRequest>,
) -> AppResult<Json<ApiResponse<FoodItem>>> {
    let resp = food_service::update_food(&state.pool, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/foods/{id}",
    params(
        ("id" = Uuid, Path, description = "Food ID")
    ),
    responses(
        (status = 200, description = "Delete food (admin only)"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Foods"
)]
pub async fn delete_food(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = food_service::delete_food(&state.pool, &user, id).await?;
    Ok(Json(resp))
}
