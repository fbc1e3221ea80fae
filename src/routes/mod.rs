use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod cart;
pub mod doc;
pub mod foods;
pub mod health;
pub mod orders;
pub mod params;
pub mod payment;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/foods", foods::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/payment", payment::router())
        .nest("/admin", admin::router())
}
