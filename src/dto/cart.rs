use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::FoodItem;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub food_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartList {
    pub items: Vec<CartLineDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineDto {
    pub id: Uuid,
    pub food: FoodItem,
    pub quantity: i32,
    pub price_snapshot: i64,
}
