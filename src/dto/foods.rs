use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::FoodItem;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFoodRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub category: Option<String>,
    pub available: Option<bool>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateFoodRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub category: Option<String>,
    pub available: Option<bool>,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FoodList {
    pub items: Vec<FoodItem>,
}
