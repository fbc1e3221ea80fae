use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::AuthResponse,
        cart::{CartLineDto, CartList},
        foods::FoodList,
        orders::{OrderList, OrderWithItems, PlaceOrderResponse},
        payment::{CheckoutSessionResponse, VerifyPaymentResponse, WebhookAck},
    },
    models::{CartItem, FoodItem, Order, OrderItem, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, foods, health, orders, params, payment},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        foods::list_foods,
        foods::get_food,
        foods::create_food,
        foods::update_food,
        foods::delete_food,
        cart::get_cart,
        cart::add_to_cart,
        cart::clear_cart,
        cart::remove_item,
        orders::list_orders,
        orders::place_order,
        orders::get_order,
        orders::cancel_order,
        payment::create_checkout_session,
        payment::stripe_webhook,
        payment::verify_payment,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_users,
        admin::delete_user,
        admin::dashboard_stats
    ),
    components(
        schemas(
            User,
            FoodItem,
            CartItem,
            Order,
            OrderItem,
            AuthResponse,
            CartList,
            CartLineDto,
            FoodList,
            OrderList,
            OrderWithItems,
            PlaceOrderResponse,
            CheckoutSessionResponse,
            VerifyPaymentResponse,
            WebhookAck,
            admin::UpdateOrderStatusRequest,
            admin::UserList,
            admin::StatusCount,
            admin::DashboardStats,
            params::Pagination,
            params::FoodQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<FoodItem>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<PlaceOrderResponse>,
            ApiResponse<CheckoutSessionResponse>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Foods", description = "Food catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Payment", description = "Checkout session and webhook endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
