use utoipa::{
    Modify, OpenApi,
    openapi::{
        self, OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::orders::{
        CancelOrderRequest, CreateOrderRequest, OrderItemRequest, OrderList,
        UpdateOrderStatusRequest,
    },
    error::{ErrorData, ErrorKind},
    models::{Order, OrderLine},
    response::{ApiResponse, Meta},
    routes::{admin, health, orders, params},
    status::OrderStatus,
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
        health::readiness,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        admin::get_order_admin,
        admin::update_order_status
    ),
    components(
        schemas(
            Order,
            OrderLine,
            OrderStatus,
            OrderList,
            OrderItemRequest,
            CreateOrderRequest,
            CancelOrderRequest,
            UpdateOrderStatusRequest,
            ErrorKind,
            ErrorData,
            params::Pagination,
            health::HealthData,
            Meta,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<ErrorData>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
