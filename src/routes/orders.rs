use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::orders::{CancelOrderRequest, CreateOrderRequest, OrderList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", post(cancel_order))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<Order>),
        (status = 400, description = "Invalid items"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Insufficient stock"),
        (status = 503, description = "Inventory unavailable"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Order>>)> {
    let order = state
        .orders
        .create_order(user.user_id, payload.items)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Order created",
            order,
            Some(Meta::empty()),
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(Pagination),
    responses(
        (
            status = 200,
            description = "Orders of the caller, newest first",
            body = ApiResponse<OrderList>
        ),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let page = state
        .orders
        .get_user_orders(user.user_id, &pagination)
        .await?;
    let meta = Meta::new(page.page, page.limit, page.total);
    Ok(Json(ApiResponse::success(
        "Ok",
        OrderList { items: page.orders },
        Some(meta),
    )))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = i64, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with its lines", body = ApiResponse<Order>),
        (status = 403, description = "Order belongs to another user"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state.orders.get_order(id, user.user_id).await?;
    Ok(Json(ApiResponse::success("OK", order, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    params(("id" = i64, Path, description = "Order ID")),
    request_body(content = CancelOrderRequest, description = "Optional cancellation reason"),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<Order>),
        (status = 403, description = "Order belongs to another user"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Order is no longer pending"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    payload: Option<Json<CancelOrderRequest>>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let order = state.orders.cancel_order(id, user.user_id, reason).await?;
    Ok(Json(ApiResponse::success(
        "Order cancelled",
        order,
        Some(Meta::empty()),
    )))
}
