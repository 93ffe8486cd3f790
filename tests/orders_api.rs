use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use order_service_api::{
    clients::{InMemoryInventory, JwtIdentityClient, identity::Claims},
    events::{EventEmitter, EventTopics, InMemoryPublisher},
    routes::create_app,
    services::order_service::OrderService,
    state::AppState,
    store::InMemoryOrderStore,
};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "test-secret";

fn app(inventory: InMemoryInventory) -> Router {
    let service = OrderService::new(
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(inventory),
        EventEmitter::new(Arc::new(InMemoryPublisher::new()), EventTopics::default()),
    );
    create_app(AppState::new(
        service,
        Arc::new(JwtIdentityClient::new(SECRET)),
    ))
}

fn token(user_id: i64, role: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: None,
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn request(method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn inventory() -> InMemoryInventory {
    InMemoryInventory::new()
        .with_product(1, "Keyboard", dec!(500), 10)
        .with_product(2, "Mouse", dec!(500), 3)
}

#[tokio::test]
async fn create_then_fetch_order() {
    let app = app(inventory());
    let buyer = token(7, "user");

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/orders",
            Some(&buyer),
            Some(json!({
                "items": [
                    { "product_id": 1, "quantity": 2 },
                    { "product_id": 2, "quantity": 1 }
                ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["total_amount"].as_f64(), Some(1500.0));
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        request("GET", &format!("/api/orders/{id}"), Some(&buyer), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let (status, _) = send(
        &app,
        request("GET", &format!("/api/orders/{id}"), Some(&token(8, "user")), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let app = app(inventory());

    let (status, body) = send(&app, request("GET", "/api/orders", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"]["kind"], "unauthorized");

    let (status, _) = send(&app, request("GET", "/api/orders", Some("garbage"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn insufficient_stock_is_a_conflict() {
    let app = app(inventory());

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/orders",
            Some(&token(7, "user")),
            Some(json!({ "items": [{ "product_id": 2, "quantity": 10 }] })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"]["kind"], "insufficient_stock");
    assert_eq!(
        body["message"],
        "product 2 has insufficient stock (available: 3, requested: 10)"
    );
}

#[tokio::test]
async fn empty_order_is_a_bad_request() {
    let app = app(inventory());

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/orders",
            Some(&token(7, "user")),
            Some(json!({ "items": [] })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["kind"], "validation");
}

#[tokio::test]
async fn list_carries_pagination_meta() {
    let app = app(inventory());
    let buyer = token(7, "user");
    for _ in 0..3 {
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/orders",
                Some(&buyer),
                Some(json!({ "items": [{ "product_id": 1, "quantity": 1 }] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &app,
        request("GET", "/api/orders?page=1&limit=2", Some(&buyer), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["meta"]["total_pages"], 2);

    let (_, body) = send(
        &app,
        request("GET", "/api/orders?page=0&limit=500", Some(&buyer), None),
    )
    .await;
    assert_eq!(body["meta"]["page"], 1);
    assert_eq!(body["meta"]["per_page"], 10);

    let (status, body) = send(
        &app,
        request(
            "GET",
            "/api/orders?page=9223372036854775807",
            Some(&buyer),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["page"], 1);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn owner_cancels_with_reason() {
    let app = app(inventory());
    let buyer = token(7, "user");
    let (_, body) = send(
        &app,
        request(
            "POST",
            "/api/orders",
            Some(&buyer),
            Some(json!({ "items": [{ "product_id": 1, "quantity": 1 }] })),
        ),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/api/orders/{id}/cancel"),
            Some(&buyer),
            Some(json!({ "reason": "ordered twice" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, body) = send(
        &app,
        request("POST", &format!("/api/orders/{id}/cancel"), Some(&buyer), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"]["kind"], "invalid_state");
}

#[tokio::test]
async fn status_updates_require_admin() {
    let app = app(inventory());
    let (_, body) = send(
        &app,
        request(
            "POST",
            "/api/orders",
            Some(&token(7, "user")),
            Some(json!({ "items": [{ "product_id": 1, "quantity": 1 }] })),
        ),
    )
    .await;
    let id = body["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/admin/orders/{id}/status");

    let (status, _) = send(
        &app,
        request(
            "PUT",
            &uri,
            Some(&token(7, "user")),
            Some(json!({ "status": "processing" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token(1, "admin");
    let (status, body) = send(
        &app,
        request("PUT", &uri, Some(&admin), Some(json!({ "status": "processing" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "processing");

    let (status, body) = send(
        &app,
        request("PUT", &uri, Some(&admin), Some(json!({ "status": "pending" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"]["kind"], "illegal_transition");

    let (status, body) = send(
        &app,
        request("PUT", &uri, Some(&admin), Some(json!({ "status": "lost" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "invalid order status: lost");

    let (status, body) = send(
        &app,
        request("GET", &format!("/api/admin/orders/{id}"), Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user_id"], 7);
}

#[tokio::test]
async fn unreachable_inventory_is_service_unavailable() {
    let inventory = inventory();
    inventory.set_unreachable(1, true);
    let app = app(inventory);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/orders",
            Some(&token(7, "user")),
            Some(json!({ "items": [{ "product_id": 1, "quantity": 1 }] })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["data"]["kind"], "unavailable");
    assert_eq!(body["message"], "Service Unavailable");
}

#[tokio::test]
async fn unknown_route_and_readiness() {
    let app = app(inventory());

    let (status, body) = send(&app, request("GET", "/nope", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["path"], "/nope");

    let (status, body) = send(&app, request("GET", "/health/ready", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ready");
}
