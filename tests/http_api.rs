use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use taskhub::{
    config::Config, db::memory::MemoryStore, models::usermodel::UserRole, routes::create_router,
    utils::token::create_token, AppState,
};

const SECRET: &str = "http-test-secret";

fn app() -> Router {
    let config = Config::from_lookup(|key| (key == "JWT_SECRET_KEY").then(|| SECRET.to_string())).unwrap();
    create_router(Arc::new(AppState::new(Arc::new(MemoryStore::new()), config)))
}

fn bearer(user_id: Uuid, role: UserRole) -> String {
    format!("Bearer {}", create_token(user_id, role, SECRET.as_bytes(), 60).unwrap())
}

async fn call(app: &Router, method: Method, uri: &str, auth: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        request = request.header(header::AUTHORIZATION, auth);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_public_and_api_requires_a_token() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = call(&app, Method::GET, "/api/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "fail");

    let (status, _) = call(&app, Method::GET, "/api/tasks", Some("Bearer not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bid_and_accept_over_http() {
    let app = app();
    let poster = bearer(Uuid::new_v4(), UserRole::User);
    let worker = bearer(Uuid::new_v4(), UserRole::Worker);
    let stranger = bearer(Uuid::new_v4(), UserRole::User);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/users/register",
        Some(&poster),
        Some(json!({ "name": "Pat", "email": "pat@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/users/register",
        Some(&worker),
        Some(json!({ "name": "Wren", "email": "wren@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let task_body = json!({
        "category": "plumbing",
        "title": "Fix the sink",
        "description": "Kitchen sink leaks under the basin",
        "budget": 500
    });
    let (status, _) = call(&app, Method::POST, "/api/tasks", Some(&worker), Some(task_body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::POST, "/api/tasks", Some(&poster), Some(task_body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["state"], "open");
    let task_id = body["data"]["id"].as_str().unwrap().to_string();

    let bids_uri = format!("/api/tasks/{task_id}/bids");
    let (status, body) = call(
        &app,
        Method::POST,
        &bids_uri,
        Some(&worker),
        Some(json!({ "amount": 450, "message": "Today" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let bid_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, Method::POST, &bids_uri, Some(&worker), Some(json!({ "amount": 400 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let accept_uri = format!("/api/tasks/{task_id}/bids/{bid_id}/accept");
    let (status, _) = call(&app, Method::PUT, &accept_uri, Some(&worker), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::PUT, &accept_uri, Some(&poster), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["task"]["state"], "in_progress");
    assert_eq!(body["data"]["escrow"]["total"], 463);

    let (status, _) = call(&app, Method::PUT, &accept_uri, Some(&poster), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let escrow_uri = format!("/api/tasks/{task_id}/escrow");
    let (status, _) = call(&app, Method::GET, &escrow_uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = call(&app, Method::GET, &escrow_uri, Some(&worker), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "locked");

    let completion_uri = format!("/api/tasks/{task_id}/completion-request");
    let (status, _) = call(
        &app,
        Method::PUT,
        &completion_uri,
        Some(&worker),
        Some(json!({ "photo_url": "https://photos.example/p.jpg" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, Method::GET, "/api/notifications?unread_only=true", Some(&poster), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["notification_type"], "new_bid");

    let (status, body) = call(&app, Method::PUT, "/api/notifications/read-all", Some(&poster), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"], 1);
}

#[tokio::test]
async fn missing_entities_and_bad_amounts_map_to_client_errors() {
    let app = app();
    let poster_id = Uuid::new_v4();
    let poster = bearer(poster_id, UserRole::User);

    let (status, _) = call(&app, Method::GET, "/api/users/me", Some(&poster), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::GET, &format!("/api/tasks/{}", Uuid::new_v4()), Some(&poster), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    call(
        &app,
        Method::POST,
        "/api/users/register",
        Some(&poster),
        Some(json!({ "name": "Pat", "email": "pat@example.com" })),
    )
    .await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/tasks",
        Some(&poster),
        Some(json!({
            "category": "moving",
            "title": "Move a sofa",
            "description": "Third floor, no lift",
            "budget": 0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "fail");

    let (status, body) = call(&app, Method::GET, "/api/wallet", Some(&poster), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], 0);
}
