// routes.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        notification::notification_handler,
        task::task_handler,
        users::{users_handler, workers_handler},
        wallet::wallet_handler,
    },
    middleware::auth,
    AppState,
};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_route = Router::new()
        .nest("/users", users_handler())
        .nest("/workers", workers_handler())
        .nest("/tasks", task_handler())
        .nest("/wallet", wallet_handler())
        .nest("/notifications", notification_handler())
        .layer(middleware::from_fn(auth))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}
