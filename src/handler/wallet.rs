use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Extension, Json, Router};

use crate::{dtos::taskdtos::ApiResponse, error::HttpError, middleware::JWTAuthMiddeware, AppState};

pub fn wallet_handler() -> Router {
    Router::new()
        .route("/", get(get_wallet))
        .route("/transactions", get(get_transactions))
}

pub async fn get_wallet(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let wallet = app_state.wallet_service.get_wallet(auth.user_id).await?;

    Ok(Json(ApiResponse::success("Wallet retrieved successfully", wallet)))
}

pub async fn get_transactions(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let transactions = app_state.wallet_service.list_transactions(auth.user_id).await?;

    Ok(Json(ApiResponse::success("Transactions retrieved successfully", transactions)))
}
