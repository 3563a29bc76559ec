use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::taskdtos::{ApiResponse, RegisterUserDto},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn users_handler() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/me", get(get_me))
}

pub fn workers_handler() -> Router {
    Router::new()
        .route("/:worker_id/profile", get(get_worker_profile))
        .route("/:worker_id/reviews", get(get_worker_reviews))
}

/// Registers the token's identity with the role it carries.
pub async fn register(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let user = app_state
        .user_service
        .register(auth.user_id, auth.role, body.name, body.email)
        .await?;

    Ok(Json(ApiResponse::success("User registered successfully", user)))
}

pub async fn get_me(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state.user_service.get_user(auth.user_id).await?;

    Ok(Json(ApiResponse::success("User retrieved successfully", user)))
}

pub async fn get_worker_profile(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(worker_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let profile = app_state.rating_service.get_worker_profile(worker_id).await?;

    Ok(Json(ApiResponse::success("Worker profile retrieved successfully", profile)))
}

pub async fn get_worker_reviews(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(worker_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let reviews = app_state.rating_service.list_reviews(worker_id).await?;

    Ok(Json(ApiResponse::success("Worker reviews retrieved successfully", reviews)))
}
