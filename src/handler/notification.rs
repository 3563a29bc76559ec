// handler/notification.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{delete, get, put},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::{
    dtos::taskdtos::{ApiResponse, MarkAllReadDto, NotificationQueryDto},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn notification_handler() -> Router {
    Router::new()
        .route("/", get(get_notifications))
        .route("/read-all", put(mark_all_read))
        .route("/:notification_id/read", put(mark_read))
        .route("/:notification_id", delete(delete_notification))
}

pub async fn get_notifications(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<NotificationQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let notifications = app_state
        .notification_service
        .get_user_notifications(auth.user_id, params.unread_only.unwrap_or(false))
        .await?;

    Ok(Json(ApiResponse::success("Notifications retrieved successfully", notifications)))
}

pub async fn mark_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let notification = app_state
        .notification_service
        .mark_notification_read(notification_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Notification marked as read", notification)))
}

pub async fn mark_all_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .notification_service
        .mark_all_notifications_read(auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("All notifications marked as read", MarkAllReadDto { updated })))
}

pub async fn delete_notification(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .notification_service
        .delete_notification(notification_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Notification deleted", notification_id)))
}
