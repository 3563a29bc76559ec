// handler/task.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::marketdb::TaskFilter,
    dtos::taskdtos::*,
    error::HttpError,
    middleware::{role_check, JWTAuthMiddeware},
    models::usermodel::UserRole,
    service::lifecycle::Actor,
    AppState,
};

pub fn task_handler() -> Router {
    Router::new()
        .route(
            "/",
            post(create_task)
                .layer(middleware::from_fn(|req, next| role_check(req, next, vec![UserRole::User])))
                .get(list_tasks),
        )
        .route("/:task_id", get(get_task))
        .route("/:task_id/cancel", put(cancel_task))
        .route("/:task_id/arrived", put(mark_worker_arrived))
        .route("/:task_id/completion-request", put(request_completion))
        .route("/:task_id/confirm", put(confirm_completion))
        .route(
            "/:task_id/bids",
            post(place_bid)
                .layer(middleware::from_fn(|req, next| role_check(req, next, vec![UserRole::Worker])))
                .get(list_bids),
        )
        .route("/:task_id/bids/:bid_id/accept", put(accept_bid))
        .route("/:task_id/bids/:bid_id/reject", put(reject_bid))
        .route("/:task_id/bids/:bid_id/withdraw", put(withdraw_bid))
        .route("/:task_id/escrow", get(get_task_escrow))
        .route("/:task_id/reviews", post(create_review))
}

pub async fn create_task(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateTaskDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let task = app_state
        .task_service
        .create_task(auth.user_id, body.category, body.title, body.description, body.budget)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success("Task created successfully", task))))
}

pub async fn list_tasks(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<TaskQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let filter = TaskFilter {
        state: params.state,
        category: params.category,
        poster_id: params.mine.unwrap_or(false).then_some(auth.user_id),
        created_before: None,
    };

    let tasks = app_state.task_service.list_tasks(&filter).await?;

    Ok(Json(ApiResponse::success("Tasks retrieved successfully", tasks)))
}

pub async fn get_task(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let task = app_state.task_service.get_task(task_id).await?;

    Ok(Json(ApiResponse::success("Task retrieved successfully", task)))
}

pub async fn cancel_task(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let task = app_state
        .task_service
        .cancel_task(task_id, Actor::User(auth.user_id))
        .await?;

    Ok(Json(ApiResponse::success("Task cancelled", task)))
}

pub async fn mark_worker_arrived(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let task = app_state
        .task_service
        .mark_worker_arrived(task_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Arrival recorded", task)))
}

pub async fn request_completion(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<RequestCompletionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let task = app_state
        .task_service
        .request_completion(task_id, auth.user_id, body.photo_url)
        .await?;

    Ok(Json(ApiResponse::success("Completion requested", task)))
}

pub async fn confirm_completion(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let task = app_state
        .task_service
        .confirm_completion(task_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Task completed and payment released", task)))
}

pub async fn place_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<PlaceBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let bid = app_state
        .bid_service
        .place_bid(task_id, auth.user_id, body.amount, body.message)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success("Bid placed successfully", bid))))
}

pub async fn list_bids(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bids = app_state.bid_service.list_bids(task_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success("Bids retrieved successfully", bids)))
}

pub async fn accept_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((task_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    let aggregate = app_state
        .bid_service
        .accept_bid(task_id, bid_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Bid accepted, escrow locked", aggregate)))
}

pub async fn reject_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((task_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state
        .bid_service
        .reject_bid(task_id, bid_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Bid rejected", bid)))
}

pub async fn withdraw_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((task_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state
        .bid_service
        .withdraw_bid(task_id, bid_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Bid withdrawn", bid)))
}

pub async fn get_task_escrow(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let escrow = app_state
        .escrow_service
        .get_escrow(task_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Escrow retrieved successfully", escrow)))
}

pub async fn create_review(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<CreateReviewDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let review = app_state
        .rating_service
        .submit_review(
            task_id,
            auth.user_id,
            body.worker_id,
            body.star_rating,
            body.category_ratings,
            body.text,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success("Review submitted successfully", review))))
}
