use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{db::marketdb::StoreError, error::HttpError, models::walletmodels::MAX_AMOUNT};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("User {actor} is not authorized to {action}")]
    Unauthorized { actor: Uuid, action: &'static str },

    #[error("Worker {worker_id} already has an active bid on task {task_id}")]
    DuplicateBid { task_id: Uuid, worker_id: Uuid },

    #[error("Worker {worker_id} has already been reviewed for task {task_id}")]
    DuplicateReview { task_id: Uuid, worker_id: Uuid },

    #[error("Invalid amount {0}: amounts must be between 1 and {}", MAX_AMOUNT)]
    InvalidAmount(i64),

    #[error("Invalid rating {0}: ratings must be between 1 and 5")]
    InvalidRating(i32),

    #[error("{entity} {id} was modified concurrently, retry the request")]
    Conflict { entity: &'static str, id: Uuid },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        ServiceError::NotFound { entity, id }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ServiceError::InvalidState(message.into())
    }

    pub fn unauthorized(actor: Uuid, action: &'static str) -> Self {
        ServiceError::Unauthorized { actor, action }
    }

    /// Accepts budgets and bid amounts in `1..=MAX_AMOUNT`.
    pub fn check_amount(amount: i64) -> Result<i64, ServiceError> {
        if (1..=MAX_AMOUNT).contains(&amount) {
            Ok(amount)
        } else {
            Err(ServiceError::InvalidAmount(amount))
        }
    }

    /// Only a concurrent-modification failure is worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,

            ServiceError::InvalidState(_)
            | ServiceError::DuplicateBid { .. }
            | ServiceError::DuplicateReview { .. }
            | ServiceError::Conflict { .. } => StatusCode::CONFLICT,

            ServiceError::InvalidAmount(_) | ServiceError::InvalidRating(_) => StatusCode::BAD_REQUEST,

            ServiceError::Unauthorized { .. } => StatusCode::FORBIDDEN,

            ServiceError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,

            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { entity, id } => ServiceError::Conflict { entity, id },
            StoreError::DuplicateBid { task_id, worker_id } => ServiceError::DuplicateBid { task_id, worker_id },
            StoreError::DuplicateReview { task_id, worker_id } => {
                ServiceError::DuplicateReview { task_id, worker_id }
            }
            StoreError::InsufficientFunds { required, available, .. } => {
                ServiceError::InsufficientFunds { required, available }
            }
            StoreError::InvalidEntry { amount, .. } => ServiceError::InvalidAmount(amount),
            StoreError::Database(err) => ServiceError::Database(err),
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Service failure: {}", error);
        }
        HttpError::new(error.to_string(), status)
    }
}
