use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::taskmodel::{TaskCategory, TaskState};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(email(message = "Email is invalid"))]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTaskDto {
    pub category: TaskCategory,

    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: String,

    #[validate(length(min = 10, max = 2000, message = "Description must be between 10 and 2000 characters"))]
    pub description: String,

    /// Minor currency units, at most `MAX_AMOUNT`.
    #[validate(range(min = 1, max = 1000000000000, message = "Budget must be between 1 and 1000000000000"))]
    pub budget: i64,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct TaskQueryDto {
    pub state: Option<TaskState>,
    pub category: Option<TaskCategory>,
    /// Only tasks posted by the caller.
    pub mine: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PlaceBidDto {
    #[validate(range(min = 1, max = 1000000000000, message = "Amount must be between 1 and 1000000000000"))]
    pub amount: i64,

    #[validate(length(max = 1000, message = "Message must be at most 1000 characters"))]
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RequestCompletionDto {
    #[validate(url(message = "Invalid photo URL"))]
    pub photo_url: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateReviewDto {
    pub worker_id: Uuid,

    pub star_rating: i32,

    #[serde(default)]
    pub category_ratings: BTreeMap<String, i32>,

    #[validate(length(max = 2000, message = "Review must be at most 2000 characters"))]
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NotificationQueryDto {
    pub unread_only: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkAllReadDto {
    pub updated: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::walletmodels::MAX_AMOUNT;

    #[test]
    fn review_body_defaults_optional_fields() {
        let body: CreateReviewDto =
            serde_json::from_str(&format!(r#"{{"worker_id":"{}","star_rating":5}}"#, Uuid::nil())).unwrap();

        assert!(body.category_ratings.is_empty());
        assert!(body.text.is_empty());
        assert!(body.validate().is_ok());
    }

    #[test]
    fn task_body_is_validated() {
        let body = CreateTaskDto {
            category: TaskCategory::Moving,
            title: "x".to_string(),
            description: "Move a sofa downstairs".to_string(),
            budget: 500,
        };
        assert!(body.validate().is_err());

        let too_big = CreateTaskDto { title: "Move a sofa".to_string(), budget: MAX_AMOUNT + 1, ..body };
        assert!(too_big.validate().is_err());

        let completion = RequestCompletionDto { photo_url: "not a url".to_string() };
        assert!(completion.validate().is_err());
    }

    #[test]
    fn bid_amount_bounds_follow_max_amount() {
        let bid = |amount| PlaceBidDto { amount, message: String::new() };

        assert!(bid(1).validate().is_ok());
        assert!(bid(MAX_AMOUNT).validate().is_ok());
        assert!(bid(0).validate().is_err());
        assert!(bid(MAX_AMOUNT + 1).validate().is_err());
        assert!(bid(i64::MAX).validate().is_err());
    }
}
