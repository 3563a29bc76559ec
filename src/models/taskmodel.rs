use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "task_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Cleaning,
    Plumbing,
    Electrical,
    Carpentry,
    Painting,
    Moving,
    Gardening,
    ApplianceRepair,
    Delivery,
    Handyman,
    Tutoring,
    Other,
}

impl TaskCategory {
    pub fn to_str(&self) -> &str {
        match self {
            TaskCategory::Cleaning => "cleaning",
            TaskCategory::Plumbing => "plumbing",
            TaskCategory::Electrical => "electrical",
            TaskCategory::Carpentry => "carpentry",
            TaskCategory::Painting => "painting",
            TaskCategory::Moving => "moving",
            TaskCategory::Gardening => "gardening",
            TaskCategory::ApplianceRepair => "appliance_repair",
            TaskCategory::Delivery => "delivery",
            TaskCategory::Handyman => "handyman",
            TaskCategory::Tutoring => "tutoring",
            TaskCategory::Other => "other",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "task_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskState {
    pub fn to_str(&self) -> &str {
        match self {
            TaskState::Open => "open",
            TaskState::InProgress => "in_progress",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "bid_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "escrow_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Locked,
    Released,
    Refunded,
}

/// How escrowed funds are backed when a bid is accepted.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "funding_model", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FundingModel {
    /// The lock is only a reservation; the poster settles outside the wallet.
    Deferred,
    /// The poster's wallet is debited for the full total at lock time.
    Prepaid,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub poster_id: Uuid,
    pub category: TaskCategory,
    pub title: String,
    pub description: String,
    pub budget: i64,
    pub accepted_bid_amount: Option<i64>,
    pub state: TaskState,
    pub assigned_worker_id: Option<Uuid>,
    pub worker_arrived: bool,
    pub completion_requested: bool,
    pub completion_photo_url: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Bid {
    pub id: Uuid,
    pub task_id: Uuid,
    pub worker_id: Uuid,
    pub amount: i64,
    pub message: String,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bid {
    pub fn is_active(&self) -> bool {
        self.status != BidStatus::Rejected
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Escrow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub poster_id: Uuid,
    pub worker_id: Uuid,
    pub amount: i64,
    pub platform_fee: i64,
    pub total: i64,
    pub status: EscrowStatus,
    pub funding_model: FundingModel,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

/// A task together with everything that is written in the same transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TaskAggregate {
    pub task: Task,
    pub bids: Vec<Bid>,
    pub escrow: Option<Escrow>,
}

impl TaskAggregate {
    pub fn bid(&self, bid_id: Uuid) -> Option<&Bid> {
        self.bids.iter().find(|bid| bid.id == bid_id)
    }

    pub fn accepted_bids(&self) -> impl Iterator<Item = &Bid> {
        self.bids.iter().filter(|bid| bid.status == BidStatus::Accepted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Review {
    pub id: Uuid,
    pub task_id: Uuid,
    pub worker_id: Uuid,
    pub poster_id: Uuid,
    pub star_rating: i32,
    #[sqlx(json)]
    pub category_ratings: BTreeMap<String, i32>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CategoryRating {
    pub average: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct WorkerProfile {
    pub user_id: Uuid,
    pub overall_rating: f64,
    pub total_reviews: i64,
    /// Keyed by `TaskCategory::to_str`.
    #[sqlx(json)]
    pub category_ratings: BTreeMap<String, CategoryRating>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl WorkerProfile {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            overall_rating: 0.0,
            total_reviews: 0,
            category_ratings: BTreeMap::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }
}
