use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewBid,
    BidAccepted,
    BidRejected,
    WorkerArrived,
    CompletionRequested,
    TaskCompleted,
    TaskCancelled,
    ReviewReceived,
    PaymentReleased,
}

impl NotificationType {
    pub fn to_str(&self) -> &str {
        match self {
            NotificationType::NewBid => "new_bid",
            NotificationType::BidAccepted => "bid_accepted",
            NotificationType::BidRejected => "bid_rejected",
            NotificationType::WorkerArrived => "worker_arrived",
            NotificationType::CompletionRequested => "completion_requested",
            NotificationType::TaskCompleted => "task_completed",
            NotificationType::TaskCancelled => "task_cancelled",
            NotificationType::ReviewReceived => "review_received",
            NotificationType::PaymentReleased => "payment_released",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_user_id: Uuid,
    pub notification_type: NotificationType,
    pub related_entity_id: Uuid,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
