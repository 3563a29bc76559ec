// models/walletmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound, in minor units, for budgets, bids and single wallet movements.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "transaction_direction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    Credit,
    Debit,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    JobPayment,
    PlatformFee,
    EscrowHold,
    EscrowRefund,
    Adjustment,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub direction: TransactionDirection,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub task_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Signed effect of this transaction on the wallet balance.
    pub fn delta(&self) -> i64 {
        match self.direction {
            TransactionDirection::Credit => self.amount,
            TransactionDirection::Debit => -self.amount,
        }
    }
}

/// A pending balance movement. The store resolves it into a
/// `WalletTransaction` at commit time, against the balance it holds then.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletEntry {
    pub user_id: Uuid,
    pub direction: TransactionDirection,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub task_id: Option<Uuid>,
    pub description: String,
}

impl WalletEntry {
    pub fn credit(user_id: Uuid, transaction_type: TransactionType, amount: i64, task_id: Option<Uuid>, description: impl Into<String>) -> Self {
        Self {
            user_id,
            direction: TransactionDirection::Credit,
            transaction_type,
            amount,
            task_id,
            description: description.into(),
        }
    }

    pub fn debit(user_id: Uuid, transaction_type: TransactionType, amount: i64, task_id: Option<Uuid>, description: impl Into<String>) -> Self {
        Self {
            user_id,
            direction: TransactionDirection::Debit,
            transaction_type,
            amount,
            task_id,
            description: description.into(),
        }
    }

    /// Balance after this entry, or `None` if the entry is not positive or
    /// the arithmetic overflows.
    pub fn applied_to(&self, balance: i64) -> Option<i64> {
        if self.amount <= 0 {
            return None;
        }
        match self.direction {
            TransactionDirection::Credit => balance.checked_add(self.amount),
            TransactionDirection::Debit => balance.checked_sub(self.amount),
        }
    }
}
