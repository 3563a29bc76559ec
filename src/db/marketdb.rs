// db/marketdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, Postgres, Row, Transaction};
use thiserror::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::{
    notificationmodel::Notification,
    taskmodel::*,
    usermodel::User,
    walletmodels::*,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: Uuid },

    #[error("Worker {worker_id} already has an active bid on task {task_id}")]
    DuplicateBid { task_id: Uuid, worker_id: Uuid },

    #[error("Worker {worker_id} has already been reviewed for task {task_id}")]
    DuplicateReview { task_id: Uuid, worker_id: Uuid },

    #[error("Insufficient funds in wallet {user_id}: required {required}, available {available}")]
    InsufficientFunds { user_id: Uuid, required: i64, available: i64 },

    #[error("Wallet entry of {amount} for {user_id} is out of range")]
    InvalidEntry { user_id: Uuid, amount: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A record write guarded by the version it was read at.
#[derive(Debug, Clone)]
pub enum Write<T> {
    Insert(T),
    Update { record: T, expected_version: i64 },
}

impl<T> Write<T> {
    pub fn record(&self) -> &T {
        match self {
            Write::Insert(record) => record,
            Write::Update { record, .. } => record,
        }
    }
}

/// Everything one operation writes. A store applies a change set
/// completely or not at all.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub users: Vec<User>,
    pub task: Option<Write<Task>>,
    pub bids: Vec<Bid>,
    pub escrow: Option<Escrow>,
    pub wallet_entries: Vec<WalletEntry>,
    pub review: Option<Review>,
    pub worker_profile: Option<Write<WorkerProfile>>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub category: Option<TaskCategory>,
    pub poster_id: Option<Uuid>,
    pub created_before: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.state.map_or(true, |state| task.state == state)
            && self.category.map_or(true, |category| task.category == category)
            && self.poster_id.map_or(true, |poster_id| task.poster_id == poster_id)
            && self.created_before.map_or(true, |cutoff| task.created_at < cutoff)
    }
}

#[async_trait]
pub trait MarketExt: Send + Sync + std::fmt::Debug {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, StoreError>;

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    async fn get_task_aggregate(&self, task_id: Uuid) -> Result<Option<TaskAggregate>, StoreError>;

    async fn get_escrow(&self, task_id: Uuid) -> Result<Option<Escrow>, StoreError>;

    async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    async fn get_wallet_transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, StoreError>;

    async fn get_worker_profile(&self, user_id: Uuid) -> Result<Option<WorkerProfile>, StoreError>;

    async fn get_review(&self, task_id: Uuid, worker_id: Uuid) -> Result<Option<Review>, StoreError>;

    async fn get_worker_reviews(&self, worker_id: Uuid) -> Result<Vec<Review>, StoreError>;

    async fn get_user_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError>;

    /// Returns `None` when the notification does not exist or belongs to
    /// another user.
    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Notification>, StoreError>;

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn delete_notification(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    /// Atomically apply `changes`. Returns the wallet transactions the
    /// change set's entries resolved to, in entry order.
    async fn commit(&self, changes: ChangeSet) -> Result<Vec<WalletTransaction>, StoreError>;
}

const TASK_COLUMNS: &str = "id, poster_id, category, title, description, budget, accepted_bid_amount, \
    state, assigned_worker_id, worker_arrived, completion_requested, completion_photo_url, \
    version, created_at, updated_at";

const BID_COLUMNS: &str = "id, task_id, worker_id, amount, message, status, created_at, updated_at";

const ESCROW_COLUMNS: &str = "id, task_id, poster_id, worker_id, amount, platform_fee, total, status, \
    funding_model, created_at, released_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, direction, transaction_type, amount, balance_before, \
    balance_after, task_id, description, created_at";

const REVIEW_COLUMNS: &str = "id, task_id, worker_id, poster_id, star_rating, category_ratings, text, created_at";

const NOTIFICATION_COLUMNS: &str = "id, recipient_user_id, notification_type, related_entity_id, is_read, created_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

#[async_trait]
impl MarketExt for DBClient {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(task)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE ($1::task_state IS NULL OR state = $1)
              AND ($2::task_category IS NULL OR category = $2)
              AND ($3::uuid IS NULL OR poster_id = $3)
              AND ($4::timestamptz IS NULL OR created_at < $4)
            ORDER BY created_at DESC
            "#
        ))
        .bind(filter.state)
        .bind(filter.category)
        .bind(filter.poster_id)
        .bind(filter.created_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    async fn get_task_aggregate(&self, task_id: Uuid) -> Result<Option<TaskAggregate>, StoreError> {
        let Some(task) = self.get_task(task_id).await? else {
            return Ok(None);
        };

        let bids = sqlx::query_as::<_, Bid>(&format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE task_id = $1 ORDER BY created_at ASC"
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        let escrow = self.get_escrow(task_id).await?;

        Ok(Some(TaskAggregate { task, bids, escrow }))
    }

    async fn get_escrow(&self, task_id: Uuid) -> Result<Option<Escrow>, StoreError> {
        let escrow = sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrows WHERE task_id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(escrow)
    }

    async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT user_id, balance, created_at, updated_at FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn get_wallet_transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, StoreError> {
        let transactions = sqlx::query_as::<_, WalletTransaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE user_id = $1 ORDER BY seq ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn get_worker_profile(&self, user_id: Uuid) -> Result<Option<WorkerProfile>, StoreError> {
        let profile = sqlx::query_as::<_, WorkerProfile>(
            r#"
            SELECT user_id, overall_rating, total_reviews, category_ratings, version, updated_at
            FROM worker_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn get_review(&self, task_id: Uuid, worker_id: Uuid) -> Result<Option<Review>, StoreError> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE task_id = $1 AND worker_id = $2"
        ))
        .bind(task_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(review)
    }

    async fn get_worker_reviews(&self, worker_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE worker_id = $1 ORDER BY created_at DESC"
        ))
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reviews)
    }

    async fn get_user_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError> {
        let notifications = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE recipient_user_id = $1 AND (NOT $2 OR is_read = false)
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET is_read = true
            WHERE id = $1 AND recipient_user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(notification)
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE recipient_user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_user_id = $2")
            .bind(notification_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<Vec<WalletTransaction>, StoreError> {
        // Dropping `tx` on any early return rolls the whole change set back.
        let mut tx = self.pool.begin().await?;

        for user in &changes.users {
            upsert_user(&mut tx, user).await?;
        }

        if let Some(write) = &changes.task {
            write_task(&mut tx, write).await?;
        }

        for bid in &changes.bids {
            upsert_bid(&mut tx, bid).await?;
        }

        if let Some(escrow) = &changes.escrow {
            upsert_escrow(&mut tx, escrow).await?;
        }

        if let Some(review) = &changes.review {
            insert_review(&mut tx, review).await?;
        }

        if let Some(write) = &changes.worker_profile {
            write_worker_profile(&mut tx, write).await?;
        }

        let mut transactions = Vec::with_capacity(changes.wallet_entries.len());
        for entry in &changes.wallet_entries {
            transactions.push(apply_wallet_entry(&mut tx, entry).await?);
        }

        for notification in &changes.notifications {
            insert_notification(&mut tx, notification).await?;
        }

        tx.commit().await?;
        Ok(transactions)
    }
}

async fn upsert_user(tx: &mut Transaction<'_, Postgres>, user: &User) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, email = EXCLUDED.email, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(user.role)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn write_task(tx: &mut Transaction<'_, Postgres>, write: &Write<Task>) -> Result<(), StoreError> {
    match write {
        Write::Insert(task) => {
            let result = sqlx::query(
                r#"
                INSERT INTO tasks
                (id, poster_id, category, title, description, budget, accepted_bid_amount, state,
                 assigned_worker_id, worker_arrived, completion_requested, completion_photo_url,
                 version, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(task.id)
            .bind(task.poster_id)
            .bind(task.category)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.budget)
            .bind(task.accepted_bid_amount)
            .bind(task.state)
            .bind(task.assigned_worker_id)
            .bind(task.worker_arrived)
            .bind(task.completion_requested)
            .bind(&task.completion_photo_url)
            .bind(task.version)
            .bind(task.created_at)
            .bind(task.updated_at)
            .execute(&mut **tx)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict { entity: "task", id: task.id }),
                Err(err) => Err(err.into()),
            }
        }
        Write::Update { record: task, expected_version } => {
            let result = sqlx::query(
                r#"
                UPDATE tasks
                SET accepted_bid_amount = $3,
                    state = $4,
                    assigned_worker_id = $5,
                    worker_arrived = $6,
                    completion_requested = $7,
                    completion_photo_url = $8,
                    version = $9,
                    updated_at = $10
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(task.id)
            .bind(expected_version)
            .bind(task.accepted_bid_amount)
            .bind(task.state)
            .bind(task.assigned_worker_id)
            .bind(task.worker_arrived)
            .bind(task.completion_requested)
            .bind(&task.completion_photo_url)
            .bind(task.version)
            .bind(task.updated_at)
            .execute(&mut **tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict { entity: "task", id: task.id });
            }
            Ok(())
        }
    }
}

async fn upsert_bid(tx: &mut Transaction<'_, Postgres>, bid: &Bid) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO bids (id, task_id, worker_id, amount, message, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(bid.id)
    .bind(bid.task_id)
    .bind(bid.worker_id)
    .bind(bid.amount)
    .bind(&bid.message)
    .bind(bid.status)
    .bind(bid.created_at)
    .bind(bid.updated_at)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateBid {
            task_id: bid.task_id,
            worker_id: bid.worker_id,
        }),
        Err(err) => Err(err.into()),
    }
}

async fn upsert_escrow(tx: &mut Transaction<'_, Postgres>, escrow: &Escrow) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO escrows
        (id, task_id, poster_id, worker_id, amount, platform_fee, total, status, funding_model,
         created_at, released_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status, released_at = EXCLUDED.released_at
        "#,
    )
    .bind(escrow.id)
    .bind(escrow.task_id)
    .bind(escrow.poster_id)
    .bind(escrow.worker_id)
    .bind(escrow.amount)
    .bind(escrow.platform_fee)
    .bind(escrow.total)
    .bind(escrow.status)
    .bind(escrow.funding_model)
    .bind(escrow.created_at)
    .bind(escrow.released_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_review(tx: &mut Transaction<'_, Postgres>, review: &Review) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO reviews
        (id, task_id, worker_id, poster_id, star_rating, category_ratings, text, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(review.id)
    .bind(review.task_id)
    .bind(review.worker_id)
    .bind(review.poster_id)
    .bind(review.star_rating)
    .bind(Json(&review.category_ratings))
    .bind(&review.text)
    .bind(review.created_at)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateReview {
            task_id: review.task_id,
            worker_id: review.worker_id,
        }),
        Err(err) => Err(err.into()),
    }
}

async fn write_worker_profile(
    tx: &mut Transaction<'_, Postgres>,
    write: &Write<WorkerProfile>,
) -> Result<(), StoreError> {
    let profile = write.record();
    let result = match write {
        Write::Insert(_) => {
            sqlx::query(
                r#"
                INSERT INTO worker_profiles
                (user_id, overall_rating, total_reviews, category_ratings, version, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(profile.user_id)
            .bind(profile.overall_rating)
            .bind(profile.total_reviews)
            .bind(Json(&profile.category_ratings))
            .bind(profile.version)
            .bind(profile.updated_at)
            .execute(&mut **tx)
            .await?
        }
        Write::Update { expected_version, .. } => {
            sqlx::query(
                r#"
                UPDATE worker_profiles
                SET overall_rating = $3,
                    total_reviews = $4,
                    category_ratings = $5,
                    version = $6,
                    updated_at = $7
                WHERE user_id = $1 AND version = $2
                "#,
            )
            .bind(profile.user_id)
            .bind(expected_version)
            .bind(profile.overall_rating)
            .bind(profile.total_reviews)
            .bind(Json(&profile.category_ratings))
            .bind(profile.version)
            .bind(profile.updated_at)
            .execute(&mut **tx)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict { entity: "worker_profile", id: profile.user_id });
    }
    Ok(())
}

async fn apply_wallet_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &WalletEntry,
) -> Result<WalletTransaction, StoreError> {
    sqlx::query("INSERT INTO wallets (user_id, balance) VALUES ($1, 0) ON CONFLICT (user_id) DO NOTHING")
        .bind(entry.user_id)
        .execute(&mut **tx)
        .await?;

    let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
        .bind(entry.user_id)
        .fetch_one(&mut **tx)
        .await?;

    let balance_before = row.get::<i64, _>("balance");
    let balance_after = entry
        .applied_to(balance_before)
        .ok_or(StoreError::InvalidEntry { user_id: entry.user_id, amount: entry.amount })?;

    if balance_after < 0 {
        return Err(StoreError::InsufficientFunds {
            user_id: entry.user_id,
            required: entry.amount,
            available: balance_before,
        });
    }

    sqlx::query("UPDATE wallets SET balance = $2, updated_at = NOW() WHERE user_id = $1")
        .bind(entry.user_id)
        .bind(balance_after)
        .execute(&mut **tx)
        .await?;

    let transaction = sqlx::query_as::<_, WalletTransaction>(&format!(
        r#"
        INSERT INTO wallet_transactions
        (id, user_id, direction, transaction_type, amount, balance_before, balance_after, task_id, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(entry.direction)
    .bind(entry.transaction_type)
    .bind(entry.amount)
    .bind(balance_before)
    .bind(balance_after)
    .bind(entry.task_id)
    .bind(&entry.description)
    .fetch_one(&mut **tx)
    .await?;

    Ok(transaction)
}

async fn insert_notification(
    tx: &mut Transaction<'_, Postgres>,
    notification: &Notification,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO notifications
        (id, recipient_user_id, notification_type, related_entity_id, is_read, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(notification.id)
    .bind(notification.recipient_user_id)
    .bind(notification.notification_type)
    .bind(notification.related_entity_id)
    .bind(notification.is_read)
    .bind(notification.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
