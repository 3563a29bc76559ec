// db/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::marketdb::{ChangeSet, MarketExt, StoreError, TaskFilter, Write};
use crate::models::{
    notificationmodel::Notification,
    taskmodel::*,
    usermodel::User,
    walletmodels::*,
};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    tasks: HashMap<Uuid, Task>,
    bids: HashMap<Uuid, Bid>,
    escrows: HashMap<Uuid, Escrow>,
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<WalletTransaction>,
    reviews: Vec<Review>,
    worker_profiles: HashMap<Uuid, WorkerProfile>,
    notifications: Vec<Notification>,
}

/// Entity store kept in process memory. Used for tests and for running the
/// service without a database; commits are serialized by a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn check(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        if let Some(write) = &changes.task {
            match write {
                Write::Insert(task) => {
                    if self.tasks.contains_key(&task.id) {
                        return Err(StoreError::Conflict { entity: "task", id: task.id });
                    }
                }
                Write::Update { record, expected_version } => {
                    let stored = self.tasks.get(&record.id).map(|task| task.version);
                    if stored != Some(*expected_version) {
                        return Err(StoreError::Conflict { entity: "task", id: record.id });
                    }
                }
            }
        }

        for bid in changes.bids.iter().filter(|bid| bid.is_active()) {
            let stored_clash = self.bids.values().any(|other| {
                other.id != bid.id
                    && other.task_id == bid.task_id
                    && other.worker_id == bid.worker_id
                    && other.is_active()
                    && !changes.bids.iter().any(|changed| changed.id == other.id && !changed.is_active())
            });
            let batch_clash = changes.bids.iter().any(|other| {
                other.id != bid.id
                    && other.task_id == bid.task_id
                    && other.worker_id == bid.worker_id
                    && other.is_active()
            });
            if stored_clash || batch_clash {
                return Err(StoreError::DuplicateBid { task_id: bid.task_id, worker_id: bid.worker_id });
            }
        }

        if let Some(review) = &changes.review {
            let exists = self
                .reviews
                .iter()
                .any(|other| other.task_id == review.task_id && other.worker_id == review.worker_id);
            if exists {
                return Err(StoreError::DuplicateReview { task_id: review.task_id, worker_id: review.worker_id });
            }
        }

        if let Some(write) = &changes.worker_profile {
            let user_id = write.record().user_id;
            let stored = self.worker_profiles.get(&user_id).map(|profile| profile.version);
            let expected = match write {
                Write::Insert(_) => None,
                Write::Update { expected_version, .. } => Some(*expected_version),
            };
            if stored != expected {
                return Err(StoreError::Conflict { entity: "worker_profile", id: user_id });
            }
        }

        let mut balances: HashMap<Uuid, i64> = HashMap::new();
        for entry in &changes.wallet_entries {
            let balance = balances
                .entry(entry.user_id)
                .or_insert_with(|| self.wallets.get(&entry.user_id).map_or(0, |wallet| wallet.balance));
            let next = entry
                .applied_to(*balance)
                .ok_or(StoreError::InvalidEntry { user_id: entry.user_id, amount: entry.amount })?;
            if next < 0 {
                return Err(StoreError::InsufficientFunds {
                    user_id: entry.user_id,
                    required: entry.amount,
                    available: *balance,
                });
            }
            *balance = next;
        }

        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) -> Vec<WalletTransaction> {
        for user in changes.users {
            match self.users.get_mut(&user.id) {
                Some(existing) => {
                    existing.name = user.name;
                    existing.email = user.email;
                    existing.updated_at = user.updated_at;
                }
                None => {
                    self.users.insert(user.id, user);
                }
            }
        }

        if let Some(write) = changes.task {
            let task = match write {
                Write::Insert(task) => task,
                Write::Update { record, .. } => record,
            };
            self.tasks.insert(task.id, task);
        }

        for bid in changes.bids {
            self.bids.insert(bid.id, bid);
        }

        if let Some(escrow) = changes.escrow {
            self.escrows.insert(escrow.task_id, escrow);
        }

        if let Some(review) = changes.review {
            self.reviews.push(review);
        }

        if let Some(write) = changes.worker_profile {
            match write {
                Write::Insert(profile) => {
                    self.worker_profiles.insert(profile.user_id, profile);
                }
                Write::Update { record, .. } => {
                    self.worker_profiles.insert(record.user_id, record);
                }
            }
        }

        let mut resolved = Vec::with_capacity(changes.wallet_entries.len());
        for entry in changes.wallet_entries {
            let now = Utc::now();
            let wallet = self.wallets.entry(entry.user_id).or_insert_with(|| Wallet {
                user_id: entry.user_id,
                balance: 0,
                created_at: now,
                updated_at: now,
            });
            let balance_before = wallet.balance;
            let transaction = WalletTransaction {
                id: Uuid::new_v4(),
                user_id: entry.user_id,
                direction: entry.direction,
                transaction_type: entry.transaction_type,
                amount: entry.amount,
                balance_before,
                balance_after: 0,
                task_id: entry.task_id,
                description: entry.description,
                created_at: now,
            };
            // Bounds were checked against the same balances in `check`.
            wallet.balance = balance_before.saturating_add(transaction.delta());
            wallet.updated_at = now;

            let transaction = WalletTransaction { balance_after: wallet.balance, ..transaction };
            self.transactions.push(transaction.clone());
            resolved.push(transaction);
        }

        self.notifications.extend(changes.notifications);

        resolved
    }
}

#[async_trait]
impl MarketExt for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.state.read().await.tasks.get(&task_id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state.tasks.values().filter(|task| filter.matches(task)).cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn get_task_aggregate(&self, task_id: Uuid) -> Result<Option<TaskAggregate>, StoreError> {
        let state = self.state.read().await;
        let Some(task) = state.tasks.get(&task_id).cloned() else {
            return Ok(None);
        };

        let mut bids: Vec<Bid> = state.bids.values().filter(|bid| bid.task_id == task_id).cloned().collect();
        bids.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let escrow = state.escrows.get(&task_id).cloned();

        Ok(Some(TaskAggregate { task, bids, escrow }))
    }

    async fn get_escrow(&self, task_id: Uuid) -> Result<Option<Escrow>, StoreError> {
        Ok(self.state.read().await.escrows.get(&task_id).cloned())
    }

    async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.state.read().await.wallets.get(&user_id).cloned())
    }

    async fn get_wallet_transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, StoreError> {
        let state = self.state.read().await;
        Ok(state.transactions.iter().filter(|tx| tx.user_id == user_id).cloned().collect())
    }

    async fn get_worker_profile(&self, user_id: Uuid) -> Result<Option<WorkerProfile>, StoreError> {
        Ok(self.state.read().await.worker_profiles.get(&user_id).cloned())
    }

    async fn get_review(&self, task_id: Uuid, worker_id: Uuid) -> Result<Option<Review>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .reviews
            .iter()
            .find(|review| review.task_id == task_id && review.worker_id == worker_id)
            .cloned())
    }

    async fn get_worker_reviews(&self, worker_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let state = self.state.read().await;
        Ok(state.reviews.iter().rev().filter(|review| review.worker_id == worker_id).cloned().collect())
    }

    async fn get_user_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient_user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Notification>, StoreError> {
        let mut state = self.state.write().await;
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.recipient_user_id == user_id);

        Ok(notification.map(|n| {
            n.is_read = true;
            n.clone()
        }))
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for n in state.notifications.iter_mut().filter(|n| n.recipient_user_id == user_id && !n.is_read) {
            n.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_notification(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let before = state.notifications.len();
        state
            .notifications
            .retain(|n| !(n.id == notification_id && n.recipient_user_id == user_id));
        Ok(state.notifications.len() < before)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<Vec<WalletTransaction>, StoreError> {
        let mut state = self.state.write().await;
        state.check(&changes)?;
        Ok(state.apply(changes))
    }
}
