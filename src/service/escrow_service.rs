// service/escrow_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::marketdb::{ChangeSet, MarketExt, Write},
    models::{
        notificationmodel::NotificationType,
        taskmodel::*,
        walletmodels::{TransactionType, WalletEntry},
    },
    service::{error::ServiceError, notification_service::NotificationService},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscrowPolicy {
    /// Platform fee in basis points of the accepted bid amount.
    pub fee_basis_points: u32,
    pub funding_model: FundingModel,
    /// Wallet that collects platform fees.
    pub platform_account_id: Uuid,
}

impl Default for EscrowPolicy {
    fn default() -> Self {
        Self {
            fee_basis_points: 300,
            funding_model: FundingModel::Deferred,
            platform_account_id: Uuid::nil(),
        }
    }
}

impl EscrowPolicy {
    /// Rounded down to the minor unit. `None` if the fee does not fit an `i64`.
    pub fn platform_fee(&self, amount: i64) -> Option<i64> {
        i64::try_from(i128::from(amount) * i128::from(self.fee_basis_points) / 10_000).ok()
    }
}

/// An escrow record in its next state plus the wallet movements that go
/// with it. Nothing is written until the caller commits the plan.
#[derive(Debug, Clone)]
pub struct EscrowPlan {
    pub escrow: Escrow,
    pub wallet_entries: Vec<WalletEntry>,
}

#[derive(Debug, Clone)]
pub struct EscrowService {
    db_client: Arc<dyn MarketExt>,
    policy: EscrowPolicy,
}

impl EscrowService {
    pub fn new(db_client: Arc<dyn MarketExt>, policy: EscrowPolicy) -> Self {
        Self { db_client, policy }
    }

    pub async fn plan_lock(&self, task: &Task, worker_id: Uuid, amount: i64) -> Result<EscrowPlan, ServiceError> {
        ServiceError::check_amount(amount)?;

        let (platform_fee, total) = self
            .policy
            .platform_fee(amount)
            .and_then(|fee| Some((fee, amount.checked_add(fee)?)))
            .ok_or(ServiceError::InvalidAmount(amount))?;

        let mut wallet_entries = Vec::new();
        if self.policy.funding_model == FundingModel::Prepaid {
            let available = self
                .db_client
                .get_wallet(task.poster_id)
                .await?
                .map_or(0, |wallet| wallet.balance);

            if available < total {
                return Err(ServiceError::InsufficientFunds { required: total, available });
            }

            wallet_entries.push(WalletEntry::debit(
                task.poster_id,
                TransactionType::EscrowHold,
                total,
                Some(task.id),
                format!("Escrow hold for task {}", task.id),
            ));
        }

        let escrow = Escrow {
            id: Uuid::new_v4(),
            task_id: task.id,
            poster_id: task.poster_id,
            worker_id,
            amount,
            platform_fee,
            total,
            status: EscrowStatus::Locked,
            funding_model: self.policy.funding_model,
            created_at: Utc::now(),
            released_at: None,
        };

        tracing::info!(
            "Escrow locked for task {}: amount {}, fee {}, total {}",
            task.id,
            amount,
            platform_fee,
            total
        );

        Ok(EscrowPlan { escrow, wallet_entries })
    }

    /// `task` is the task as it will be stored, so it must already be
    /// COMPLETED when release happens as part of completion.
    pub fn plan_release(&self, task: &Task, escrow: &Escrow) -> Result<EscrowPlan, ServiceError> {
        if escrow.status != EscrowStatus::Locked {
            return Err(ServiceError::invalid_state(format!(
                "escrow for task {} is {:?}, not locked",
                escrow.task_id, escrow.status
            )));
        }

        if task.state != TaskState::Completed {
            return Err(ServiceError::invalid_state(format!(
                "escrow for task {} can only be released once the task is completed",
                task.id
            )));
        }

        let mut wallet_entries = vec![WalletEntry::credit(
            escrow.worker_id,
            TransactionType::JobPayment,
            escrow.amount,
            Some(task.id),
            format!("Payment for task {}", task.id),
        )];

        if escrow.platform_fee > 0 {
            wallet_entries.push(WalletEntry::credit(
                self.policy.platform_account_id,
                TransactionType::PlatformFee,
                escrow.platform_fee,
                Some(task.id),
                format!("Platform fee for task {}", task.id),
            ));
        }

        let escrow = Escrow {
            status: EscrowStatus::Released,
            released_at: Some(Utc::now()),
            ..escrow.clone()
        };

        Ok(EscrowPlan { escrow, wallet_entries })
    }

    pub fn plan_refund(&self, escrow: &Escrow) -> Result<EscrowPlan, ServiceError> {
        if escrow.status != EscrowStatus::Locked {
            return Err(ServiceError::invalid_state(format!(
                "escrow for task {} is {:?}, not locked",
                escrow.task_id, escrow.status
            )));
        }

        // Follows the model the funds were locked under, not the current policy.
        let wallet_entries = match escrow.funding_model {
            FundingModel::Prepaid => vec![WalletEntry::credit(
                escrow.poster_id,
                TransactionType::EscrowRefund,
                escrow.total,
                Some(escrow.task_id),
                format!("Escrow refund for task {}", escrow.task_id),
            )],
            FundingModel::Deferred => Vec::new(),
        };

        let escrow = Escrow {
            status: EscrowStatus::Refunded,
            ..escrow.clone()
        };

        Ok(EscrowPlan { escrow, wallet_entries })
    }

    /// Release a locked escrow whose task is already completed.
    pub async fn release(&self, task_id: Uuid) -> Result<Escrow, ServiceError> {
        let aggregate = self
            .db_client
            .get_task_aggregate(task_id)
            .await?
            .ok_or(ServiceError::not_found("task", task_id))?;

        let escrow = aggregate
            .escrow
            .as_ref()
            .ok_or(ServiceError::not_found("escrow", task_id))?;

        let plan = self.plan_release(&aggregate.task, escrow)?;

        let task = Task {
            version: aggregate.task.version + 1,
            updated_at: Utc::now(),
            ..aggregate.task.clone()
        };

        self.db_client
            .commit(ChangeSet {
                task: Some(Write::Update { record: task, expected_version: aggregate.task.version }),
                escrow: Some(plan.escrow.clone()),
                wallet_entries: plan.wallet_entries,
                notifications: vec![NotificationService::notification(
                    NotificationType::PaymentReleased,
                    plan.escrow.worker_id,
                    task_id,
                )],
                ..Default::default()
            })
            .await?;

        Ok(plan.escrow)
    }

    /// Readable by the task's poster and the worker holding the escrow.
    pub async fn get_escrow(&self, task_id: Uuid, actor: Uuid) -> Result<Escrow, ServiceError> {
        let escrow = self
            .db_client
            .get_escrow(task_id)
            .await?
            .ok_or(ServiceError::not_found("escrow", task_id))?;

        if actor != escrow.poster_id && actor != escrow.worker_id {
            return Err(ServiceError::unauthorized(actor, "view this escrow"));
        }

        Ok(escrow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::memory::MemoryStore, models::walletmodels::MAX_AMOUNT};
    use assert_matches::assert_matches;

    fn open_task() -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            poster_id: Uuid::new_v4(),
            category: TaskCategory::Plumbing,
            title: "Fix sink".to_string(),
            description: "Kitchen sink is leaking".to_string(),
            budget: 500,
            accepted_bid_amount: None,
            state: TaskState::Open,
            assigned_worker_id: None,
            worker_arrived: false,
            completion_requested: false,
            completion_photo_url: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn total_is_amount_plus_fee_for_every_policy() {
        for bps in [0u32, 1, 250, 300, 999, 1500, 10_000] {
            let policy = EscrowPolicy { fee_basis_points: bps, ..Default::default() };
            for amount in [1i64, 7, 450, 480, 10_001, 3_000_000_000] {
                let fee = policy.platform_fee(amount).unwrap();
                assert!(fee >= 0 && fee <= amount);
                assert_eq!(fee, amount * i64::from(bps) / 10_000);
            }
        }
    }

    #[tokio::test]
    async fn lock_records_total_and_status() {
        let service = EscrowService::new(Arc::new(MemoryStore::new()), EscrowPolicy::default());
        let task = open_task();
        let worker = Uuid::new_v4();

        let plan = service.plan_lock(&task, worker, 450).await.unwrap();

        assert_eq!(plan.escrow.amount, 450);
        assert_eq!(plan.escrow.platform_fee, 13);
        assert_eq!(plan.escrow.total, plan.escrow.amount + plan.escrow.platform_fee);
        assert_eq!(plan.escrow.status, EscrowStatus::Locked);
        assert_eq!(plan.escrow.worker_id, worker);
        assert!(plan.wallet_entries.is_empty());
    }

    #[tokio::test]
    async fn lock_refuses_amounts_outside_the_bounds() {
        let policy = EscrowPolicy { fee_basis_points: u32::MAX, ..Default::default() };
        let service = EscrowService::new(Arc::new(MemoryStore::new()), policy);
        let task = open_task();
        let worker = Uuid::new_v4();

        for amount in [0, -1, MAX_AMOUNT + 1, i64::MAX] {
            assert_matches!(
                service.plan_lock(&task, worker, amount).await,
                Err(ServiceError::InvalidAmount(a)) if a == amount
            );
        }

        let plan = service.plan_lock(&task, worker, MAX_AMOUNT).await.unwrap();
        assert_eq!(plan.escrow.total, MAX_AMOUNT + plan.escrow.platform_fee);
        assert!(plan.escrow.total > 0);
    }

    #[tokio::test]
    async fn prepaid_lock_requires_poster_funds() {
        let store = Arc::new(MemoryStore::new());
        let policy = EscrowPolicy { funding_model: FundingModel::Prepaid, ..Default::default() };
        let service = EscrowService::new(store.clone(), policy);
        let task = open_task();

        assert_matches!(
            service.plan_lock(&task, Uuid::new_v4(), 450).await,
            Err(ServiceError::InsufficientFunds { required: 463, available: 0 })
        );

        store
            .commit(ChangeSet {
                wallet_entries: vec![WalletEntry::credit(task.poster_id, TransactionType::Adjustment, 1_000, None, "top up")],
                ..Default::default()
            })
            .await
            .unwrap();

        let plan = service.plan_lock(&task, Uuid::new_v4(), 450).await.unwrap();
        assert_eq!(plan.wallet_entries.len(), 1);
        assert_eq!(plan.wallet_entries[0].amount, 463);
        assert_eq!(plan.wallet_entries[0].transaction_type, TransactionType::EscrowHold);
    }

    #[tokio::test]
    async fn release_requires_completed_task_and_locked_escrow() {
        let service = EscrowService::new(Arc::new(MemoryStore::new()), EscrowPolicy::default());
        let task = open_task();
        let worker = Uuid::new_v4();
        let locked = service.plan_lock(&task, worker, 450).await.unwrap().escrow;

        let in_progress = Task { state: TaskState::InProgress, assigned_worker_id: Some(worker), ..task.clone() };
        assert_matches!(service.plan_release(&in_progress, &locked), Err(ServiceError::InvalidState(_)));

        let completed = Task { state: TaskState::Completed, ..in_progress };
        let plan = service.plan_release(&completed, &locked).unwrap();
        assert_eq!(plan.escrow.status, EscrowStatus::Released);
        assert_eq!(plan.wallet_entries[0].user_id, worker);
        assert_eq!(plan.wallet_entries[0].amount, 450);
        assert_eq!(plan.wallet_entries[1].transaction_type, TransactionType::PlatformFee);
        assert_eq!(plan.wallet_entries[1].amount, 13);

        assert_matches!(service.plan_release(&completed, &plan.escrow), Err(ServiceError::InvalidState(_)));
        assert_matches!(service.plan_refund(&plan.escrow), Err(ServiceError::InvalidState(_)));
    }
}
