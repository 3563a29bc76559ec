// service/bid_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::marketdb::{ChangeSet, MarketExt},
    models::{
        notificationmodel::NotificationType,
        taskmodel::*,
        usermodel::UserRole,
    },
    service::{
        aggregate,
        error::ServiceError,
        escrow_service::EscrowService,
        lifecycle::{self, LifecyclePolicy, TaskEvent},
        notification_service::NotificationService,
    },
};

#[derive(Debug, Clone)]
pub struct BidService {
    db_client: Arc<dyn MarketExt>,
    escrow_service: EscrowService,
    policy: LifecyclePolicy,
}

impl BidService {
    pub fn new(db_client: Arc<dyn MarketExt>, escrow_service: EscrowService, policy: LifecyclePolicy) -> Self {
        Self { db_client, escrow_service, policy }
    }

    pub async fn place_bid(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        amount: i64,
        message: String,
    ) -> Result<Bid, ServiceError> {
        let aggregate = aggregate::load(self.db_client.as_ref(), task_id).await?;
        let worker = self
            .db_client
            .get_user(worker_id)
            .await?
            .ok_or(ServiceError::not_found("user", worker_id))?;

        if worker.role != UserRole::Worker || worker_id == aggregate.task.poster_id {
            return Err(ServiceError::unauthorized(worker_id, "bid on this task"));
        }

        ServiceError::check_amount(amount)?;

        if aggregate.task.state != TaskState::Open {
            return Err(ServiceError::invalid_state(format!(
                "task {} is {} and no longer accepts bids",
                task_id,
                aggregate.task.state.to_str()
            )));
        }

        if aggregate
            .bids
            .iter()
            .any(|bid| bid.worker_id == worker_id && bid.is_active())
        {
            return Err(ServiceError::DuplicateBid { task_id, worker_id });
        }

        let now = Utc::now();
        let bid = Bid {
            id: Uuid::new_v4(),
            task_id,
            worker_id,
            amount,
            message,
            status: BidStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let (_, task_write) = aggregate::touch(&aggregate.task, now);

        self.db_client
            .commit(ChangeSet {
                task: Some(task_write),
                bids: vec![bid.clone()],
                notifications: vec![NotificationService::notification(
                    NotificationType::NewBid,
                    aggregate.task.poster_id,
                    bid.id,
                )],
                ..Default::default()
            })
            .await?;

        tracing::info!("Worker {} bid {} on task {}", worker_id, amount, task_id);
        Ok(bid)
    }

    /// Accepts one bid, rejects the other pending bids and locks escrow, all
    /// in one commit.
    pub async fn accept_bid(&self, task_id: Uuid, bid_id: Uuid, poster_id: Uuid) -> Result<TaskAggregate, ServiceError> {
        let aggregate = aggregate::load(self.db_client.as_ref(), task_id).await?;
        let bid = aggregate
            .bid(bid_id)
            .cloned()
            .ok_or(ServiceError::not_found("bid", bid_id))?;

        let transition = lifecycle::transition(
            &aggregate.task,
            TaskEvent::AcceptBid { actor: poster_id, bid },
            &self.policy,
            Utc::now(),
        )?;

        aggregate::commit_transition(self.db_client.as_ref(), &self.escrow_service, &aggregate, transition).await
    }

    pub async fn reject_bid(&self, task_id: Uuid, bid_id: Uuid, poster_id: Uuid) -> Result<Bid, ServiceError> {
        let aggregate = aggregate::load(self.db_client.as_ref(), task_id).await?;
        let bid = aggregate
            .bid(bid_id)
            .ok_or(ServiceError::not_found("bid", bid_id))?;

        if poster_id != aggregate.task.poster_id {
            return Err(ServiceError::unauthorized(poster_id, "reject bids on this task"));
        }

        self.close_bid(&aggregate, bid, true).await
    }

    /// A withdrawn bid is stored as rejected, which lets the worker bid again.
    pub async fn withdraw_bid(&self, task_id: Uuid, bid_id: Uuid, worker_id: Uuid) -> Result<Bid, ServiceError> {
        let aggregate = aggregate::load(self.db_client.as_ref(), task_id).await?;
        let bid = aggregate
            .bid(bid_id)
            .ok_or(ServiceError::not_found("bid", bid_id))?;

        if worker_id != bid.worker_id {
            return Err(ServiceError::unauthorized(worker_id, "withdraw this bid"));
        }

        self.close_bid(&aggregate, bid, false).await
    }

    /// The poster sees every bid; anyone else only their own.
    pub async fn list_bids(&self, task_id: Uuid, actor: Uuid) -> Result<Vec<Bid>, ServiceError> {
        let aggregate = aggregate::load(self.db_client.as_ref(), task_id).await?;

        if actor == aggregate.task.poster_id {
            return Ok(aggregate.bids);
        }

        Ok(aggregate
            .bids
            .into_iter()
            .filter(|bid| bid.worker_id == actor)
            .collect())
    }

    async fn close_bid(
        &self,
        aggregate: &TaskAggregate,
        bid: &Bid,
        notify_worker: bool,
    ) -> Result<Bid, ServiceError> {
        if aggregate.task.state != TaskState::Open {
            return Err(ServiceError::invalid_state(format!(
                "task {} is {}",
                aggregate.task.id,
                aggregate.task.state.to_str()
            )));
        }

        if bid.status != BidStatus::Pending {
            return Err(ServiceError::invalid_state(format!(
                "bid {} is {:?}, not pending",
                bid.id, bid.status
            )));
        }

        let now = Utc::now();
        let closed = Bid {
            status: BidStatus::Rejected,
            updated_at: now,
            ..bid.clone()
        };
        let (_, task_write) = aggregate::touch(&aggregate.task, now);

        let mut notifications = Vec::new();
        if notify_worker {
            notifications.push(NotificationService::notification(
                NotificationType::BidRejected,
                closed.worker_id,
                closed.id,
            ));
        }

        self.db_client
            .commit(ChangeSet {
                task: Some(task_write),
                bids: vec![closed.clone()],
                notifications,
                ..Default::default()
            })
            .await?;

        tracing::info!("Bid {} on task {} closed", closed.id, closed.task_id);
        Ok(closed)
    }
}
