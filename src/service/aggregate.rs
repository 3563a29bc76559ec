// service/aggregate.rs
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::marketdb::{ChangeSet, MarketExt, Write},
    models::{
        notificationmodel::NotificationType,
        taskmodel::{BidStatus, EscrowStatus, Task, TaskAggregate},
    },
    service::{
        error::ServiceError,
        escrow_service::EscrowService,
        lifecycle::{Effect, Transition},
        notification_service::NotificationService,
    },
};

pub(crate) async fn load(db_client: &dyn MarketExt, task_id: Uuid) -> Result<TaskAggregate, ServiceError> {
    db_client
        .get_task_aggregate(task_id)
        .await?
        .ok_or(ServiceError::not_found("task", task_id))
}

/// Task write that bumps the version the aggregate was read at.
pub(crate) fn touch(task: &Task, now: DateTime<Utc>) -> (Task, Write<Task>) {
    let record = Task {
        version: task.version + 1,
        updated_at: now,
        ..task.clone()
    };
    let write = Write::Update { record: record.clone(), expected_version: task.version };
    (record, write)
}

/// Turns the effects of a lifecycle transition into one change set and
/// commits it. Returns the aggregate as stored.
pub(crate) async fn commit_transition(
    db_client: &dyn MarketExt,
    escrow_service: &EscrowService,
    aggregate: &TaskAggregate,
    transition: Transition,
) -> Result<TaskAggregate, ServiceError> {
    let now = transition.task.updated_at;
    let mut task = transition.task;
    task.version = aggregate.task.version + 1;

    let mut bids = aggregate.bids.clone();
    let mut touched_bids: Vec<Uuid> = Vec::new();
    let mut escrow = aggregate.escrow.clone();
    let mut escrow_changed = false;
    let mut changes = ChangeSet::default();

    for effect in transition.effects {
        match effect {
            Effect::AcceptBid { bid_id } => {
                let bid = bids
                    .iter_mut()
                    .find(|bid| bid.id == bid_id)
                    .ok_or(ServiceError::not_found("bid", bid_id))?;
                bid.status = BidStatus::Accepted;
                bid.updated_at = now;
                touched_bids.push(bid_id);
            }

            Effect::RejectPendingBids { except } => {
                for bid in bids
                    .iter_mut()
                    .filter(|bid| bid.status == BidStatus::Pending && Some(bid.id) != except)
                {
                    bid.status = BidStatus::Rejected;
                    bid.updated_at = now;
                    touched_bids.push(bid.id);
                    changes.notifications.push(NotificationService::notification(
                        NotificationType::BidRejected,
                        bid.worker_id,
                        bid.id,
                    ));
                }
            }

            Effect::LockEscrow { worker_id, amount } => {
                if escrow.is_some() {
                    return Err(ServiceError::invalid_state(format!(
                        "task {} already has an escrow",
                        task.id
                    )));
                }
                let plan = escrow_service.plan_lock(&task, worker_id, amount).await?;
                changes.wallet_entries.extend(plan.wallet_entries);
                escrow = Some(plan.escrow);
                escrow_changed = true;
            }

            Effect::ReleaseEscrow => {
                let current = escrow
                    .as_ref()
                    .ok_or(ServiceError::not_found("escrow", task.id))?;
                let plan = escrow_service.plan_release(&task, current)?;
                changes.wallet_entries.extend(plan.wallet_entries);
                escrow = Some(plan.escrow);
                escrow_changed = true;
            }

            Effect::RefundEscrow => {
                let locked = escrow
                    .as_ref()
                    .filter(|current| current.status == EscrowStatus::Locked)
                    .cloned();
                match locked {
                    Some(current) => {
                        let plan = escrow_service.plan_refund(&current)?;
                        changes.wallet_entries.extend(plan.wallet_entries);
                        escrow = Some(plan.escrow);
                        escrow_changed = true;
                    }
                    None => tracing::warn!("Task {} cancelled without a locked escrow", task.id),
                }
            }

            Effect::Notify { notification_type, recipient, related_entity_id } => {
                changes.notifications.push(NotificationService::notification(
                    notification_type,
                    recipient,
                    related_entity_id,
                ));
            }
        }
    }

    changes.bids = bids
        .iter()
        .filter(|bid| touched_bids.contains(&bid.id))
        .cloned()
        .collect();
    if escrow_changed {
        changes.escrow = escrow.clone();
    }
    changes.task = Some(Write::Update { record: task.clone(), expected_version: aggregate.task.version });

    db_client.commit(changes).await?;

    tracing::info!(
        "Task {} moved {} -> {} (version {})",
        task.id,
        aggregate.task.state.to_str(),
        task.state.to_str(),
        task.version
    );

    Ok(TaskAggregate { task, bids, escrow })
}
