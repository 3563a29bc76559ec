// service/lifecycle.rs
//! Task state machine.
//!
//! `transition` decides whether an event is legal for a task and what the
//! task looks like afterwards. It never touches the store: the side effects
//! it asks for (escrow movements, bid rejections, notifications) are realized
//! and committed by `service::aggregate`.
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    models::{
        notificationmodel::NotificationType,
        taskmodel::{Bid, BidStatus, Task, TaskState},
    },
    service::error::ServiceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Refuse to cancel an in-progress task once the worker has arrived and
    /// asked for completion.
    pub block_cancel_during_handoff: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self { block_cancel_during_handoff: true }
    }
}

/// Who is driving a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(Uuid),
    /// Background jobs.
    System,
}

#[derive(Debug, Clone)]
pub enum TaskEvent {
    AcceptBid { actor: Uuid, bid: Bid },
    MarkArrived { actor: Uuid },
    RequestCompletion { actor: Uuid, photo_url: String },
    ConfirmCompletion { actor: Uuid },
    Cancel { actor: Actor },
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::AcceptBid { .. } => "accept_bid",
            TaskEvent::MarkArrived { .. } => "mark_arrived",
            TaskEvent::RequestCompletion { .. } => "request_completion",
            TaskEvent::ConfirmCompletion { .. } => "confirm_completion",
            TaskEvent::Cancel { .. } => "cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AcceptBid { bid_id: Uuid },
    RejectPendingBids { except: Option<Uuid> },
    LockEscrow { worker_id: Uuid, amount: i64 },
    ReleaseEscrow,
    RefundEscrow,
    Notify {
        notification_type: NotificationType,
        recipient: Uuid,
        related_entity_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub task: Task,
    pub effects: Vec<Effect>,
}

pub fn transition(
    task: &Task,
    event: TaskEvent,
    policy: &LifecyclePolicy,
    now: DateTime<Utc>,
) -> Result<Transition, ServiceError> {
    let mut next = task.clone();
    next.updated_at = now;

    let effects = match event {
        TaskEvent::AcceptBid { actor, bid } => {
            if actor != task.poster_id {
                return Err(ServiceError::unauthorized(actor, "accept bids on this task"));
            }
            require_state(task, TaskState::Open, "accept a bid")?;
            if bid.task_id != task.id {
                return Err(ServiceError::not_found("bid", bid.id));
            }
            if bid.status != BidStatus::Pending {
                return Err(ServiceError::invalid_state(format!(
                    "bid {} is {:?}, not pending",
                    bid.id, bid.status
                )));
            }

            next.state = TaskState::InProgress;
            next.assigned_worker_id = Some(bid.worker_id);
            next.accepted_bid_amount = Some(bid.amount);

            vec![
                Effect::AcceptBid { bid_id: bid.id },
                Effect::RejectPendingBids { except: Some(bid.id) },
                Effect::LockEscrow { worker_id: bid.worker_id, amount: bid.amount },
                Effect::Notify {
                    notification_type: NotificationType::BidAccepted,
                    recipient: bid.worker_id,
                    related_entity_id: task.id,
                },
            ]
        }

        TaskEvent::MarkArrived { actor } => {
            require_state(task, TaskState::InProgress, "mark arrival")?;
            require_assigned_worker(task, actor, "mark arrival on this task")?;
            if task.worker_arrived {
                return Err(ServiceError::invalid_state(format!(
                    "arrival already recorded for task {}",
                    task.id
                )));
            }

            next.worker_arrived = true;

            vec![Effect::Notify {
                notification_type: NotificationType::WorkerArrived,
                recipient: task.poster_id,
                related_entity_id: task.id,
            }]
        }

        TaskEvent::RequestCompletion { actor, photo_url } => {
            require_state(task, TaskState::InProgress, "request completion")?;
            require_assigned_worker(task, actor, "request completion of this task")?;
            if !task.worker_arrived {
                return Err(ServiceError::invalid_state(format!(
                    "worker has not arrived for task {}",
                    task.id
                )));
            }
            if task.completion_requested {
                return Err(ServiceError::invalid_state(format!(
                    "completion already requested for task {}",
                    task.id
                )));
            }

            next.completion_requested = true;
            next.completion_photo_url = Some(photo_url);

            vec![Effect::Notify {
                notification_type: NotificationType::CompletionRequested,
                recipient: task.poster_id,
                related_entity_id: task.id,
            }]
        }

        TaskEvent::ConfirmCompletion { actor } => {
            if actor != task.poster_id {
                return Err(ServiceError::unauthorized(actor, "confirm completion of this task"));
            }
            require_state(task, TaskState::InProgress, "confirm completion")?;
            if !task.completion_requested {
                return Err(ServiceError::invalid_state(format!(
                    "completion has not been requested for task {}",
                    task.id
                )));
            }
            let worker_id = assigned_worker(task)?;

            next.state = TaskState::Completed;

            vec![
                Effect::ReleaseEscrow,
                Effect::Notify {
                    notification_type: NotificationType::TaskCompleted,
                    recipient: worker_id,
                    related_entity_id: task.id,
                },
                Effect::Notify {
                    notification_type: NotificationType::PaymentReleased,
                    recipient: worker_id,
                    related_entity_id: task.id,
                },
            ]
        }

        TaskEvent::Cancel { actor } => {
            if let Actor::User(user_id) = actor {
                if user_id != task.poster_id {
                    return Err(ServiceError::unauthorized(user_id, "cancel this task"));
                }
            }

            match task.state {
                TaskState::Open => {
                    next.state = TaskState::Cancelled;
                    vec![Effect::RejectPendingBids { except: None }]
                }
                TaskState::InProgress => {
                    if policy.block_cancel_during_handoff && task.worker_arrived && task.completion_requested {
                        return Err(ServiceError::invalid_state(format!(
                            "task {} is awaiting completion confirmation and cannot be cancelled",
                            task.id
                        )));
                    }
                    let worker_id = assigned_worker(task)?;

                    next.state = TaskState::Cancelled;
                    next.assigned_worker_id = None;

                    vec![
                        Effect::RefundEscrow,
                        Effect::Notify {
                            notification_type: NotificationType::TaskCancelled,
                            recipient: worker_id,
                            related_entity_id: task.id,
                        },
                    ]
                }
                TaskState::Completed | TaskState::Cancelled => {
                    return Err(ServiceError::invalid_state(format!(
                        "task {} is already {}",
                        task.id,
                        task.state.to_str()
                    )));
                }
            }
        }
    };

    Ok(Transition { task: next, effects })
}

fn require_state(task: &Task, expected: TaskState, action: &str) -> Result<(), ServiceError> {
    if task.state == expected {
        Ok(())
    } else {
        Err(ServiceError::invalid_state(format!(
            "cannot {} on task {}: task is {}, expected {}",
            action,
            task.id,
            task.state.to_str(),
            expected.to_str()
        )))
    }
}

fn require_assigned_worker(task: &Task, actor: Uuid, action: &'static str) -> Result<(), ServiceError> {
    if task.assigned_worker_id == Some(actor) {
        Ok(())
    } else {
        Err(ServiceError::unauthorized(actor, action))
    }
}

fn assigned_worker(task: &Task) -> Result<Uuid, ServiceError> {
    task.assigned_worker_id.ok_or_else(|| {
        ServiceError::invalid_state(format!("task {} has no assigned worker", task.id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::taskmodel::TaskCategory;
    use assert_matches::assert_matches;

    fn task(state: TaskState) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            poster_id: Uuid::new_v4(),
            category: TaskCategory::Cleaning,
            title: "Deep clean".to_string(),
            description: "Two bedroom flat".to_string(),
            budget: 500,
            accepted_bid_amount: None,
            state,
            assigned_worker_id: None,
            worker_arrived: false,
            completion_requested: false,
            completion_photo_url: None,
            version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    fn in_progress() -> (Task, Uuid) {
        let worker = Uuid::new_v4();
        let task = Task {
            assigned_worker_id: Some(worker),
            accepted_bid_amount: Some(450),
            ..task(TaskState::InProgress)
        };
        (task, worker)
    }

    fn bid_on(task: &Task, status: BidStatus) -> Bid {
        let now = Utc::now();
        Bid {
            id: Uuid::new_v4(),
            task_id: task.id,
            worker_id: Uuid::new_v4(),
            amount: 450,
            message: "Can do it today".to_string(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(task: &Task, event: TaskEvent) -> Result<Transition, ServiceError> {
        transition(task, event, &LifecyclePolicy::default(), Utc::now())
    }

    #[test]
    fn accepting_a_bid_assigns_the_worker_and_locks_escrow() {
        let open = task(TaskState::Open);
        let bid = bid_on(&open, BidStatus::Pending);

        let result = apply(&open, TaskEvent::AcceptBid { actor: open.poster_id, bid: bid.clone() }).unwrap();

        assert_eq!(result.task.state, TaskState::InProgress);
        assert_eq!(result.task.assigned_worker_id, Some(bid.worker_id));
        assert_eq!(result.task.accepted_bid_amount, Some(450));
        assert_eq!(result.task.version, open.version);
        assert!(result.effects.contains(&Effect::RejectPendingBids { except: Some(bid.id) }));
        assert!(result.effects.contains(&Effect::LockEscrow { worker_id: bid.worker_id, amount: 450 }));
    }

    #[test]
    fn only_the_poster_can_accept_and_only_while_open() {
        let open = task(TaskState::Open);
        let bid = bid_on(&open, BidStatus::Pending);
        let stranger = Uuid::new_v4();

        assert_matches!(
            apply(&open, TaskEvent::AcceptBid { actor: stranger, bid: bid.clone() }),
            Err(ServiceError::Unauthorized { actor, .. }) if actor == stranger
        );

        let (busy, _) = in_progress();
        let late_bid = bid_on(&busy, BidStatus::Pending);
        assert_matches!(
            apply(&busy, TaskEvent::AcceptBid { actor: busy.poster_id, bid: late_bid }),
            Err(ServiceError::InvalidState(_))
        );

        let rejected = bid_on(&open, BidStatus::Rejected);
        assert_matches!(
            apply(&open, TaskEvent::AcceptBid { actor: open.poster_id, bid: rejected }),
            Err(ServiceError::InvalidState(_))
        );
    }

    #[test]
    fn completion_requires_arrival_first() {
        let (task, worker) = in_progress();

        assert_matches!(
            apply(&task, TaskEvent::RequestCompletion { actor: worker, photo_url: "p.jpg".into() }),
            Err(ServiceError::InvalidState(_))
        );

        let arrived = apply(&task, TaskEvent::MarkArrived { actor: worker }).unwrap().task;
        assert!(arrived.worker_arrived);
        assert_matches!(
            apply(&arrived, TaskEvent::MarkArrived { actor: worker }),
            Err(ServiceError::InvalidState(_))
        );

        let requested = apply(&arrived, TaskEvent::RequestCompletion { actor: worker, photo_url: "p.jpg".into() })
            .unwrap()
            .task;
        assert!(requested.completion_requested);
        assert_eq!(requested.completion_photo_url.as_deref(), Some("p.jpg"));
        assert_matches!(
            apply(&requested, TaskEvent::RequestCompletion { actor: worker, photo_url: "q.jpg".into() }),
            Err(ServiceError::InvalidState(_))
        );
    }

    #[test]
    fn worker_signals_come_from_the_assigned_worker_only() {
        let (task, _) = in_progress();
        let other_worker = Uuid::new_v4();

        assert_matches!(
            apply(&task, TaskEvent::MarkArrived { actor: other_worker }),
            Err(ServiceError::Unauthorized { .. })
        );

        let open = self::task(TaskState::Open);
        assert_matches!(
            apply(&open, TaskEvent::MarkArrived { actor: other_worker }),
            Err(ServiceError::InvalidState(_))
        );
    }

    #[test]
    fn confirm_completes_and_releases() {
        let (task, worker) = in_progress();
        let ready = Task { worker_arrived: true, completion_requested: true, ..task };

        assert_matches!(
            apply(&ready, TaskEvent::ConfirmCompletion { actor: worker }),
            Err(ServiceError::Unauthorized { .. })
        );

        let result = apply(&ready, TaskEvent::ConfirmCompletion { actor: ready.poster_id }).unwrap();
        assert_eq!(result.task.state, TaskState::Completed);
        assert_eq!(result.effects[0], Effect::ReleaseEscrow);

        assert_matches!(
            apply(&result.task, TaskEvent::ConfirmCompletion { actor: ready.poster_id }),
            Err(ServiceError::InvalidState(_))
        );
    }

    #[test]
    fn cancelling_open_task_rejects_pending_bids() {
        let open = task(TaskState::Open);

        let result = apply(&open, TaskEvent::Cancel { actor: Actor::User(open.poster_id) }).unwrap();
        assert_eq!(result.task.state, TaskState::Cancelled);
        assert_eq!(result.effects, vec![Effect::RejectPendingBids { except: None }]);

        let by_system = apply(&open, TaskEvent::Cancel { actor: Actor::System }).unwrap();
        assert_eq!(by_system.task.state, TaskState::Cancelled);

        assert_matches!(
            apply(&result.task, TaskEvent::Cancel { actor: Actor::System }),
            Err(ServiceError::InvalidState(_))
        );
    }

    #[test]
    fn cancelling_in_progress_task_refunds_and_clears_the_worker() {
        let (task, worker) = in_progress();

        assert_matches!(
            apply(&task, TaskEvent::Cancel { actor: Actor::User(worker) }),
            Err(ServiceError::Unauthorized { .. })
        );

        let result = apply(&task, TaskEvent::Cancel { actor: Actor::User(task.poster_id) }).unwrap();
        assert_eq!(result.task.state, TaskState::Cancelled);
        assert_eq!(result.task.assigned_worker_id, None);
        assert_eq!(result.effects[0], Effect::RefundEscrow);
        assert_matches!(
            &result.effects[1],
            Effect::Notify { notification_type: NotificationType::TaskCancelled, recipient, .. } if *recipient == worker
        );
    }

    #[test]
    fn handoff_cancel_is_blocked_only_when_the_policy_says_so() {
        let (task, _) = in_progress();
        let handoff = Task { worker_arrived: true, completion_requested: true, ..task };
        let cancel = TaskEvent::Cancel { actor: Actor::User(handoff.poster_id) };

        assert_matches!(apply(&handoff, cancel.clone()), Err(ServiceError::InvalidState(_)));

        let lenient = LifecyclePolicy { block_cancel_during_handoff: false };
        let result = transition(&handoff, cancel, &lenient, Utc::now()).unwrap();
        assert_eq!(result.task.state, TaskState::Cancelled);
    }
}
