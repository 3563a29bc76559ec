// service/task_service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::marketdb::{ChangeSet, MarketExt, TaskFilter, Write},
    models::{taskmodel::*, usermodel::UserRole},
    service::{
        aggregate,
        error::ServiceError,
        escrow_service::EscrowService,
        lifecycle::{self, Actor, LifecyclePolicy, TaskEvent},
    },
};

#[derive(Debug, Clone)]
pub struct TaskService {
    db_client: Arc<dyn MarketExt>,
    escrow_service: EscrowService,
    policy: LifecyclePolicy,
}

impl TaskService {
    pub fn new(db_client: Arc<dyn MarketExt>, escrow_service: EscrowService, policy: LifecyclePolicy) -> Self {
        Self { db_client, escrow_service, policy }
    }

    pub async fn create_task(
        &self,
        poster_id: Uuid,
        category: TaskCategory,
        title: String,
        description: String,
        budget: i64,
    ) -> Result<Task, ServiceError> {
        let poster = self
            .db_client
            .get_user(poster_id)
            .await?
            .ok_or(ServiceError::not_found("user", poster_id))?;

        if poster.role != UserRole::User {
            return Err(ServiceError::unauthorized(poster_id, "post tasks"));
        }

        ServiceError::check_amount(budget)?;

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            poster_id,
            category,
            title,
            description,
            budget,
            accepted_bid_amount: None,
            state: TaskState::Open,
            assigned_worker_id: None,
            worker_arrived: false,
            completion_requested: false,
            completion_photo_url: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.db_client
            .commit(ChangeSet {
                task: Some(Write::Insert(task.clone())),
                ..Default::default()
            })
            .await?;

        tracing::info!("Task {} created by {} in {}", task.id, poster_id, category.to_str());
        Ok(task)
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Task, ServiceError> {
        self.db_client
            .get_task(task_id)
            .await?
            .ok_or(ServiceError::not_found("task", task_id))
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, ServiceError> {
        Ok(self.db_client.list_tasks(filter).await?)
    }

    pub async fn mark_worker_arrived(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, ServiceError> {
        self.apply(task_id, TaskEvent::MarkArrived { actor: worker_id }).await
    }

    pub async fn request_completion(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        photo_url: String,
    ) -> Result<Task, ServiceError> {
        self.apply(task_id, TaskEvent::RequestCompletion { actor: worker_id, photo_url })
            .await
    }

    /// Completes the task and releases its escrow in one commit.
    pub async fn confirm_completion(&self, task_id: Uuid, poster_id: Uuid) -> Result<Task, ServiceError> {
        self.apply(task_id, TaskEvent::ConfirmCompletion { actor: poster_id })
            .await
    }

    pub async fn cancel_task(&self, task_id: Uuid, actor: Actor) -> Result<Task, ServiceError> {
        self.apply(task_id, TaskEvent::Cancel { actor }).await
    }

    /// Cancels OPEN tasks created before `older_than`. Tasks that change
    /// under the job are skipped and picked up on the next run.
    pub async fn expire_stale_tasks(&self, older_than: DateTime<Utc>) -> Result<Vec<Task>, ServiceError> {
        let stale = self
            .db_client
            .list_tasks(&TaskFilter {
                state: Some(TaskState::Open),
                created_before: Some(older_than),
                ..Default::default()
            })
            .await?;

        let mut expired = Vec::with_capacity(stale.len());
        for task in stale {
            match self.cancel_task(task.id, Actor::System).await {
                Ok(task) => expired.push(task),
                Err(err @ ServiceError::Database(_)) => return Err(err),
                Err(err) => tracing::warn!("Skipping expiry of task {}: {}", task.id, err),
            }
        }

        if !expired.is_empty() {
            tracing::info!("Expired {} stale open tasks", expired.len());
        }
        Ok(expired)
    }

    async fn apply(&self, task_id: Uuid, event: TaskEvent) -> Result<Task, ServiceError> {
        let aggregate = aggregate::load(self.db_client.as_ref(), task_id).await?;
        let event_name = event.name();

        let transition = lifecycle::transition(&aggregate.task, event, &self.policy, Utc::now())
            .map_err(|err| {
                tracing::debug!("Rejected {} on task {}: {}", event_name, task_id, err);
                err
            })?;

        let stored =
            aggregate::commit_transition(self.db_client.as_ref(), &self.escrow_service, &aggregate, transition)
                .await?;

        Ok(stored.task)
    }
}
