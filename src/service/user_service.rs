// service/user_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::marketdb::{ChangeSet, MarketExt, Write},
    models::{
        taskmodel::WorkerProfile,
        usermodel::{User, UserRole},
    },
    service::error::ServiceError,
};

#[derive(Debug, Clone)]
pub struct UserService {
    db_client: Arc<dyn MarketExt>,
}

impl UserService {
    pub fn new(db_client: Arc<dyn MarketExt>) -> Self {
        Self { db_client }
    }

    /// Creates or refreshes the local record for an identity issued by the
    /// auth provider. The role cannot change after the first registration.
    pub async fn register(
        &self,
        user_id: Uuid,
        role: UserRole,
        name: String,
        email: String,
    ) -> Result<User, ServiceError> {
        let now = Utc::now();

        let (user, worker_profile) = match self.db_client.get_user(user_id).await? {
            Some(existing) => {
                if existing.role != role {
                    return Err(ServiceError::invalid_state(format!(
                        "user {} is already registered as {}",
                        user_id,
                        existing.role.to_str()
                    )));
                }
                (User { name, email, updated_at: now, ..existing }, None)
            }
            None => {
                let user = User {
                    id: user_id,
                    name,
                    email,
                    role,
                    created_at: now,
                    updated_at: now,
                };
                let profile = match role {
                    UserRole::Worker if self.db_client.get_worker_profile(user_id).await?.is_none() => {
                        Some(Write::Insert(WorkerProfile::new(user_id)))
                    }
                    _ => None,
                };
                tracing::info!("Registered {} {}", role.to_str(), user_id);
                (user, profile)
            }
        };

        self.db_client
            .commit(ChangeSet {
                users: vec![user.clone()],
                worker_profile,
                ..Default::default()
            })
            .await?;

        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.db_client
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::not_found("user", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn worker_registration_creates_an_empty_profile() {
        let store = Arc::new(MemoryStore::new());
        let service = UserService::new(store.clone());
        let worker = Uuid::new_v4();

        service
            .register(worker, UserRole::Worker, "Ada".into(), "ada@example.com".into())
            .await
            .unwrap();

        let profile = store.get_worker_profile(worker).await.unwrap().unwrap();
        assert_eq!(profile.total_reviews, 0);
        assert!(profile.category_ratings.is_empty());
    }

    #[tokio::test]
    async fn re_registration_keeps_the_role() {
        let service = UserService::new(Arc::new(MemoryStore::new()));
        let user = Uuid::new_v4();

        service.register(user, UserRole::User, "Bo".into(), "bo@example.com".into()).await.unwrap();
        let renamed = service
            .register(user, UserRole::User, "Bo Li".into(), "bo@example.com".into())
            .await
            .unwrap();
        assert_eq!(renamed.name, "Bo Li");

        assert_matches!(
            service.register(user, UserRole::Worker, "Bo".into(), "bo@example.com".into()).await,
            Err(ServiceError::InvalidState(_))
        );
        assert_eq!(service.get_user(user).await.unwrap().role, UserRole::User);
    }
}
