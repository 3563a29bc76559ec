// service/notification_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::marketdb::{ChangeSet, MarketExt},
    models::notificationmodel::{Notification, NotificationType},
    service::error::ServiceError,
};

#[derive(Debug, Clone)]
pub struct NotificationService {
    db_client: Arc<dyn MarketExt>,
}

impl NotificationService {
    pub fn new(db_client: Arc<dyn MarketExt>) -> Self {
        Self { db_client }
    }

    /// Builds an unread notification record. Engine operations add these to
    /// their own change set so they are stored only if the operation commits.
    pub fn notification(
        notification_type: NotificationType,
        recipient_user_id: Uuid,
        related_entity_id: Uuid,
    ) -> Notification {
        tracing::info!(
            "Notification {} for user {} about {}",
            notification_type.to_str(),
            recipient_user_id,
            related_entity_id
        );

        Notification {
            id: Uuid::new_v4(),
            recipient_user_id,
            notification_type,
            related_entity_id,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    /// Stores a standalone notification.
    pub async fn emit(
        &self,
        notification_type: NotificationType,
        recipient_user_id: Uuid,
        related_entity_id: Uuid,
    ) -> Result<Notification, ServiceError> {
        let notification = Self::notification(notification_type, recipient_user_id, related_entity_id);

        self.db_client
            .commit(ChangeSet {
                notifications: vec![notification.clone()],
                ..Default::default()
            })
            .await?;

        Ok(notification)
    }

    pub async fn get_user_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, ServiceError> {
        Ok(self.db_client.get_user_notifications(user_id, unread_only).await?)
    }

    pub async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<Notification, ServiceError> {
        self.db_client
            .mark_notification_read(notification_id, user_id)
            .await?
            .ok_or(ServiceError::not_found("notification", notification_id))
    }

    pub async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let updated = self.db_client.mark_all_notifications_read(user_id).await?;
        tracing::debug!("Marked {} notifications read for user {}", updated, user_id);
        Ok(updated)
    }

    pub async fn delete_notification(&self, notification_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        if self.db_client.delete_notification(notification_id, user_id).await? {
            Ok(())
        } else {
            Err(ServiceError::not_found("notification", notification_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn read_flags_are_idempotent_and_scoped_to_the_recipient() {
        let service = NotificationService::new(Arc::new(MemoryStore::new()));
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        let first = service.emit(NotificationType::NewBid, user, Uuid::new_v4()).await.unwrap();
        service.emit(NotificationType::WorkerArrived, user, Uuid::new_v4()).await.unwrap();
        assert!(!first.is_read);

        assert_matches!(
            service.mark_notification_read(first.id, other).await,
            Err(ServiceError::NotFound { entity: "notification", .. })
        );

        let read = service.mark_notification_read(first.id, user).await.unwrap();
        assert!(read.is_read);
        let again = service.mark_notification_read(first.id, user).await.unwrap();
        assert!(again.is_read);

        assert_eq!(service.get_user_notifications(user, true).await.unwrap().len(), 1);
        assert_eq!(service.mark_all_notifications_read(user).await.unwrap(), 1);
        assert_eq!(service.mark_all_notifications_read(user).await.unwrap(), 0);
        assert!(service.get_user_notifications(user, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recipient_can_delete_a_notification_once() {
        let service = NotificationService::new(Arc::new(MemoryStore::new()));
        let user = Uuid::new_v4();
        let notification = service.emit(NotificationType::TaskCompleted, user, Uuid::new_v4()).await.unwrap();

        service.delete_notification(notification.id, user).await.unwrap();
        assert_matches!(
            service.delete_notification(notification.id, user).await,
            Err(ServiceError::NotFound { .. })
        );
        assert!(service.get_user_notifications(user, false).await.unwrap().is_empty());
    }
}
