// service/rating_service.rs
use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::marketdb::{ChangeSet, MarketExt, Write},
    models::{notificationmodel::NotificationType, taskmodel::*},
    service::{error::ServiceError, notification_service::NotificationService},
};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Debug, Clone)]
pub struct RatingService {
    db_client: Arc<dyn MarketExt>,
}

impl RatingService {
    pub fn new(db_client: Arc<dyn MarketExt>) -> Self {
        Self { db_client }
    }

    pub async fn submit_review(
        &self,
        task_id: Uuid,
        poster_id: Uuid,
        worker_id: Uuid,
        star_rating: i32,
        category_ratings: BTreeMap<String, i32>,
        text: String,
    ) -> Result<Review, ServiceError> {
        let task = self
            .db_client
            .get_task(task_id)
            .await?
            .ok_or(ServiceError::not_found("task", task_id))?;

        if poster_id != task.poster_id || task.assigned_worker_id != Some(worker_id) {
            return Err(ServiceError::unauthorized(poster_id, "review this worker for this task"));
        }

        if task.state != TaskState::Completed {
            return Err(ServiceError::invalid_state(format!(
                "task {} is {}, only completed tasks can be reviewed",
                task_id,
                task.state.to_str()
            )));
        }

        if self.db_client.get_review(task_id, worker_id).await?.is_some() {
            return Err(ServiceError::DuplicateReview { task_id, worker_id });
        }

        validate_rating(star_rating)?;
        for rating in category_ratings.values() {
            validate_rating(*rating)?;
        }

        let now = Utc::now();
        let review = Review {
            id: Uuid::new_v4(),
            task_id,
            worker_id,
            poster_id,
            star_rating,
            category_ratings,
            text,
            created_at: now,
        };

        let profile_write = match self.db_client.get_worker_profile(worker_id).await? {
            Some(current) => Write::Update {
                record: fold_review(&current, task.category, star_rating, now),
                expected_version: current.version,
            },
            None => Write::Insert(fold_review(&WorkerProfile::new(worker_id), task.category, star_rating, now)),
        };

        self.db_client
            .commit(ChangeSet {
                review: Some(review.clone()),
                worker_profile: Some(profile_write),
                notifications: vec![NotificationService::notification(
                    NotificationType::ReviewReceived,
                    worker_id,
                    review.id,
                )],
                ..Default::default()
            })
            .await?;

        tracing::info!("Worker {} received {} stars for task {}", worker_id, star_rating, task_id);
        Ok(review)
    }

    /// Workers that have never been reviewed get an empty profile.
    pub async fn get_worker_profile(&self, worker_id: Uuid) -> Result<WorkerProfile, ServiceError> {
        match self.db_client.get_worker_profile(worker_id).await? {
            Some(profile) => Ok(profile),
            None => {
                self.db_client
                    .get_user(worker_id)
                    .await?
                    .ok_or(ServiceError::not_found("user", worker_id))?;
                Ok(WorkerProfile::new(worker_id))
            }
        }
    }

    /// Newest first.
    pub async fn list_reviews(&self, worker_id: Uuid) -> Result<Vec<Review>, ServiceError> {
        Ok(self.db_client.get_worker_reviews(worker_id).await?)
    }
}

fn validate_rating(rating: i32) -> Result<(), ServiceError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(ServiceError::InvalidRating(rating))
    }
}

/// Folds one more star rating into the running means. The task's category
/// mean follows the same rule as the overall one.
pub fn fold_review(
    profile: &WorkerProfile,
    category: TaskCategory,
    star_rating: i32,
    now: DateTime<Utc>,
) -> WorkerProfile {
    let mut next = profile.clone();
    let star = f64::from(star_rating);

    next.overall_rating = running_mean(profile.overall_rating, profile.total_reviews, star);
    next.total_reviews = profile.total_reviews + 1;

    let entry = next
        .category_ratings
        .entry(category.to_str().to_string())
        .or_default();
    *entry = CategoryRating {
        average: running_mean(entry.average, entry.count, star),
        count: entry.count + 1,
    };

    next.version = profile.version + 1;
    next.updated_at = now;
    next
}

fn running_mean(mean: f64, count: i64, value: f64) -> f64 {
    let count = count as f64;
    (mean * count + value) / (count + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_stars_on_top_of_forty_seven_reviews() {
        let mut profile = WorkerProfile::new(Uuid::new_v4());
        profile.overall_rating = 4.8;
        profile.total_reviews = 47;
        profile.version = 9;

        let next = fold_review(&profile, TaskCategory::Electrical, 5, Utc::now());

        let expected = (4.8 * 47.0 + 5.0) / 48.0;
        assert!((next.overall_rating - expected).abs() < 1e-9);
        assert_eq!(next.total_reviews, 48);
        assert_eq!(next.version, 10);

        let electrical = next.category_ratings["electrical"];
        assert_eq!(electrical.count, 1);
        assert!((electrical.average - 5.0).abs() < 1e-9);
    }

    #[test]
    fn category_means_are_tracked_separately() {
        let profile = WorkerProfile::new(Uuid::new_v4());
        let now = Utc::now();

        let profile = fold_review(&profile, TaskCategory::Plumbing, 4, now);
        let profile = fold_review(&profile, TaskCategory::Plumbing, 2, now);
        let profile = fold_review(&profile, TaskCategory::Painting, 5, now);

        assert_eq!(profile.total_reviews, 3);
        assert!((profile.overall_rating - 11.0 / 3.0).abs() < 1e-9);
        assert!((profile.category_ratings["plumbing"].average - 3.0).abs() < 1e-9);
        assert_eq!(profile.category_ratings["plumbing"].count, 2);
        assert_eq!(profile.category_ratings["painting"].count, 1);
    }

    #[test]
    fn ratings_outside_one_to_five_are_rejected() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(matches!(validate_rating(0), Err(ServiceError::InvalidRating(0))));
        assert!(matches!(validate_rating(6), Err(ServiceError::InvalidRating(6))));
    }
}
