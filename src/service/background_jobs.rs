// service/background_jobs.rs
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{interval, Duration};

use crate::AppState;

// Ten years.
const MAX_EXPIRY_HOURS: u64 = 87_600;

/// Cancels OPEN tasks that have gone unassigned for longer than
/// `expiry_hours`. Runs every hour.
pub async fn start_open_task_expiry_job(app_state: Arc<AppState>, expiry_hours: u64) {
    let mut interval = interval(Duration::from_secs(3600));
    let max_age = ChronoDuration::hours(expiry_hours.min(MAX_EXPIRY_HOURS) as i64);

    loop {
        interval.tick().await;

        let cutoff = Utc::now() - max_age;
        tracing::info!("Running open task expiry job, cutoff {}", cutoff);

        match app_state.task_service.expire_stale_tasks(cutoff).await {
            Ok(expired) => tracing::info!("Open task expiry job completed: {} tasks cancelled", expired.len()),
            Err(e) => tracing::error!("Open task expiry job failed: {}", e),
        }
    }
}
