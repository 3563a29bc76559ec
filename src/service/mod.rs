pub mod aggregate;
pub mod background_jobs;
pub mod bid_service;
pub mod error;
pub mod escrow_service;
pub mod lifecycle;
pub mod notification_service;
pub mod rating_service;
pub mod task_service;
pub mod user_service;
pub mod wallet_service;
