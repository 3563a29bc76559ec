pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
pub mod utils;

use std::sync::Arc;

use config::Config;
use db::marketdb::MarketExt;
use service::{
    bid_service::BidService,
    escrow_service::{EscrowPolicy, EscrowService},
    lifecycle::LifecyclePolicy,
    notification_service::NotificationService,
    rating_service::RatingService,
    task_service::TaskService,
    user_service::UserService,
    wallet_service::WalletService,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<dyn MarketExt>,
    // Services
    pub task_service: Arc<TaskService>,
    pub bid_service: Arc<BidService>,
    pub escrow_service: Arc<EscrowService>,
    pub rating_service: Arc<RatingService>,
    pub notification_service: Arc<NotificationService>,
    pub wallet_service: Arc<WalletService>,
    pub user_service: Arc<UserService>,
}

impl AppState {
    pub fn new(db_client: Arc<dyn MarketExt>, config: Config) -> Self {
        let escrow_policy = EscrowPolicy {
            fee_basis_points: config.platform_fee_bps,
            funding_model: config.funding_model,
            platform_account_id: config.platform_account_id,
        };
        let lifecycle_policy = LifecyclePolicy {
            block_cancel_during_handoff: config.block_cancel_during_handoff,
        };

        let escrow_service = EscrowService::new(db_client.clone(), escrow_policy);

        let task_service = Arc::new(TaskService::new(
            db_client.clone(),
            escrow_service.clone(),
            lifecycle_policy,
        ));
        let bid_service = Arc::new(BidService::new(
            db_client.clone(),
            escrow_service.clone(),
            lifecycle_policy,
        ));
        let rating_service = Arc::new(RatingService::new(db_client.clone()));
        let notification_service = Arc::new(NotificationService::new(db_client.clone()));
        let wallet_service = Arc::new(WalletService::new(db_client.clone()));
        let user_service = Arc::new(UserService::new(db_client.clone()));

        Self {
            env: config,
            db_client,
            task_service,
            bid_service,
            escrow_service: Arc::new(escrow_service),
            rating_service,
            notification_service,
            wallet_service,
            user_service,
        }
    }
}
