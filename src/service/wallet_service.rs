// service/wallet_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::marketdb::{ChangeSet, MarketExt},
    models::walletmodels::*,
    service::error::ServiceError,
};

#[derive(Debug, Clone)]
pub struct WalletService {
    db_client: Arc<dyn MarketExt>,
}

impl WalletService {
    pub fn new(db_client: Arc<dyn MarketExt>) -> Self {
        Self { db_client }
    }

    /// A user who has never been credited reads as an empty wallet.
    pub async fn get_wallet(&self, user_id: Uuid) -> Result<Wallet, ServiceError> {
        Ok(self
            .db_client
            .get_wallet(user_id)
            .await?
            .unwrap_or_else(|| {
                let now = Utc::now();
                Wallet { user_id, balance: 0, created_at: now, updated_at: now }
            }))
    }

    pub async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, ServiceError> {
        Ok(self.db_client.get_wallet_transactions(user_id).await?)
    }

    /// Positive `delta` credits, negative debits.
    pub async fn adjust(
        &self,
        user_id: Uuid,
        delta: i64,
        description: impl Into<String>,
    ) -> Result<WalletTransaction, ServiceError> {
        let amount = delta
            .checked_abs()
            .and_then(|amount| ServiceError::check_amount(amount).ok())
            .ok_or(ServiceError::InvalidAmount(delta))?;
        let entry = if delta > 0 {
            WalletEntry::credit(user_id, TransactionType::Adjustment, amount, None, description)
        } else {
            WalletEntry::debit(user_id, TransactionType::Adjustment, amount, None, description)
        };

        let mut transactions = self
            .db_client
            .commit(ChangeSet {
                wallet_entries: vec![entry],
                ..Default::default()
            })
            .await?;

        let transaction = transactions
            .pop()
            .ok_or_else(|| ServiceError::invalid_state("wallet adjustment produced no transaction"))?;

        tracing::info!(
            "Wallet {} adjusted by {}: {} -> {}",
            user_id,
            delta,
            transaction.balance_before,
            transaction.balance_after
        );
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn balance_is_the_sum_of_transactions() {
        let service = WalletService::new(Arc::new(MemoryStore::new()));
        let user = Uuid::new_v4();

        assert_eq!(service.get_wallet(user).await.unwrap().balance, 0);

        service.adjust(user, 1_000, "top up").await.unwrap();
        let debit = service.adjust(user, -250, "correction").await.unwrap();
        assert_eq!(debit.direction, TransactionDirection::Debit);
        assert_eq!(debit.balance_before, 1_000);
        assert_eq!(debit.balance_after, 750);

        let wallet = service.get_wallet(user).await.unwrap();
        let transactions = service.list_transactions(user).await.unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(wallet.balance, transactions.iter().map(WalletTransaction::delta).sum::<i64>());
    }

    #[tokio::test]
    async fn overdraft_and_zero_adjustments_are_refused() {
        let service = WalletService::new(Arc::new(MemoryStore::new()));
        let user = Uuid::new_v4();
        service.adjust(user, 100, "top up").await.unwrap();

        assert_matches!(
            service.adjust(user, -101, "too much").await,
            Err(ServiceError::InsufficientFunds { required: 101, available: 100 })
        );
        assert_matches!(service.adjust(user, 0, "nothing").await, Err(ServiceError::InvalidAmount(0)));
        assert_matches!(
            service.adjust(user, i64::MIN, "underflow").await,
            Err(ServiceError::InvalidAmount(i64::MIN))
        );
        assert_matches!(
            service.adjust(user, MAX_AMOUNT + 1, "too much").await,
            Err(ServiceError::InvalidAmount(_))
        );
        assert_eq!(service.get_wallet(user).await.unwrap().balance, 100);
        assert_eq!(service.list_transactions(user).await.unwrap().len(), 1);
    }
}
