use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ledger::{
    Balance, BalanceField, OwnerRef, Transaction, TransactionKind, TransactionStatus,
};

// balances are running totals per owner; every mutation appends its audit row
// inside the same per-owner critical section, so the pair commits together
pub struct LedgerService {
    balances: DashMap<OwnerRef, Balance>,
    journal: DashMap<OwnerRef, Vec<Transaction>>,
    locks: DashMap<OwnerRef, Arc<Mutex<()>>>,
    currency: String,
}

impl LedgerService {
    pub fn new(currency: String) -> Self {
        Self {
            balances: DashMap::new(),
            journal: DashMap::new(),
            locks: DashMap::new(),
            currency,
        }
    }

    fn lock_for(&self, owner: OwnerRef) -> Arc<Mutex<()>> {
        self.locks
            .entry(owner)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn apply_delta(
        &self,
        owner: OwnerRef,
        field: BalanceField,
        delta: i64,
        kind: TransactionKind,
        order_id: Option<Uuid>,
    ) -> Result<Balance, AppError> {
        let lock = self.lock_for(owner);
        let _guard = lock.lock().await;

        let mut balance = self
            .balances
            .get(&owner)
            .map(|b| *b.value())
            .unwrap_or_else(|| Balance::zero(owner));

        let overflow = || AppError::Internal(format!("balance overflow for {owner}"));
        match field {
            BalanceField::Available => {
                balance.available = balance.available.checked_add(delta).ok_or_else(overflow)?;
            }
            BalanceField::Pending => {
                balance.pending = balance.pending.checked_add(delta).ok_or_else(overflow)?;
            }
        }
        // the named field and the running total move together
        balance.total = balance.total.checked_add(delta).ok_or_else(overflow)?;
        debug_assert_eq!(balance.total, balance.available + balance.pending);

        self.balances.insert(owner, balance);
        self.journal.entry(owner).or_default().push(Transaction {
            id: Uuid::new_v4(),
            owner,
            kind,
            amount: delta,
            currency: self.currency.clone(),
            status: TransactionStatus::Confirmed,
            order_id,
            created_at: Utc::now(),
        });

        debug!(owner = %owner, delta, total = balance.total, "balance delta applied");
        Ok(balance)
    }

    pub fn balance(&self, owner: OwnerRef) -> Balance {
        self.balances
            .get(&owner)
            .map(|b| *b.value())
            .unwrap_or_else(|| Balance::zero(owner))
    }

    pub fn transactions(&self, owner: OwnerRef) -> Vec<Transaction> {
        self.journal
            .get(&owner)
            .map(|t| t.value().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::LedgerService;
    use crate::models::ledger::{BalanceField, OwnerRef, TransactionKind};

    #[tokio::test]
    async fn delta_moves_field_and_total_and_writes_audit_row() {
        let ledger = LedgerService::new("USD".to_string());
        let owner = OwnerRef::courier(Uuid::new_v4());
        let order_id = Uuid::new_v4();

        let balance = ledger
            .apply_delta(
                owner,
                BalanceField::Pending,
                900,
                TransactionKind::Increment,
                Some(order_id),
            )
            .await
            .unwrap();

        assert_eq!(balance.pending, 900);
        assert_eq!(balance.available, 0);
        assert_eq!(balance.total, 900);

        let journal = ledger.transactions(owner);
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].amount, 900);
        assert_eq!(journal[0].order_id, Some(order_id));
        assert_eq!(journal[0].currency, "USD");
    }

    #[tokio::test]
    async fn unknown_owner_reads_as_zero() {
        let ledger = LedgerService::new("USD".to_string());
        let balance = ledger.balance(OwnerRef::store(Uuid::new_v4()));
        assert_eq!(balance.total, 0);
        assert_eq!(balance.available, 0);
        assert_eq!(balance.pending, 0);
    }

    #[tokio::test]
    async fn concurrent_deltas_on_one_owner_serialize() {
        let ledger = Arc::new(LedgerService::new("USD".to_string()));
        let owner = OwnerRef::store(Uuid::new_v4());

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger
                    .apply_delta(owner, BalanceField::Available, 10, TransactionKind::Increment, None)
                    .await
                    .unwrap();
                ledger
                    .apply_delta(owner, BalanceField::Pending, -3, TransactionKind::Decrement, None)
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let balance = ledger.balance(owner);
        assert_eq!(balance.available, 500);
        assert_eq!(balance.pending, -150);
        assert_eq!(balance.total, balance.available + balance.pending);
        assert_eq!(ledger.transactions(owner).len(), 100);
    }
}
