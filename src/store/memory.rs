//! In-memory store
//!
//! Implements the full store contract in-process. Every operation takes the
//! state lock exactly once and never holds it across an `.await`, so each
//! call is atomic with respect to every other call.
//!
//! Faults can be injected per account to exercise the compensation and
//! job-isolation paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{AccountBalance, Transaction, TransactionStatus};

use super::{AtomicStep, CreateOutcome, LedgerStore, StatusChange, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StoredTransaction {
    /// Insertion order, breaks ties on `created_at`
    seq: u64,
    tx: Transaction,
}

#[derive(Debug, Default)]
struct MemoryState {
    balances: HashMap<Uuid, AccountBalance>,
    transactions: HashMap<Uuid, StoredTransaction>,
    idempotency_keys: HashMap<String, Uuid>,
    next_seq: u64,
}

#[derive(Debug, Default)]
struct FaultPlan {
    failing_credits: HashSet<Uuid>,
    panicking_accounts: HashSet<Uuid>,
}

/// In-process implementation of [`LedgerStore`]
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    faults: Mutex<FaultPlan>,
    atomic: bool,
}

impl MemoryStore {
    /// Create a store that supports atomic multi-step execution
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            faults: Mutex::new(FaultPlan::default()),
            atomic: true,
        }
    }

    /// Create a store without atomic multi-step execution, forcing the
    /// compensable transfer path
    pub fn without_atomic() -> Self {
        Self {
            atomic: false,
            ..Self::new()
        }
    }

    /// Make every positive adjustment to `account_id` fail with `Unavailable`
    pub fn fail_credits_to(&self, account_id: Uuid) {
        self.lock_faults().failing_credits.insert(account_id);
    }

    /// Make any balance adjustment touching `account_id` panic
    pub fn panic_on_account(&self, account_id: Uuid) {
        self.lock_faults().panicking_accounts.insert(account_id);
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        let mut faults = self.lock_faults();
        faults.failing_credits.clear();
        faults.panicking_accounts.clear();
    }

    /// Number of journaled transactions
    pub fn transaction_count(&self) -> usize {
        self.lock_state().transactions.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_faults(&self) -> MutexGuard<'_, FaultPlan> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checked before the state lock is taken so a panic never poisons it
    fn trip_panic_fault(&self, account_id: Uuid) {
        let armed = self.lock_faults().panicking_accounts.contains(&account_id);
        if armed {
            panic!("injected fault: balance adjustment on account {}", account_id);
        }
    }

    fn check_credit_fault(&self, account_id: Uuid, delta: i64) -> StoreResult<()> {
        if delta > 0 && self.lock_faults().failing_credits.contains(&account_id) {
            return Err(StoreError::Unavailable(format!(
                "injected credit failure for account {}",
                account_id
            )));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Conditional adjust against a balance map
fn apply_delta(
    balances: &mut HashMap<Uuid, AccountBalance>,
    account_id: Uuid,
    delta: i64,
) -> StoreResult<AccountBalance> {
    let current = balances.get(&account_id).map(|b| b.amount).unwrap_or(0);
    let next = current
        .checked_add(delta)
        .ok_or(StoreError::Overflow(account_id))?;

    if delta < 0 && next < 0 {
        return Err(StoreError::InsufficientFunds {
            account_id,
            available: current,
            requested: delta.saturating_neg(),
        });
    }

    let row = balances
        .entry(account_id)
        .or_insert_with(|| AccountBalance::zero(account_id));
    row.amount = next;
    row.last_updated_at = Utc::now();
    Ok(row.clone())
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_or_create_account(&self, account_id: Uuid) -> StoreResult<AccountBalance> {
        let mut state = self.lock_state();
        let row = state
            .balances
            .entry(account_id)
            .or_insert_with(|| AccountBalance::zero(account_id));
        Ok(row.clone())
    }

    async fn get_balance(&self, account_id: Uuid) -> StoreResult<Option<AccountBalance>> {
        Ok(self.lock_state().balances.get(&account_id).cloned())
    }

    async fn conditional_adjust_balance(
        &self,
        account_id: Uuid,
        delta: i64,
    ) -> StoreResult<AccountBalance> {
        // Let other tasks interleave, as a network round-trip would
        tokio::task::yield_now().await;

        self.trip_panic_fault(account_id);
        self.check_credit_fault(account_id, delta)?;

        let mut state = self.lock_state();
        apply_delta(&mut state.balances, account_id, delta)
    }

    async fn create_transaction(&self, tx: &Transaction) -> StoreResult<CreateOutcome> {
        tokio::task::yield_now().await;

        let mut state = self.lock_state();

        if let Some(key) = &tx.idempotency_key {
            if let Some(existing_id) = state.idempotency_keys.get(key) {
                let existing = state
                    .transactions
                    .get(existing_id)
                    .map(|row| row.tx.clone())
                    .ok_or_else(|| {
                        StoreError::Corrupt(format!("idempotency key '{}' has no transaction", key))
                    })?;
                return Ok(CreateOutcome::Existing(existing));
            }
        }

        if state.transactions.contains_key(&tx.id) {
            return Err(StoreError::Conflict(format!(
                "transaction {} already exists",
                tx.id
            )));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.transactions.insert(
            tx.id,
            StoredTransaction {
                seq,
                tx: tx.clone(),
            },
        );
        if let Some(key) = &tx.idempotency_key {
            state.idempotency_keys.insert(key.clone(), tx.id);
        }

        Ok(CreateOutcome::Inserted(tx.clone()))
    }

    async fn find_transaction_id_by_key(&self, key: &str) -> StoreResult<Option<Uuid>> {
        Ok(self.lock_state().idempotency_keys.get(key).copied())
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self
            .lock_state()
            .transactions
            .get(&id)
            .map(|row| row.tx.clone()))
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.lock_state();

        let mut rows: Vec<&StoredTransaction> = state
            .transactions
            .values()
            .filter(|row| row.tx.touches(account_id))
            .collect();
        rows.sort_by(|a, b| {
            b.tx.created_at
                .cmp(&a.tx.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });

        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|row| row.tx.clone())
            .collect())
    }

    async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> StoreResult<StatusChange> {
        let mut state = self.lock_state();
        let row = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?;

        if row.tx.status.is_terminal() {
            return Ok(StatusChange::AlreadyTerminal(row.tx.status));
        }
        if !row.tx.status.can_transition_to(status) {
            return Err(StoreError::Conflict(format!(
                "transaction {}: {} -> {} is not a valid transition",
                id, row.tx.status, status
            )));
        }

        row.tx.status = status;
        Ok(StatusChange::Applied)
    }

    fn supports_atomic(&self) -> bool {
        self.atomic
    }

    async fn run_atomic(&self, steps: &[AtomicStep]) -> StoreResult<()> {
        if !self.atomic {
            return Err(StoreError::AtomicUnsupported);
        }

        tokio::task::yield_now().await;

        for step in steps {
            if let AtomicStep::AdjustBalance { account_id, .. } = step {
                self.trip_panic_fault(*account_id);
            }
        }

        let mut state = self.lock_state();

        // Stage every step against scratch copies; publish only if all succeed
        let mut balances = state.balances.clone();
        let mut staged_statuses: Vec<(Uuid, TransactionStatus)> = Vec::new();

        for step in steps {
            match *step {
                AtomicStep::AdjustBalance { account_id, delta } => {
                    self.check_credit_fault(account_id, delta)?;
                    apply_delta(&mut balances, account_id, delta)?;
                }
                AtomicStep::SetStatus {
                    transaction_id,
                    status,
                } => {
                    let recorded = state
                        .transactions
                        .get(&transaction_id)
                        .map(|row| row.tx.status)
                        .ok_or_else(|| {
                            StoreError::NotFound(format!("transaction {}", transaction_id))
                        })?;
                    let current = staged_statuses
                        .iter()
                        .rev()
                        .find(|(id, _)| *id == transaction_id)
                        .map(|(_, s)| *s)
                        .unwrap_or(recorded);

                    if !current.can_transition_to(status) {
                        return Err(StoreError::Conflict(format!(
                            "transaction {} is {}, cannot become {}",
                            transaction_id, current, status
                        )));
                    }
                    staged_statuses.push((transaction_id, status));
                }
            }
        }

        state.balances = balances;
        for (id, status) in staged_statuses {
            if let Some(row) = state.transactions.get_mut(&id) {
                row.tx.status = status;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;

    fn amount(v: i64) -> Amount {
        Amount::new(v).unwrap()
    }

    #[tokio::test]
    async fn test_credit_creates_row_lazily() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();

        assert!(store.get_balance(account).await.unwrap().is_none());

        let row = store.conditional_adjust_balance(account, 500).await.unwrap();
        assert_eq!(row.amount, 500);
        assert_eq!(store.get_balance(account).await.unwrap().unwrap().amount, 500);
    }

    #[tokio::test]
    async fn test_debit_refused_without_cover() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();
        store.conditional_adjust_balance(account, 100).await.unwrap();

        let err = store
            .conditional_adjust_balance(account, -150)
            .await
            .unwrap_err();
        match err {
            StoreError::InsufficientFunds {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 100);
                assert_eq!(requested, 150);
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }
        assert_eq!(store.get_balance(account).await.unwrap().unwrap().amount, 100);

        let row = store.conditional_adjust_balance(account, -100).await.unwrap();
        assert_eq!(row.amount, 0);
    }

    #[tokio::test]
    async fn test_create_transaction_dedups_on_key() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();

        let first = Transaction::pending_credit(account, amount(10), Some("k1".into()));
        let second = Transaction::pending_credit(account, amount(99), Some("k1".into()));

        assert!(store.create_transaction(&first).await.unwrap().is_inserted());
        match store.create_transaction(&second).await.unwrap() {
            CreateOutcome::Existing(tx) => assert_eq!(tx.id, first.id),
            other => panic!("expected Existing, got {:?}", other),
        }
        assert_eq!(store.transaction_count(), 1);
        assert_eq!(
            store.find_transaction_id_by_key("k1").await.unwrap(),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn test_status_update_is_compare_and_set() {
        let store = MemoryStore::new();
        let tx = Transaction::pending_debit(Uuid::new_v4(), amount(5), None);
        store.create_transaction(&tx).await.unwrap();

        assert_eq!(
            store
                .update_transaction_status(tx.id, TransactionStatus::Completed)
                .await
                .unwrap(),
            StatusChange::Applied
        );
        assert_eq!(
            store
                .update_transaction_status(tx.id, TransactionStatus::Failed)
                .await
                .unwrap(),
            StatusChange::AlreadyTerminal(TransactionStatus::Completed)
        );
        assert!(matches!(
            store
                .update_transaction_status(Uuid::new_v4(), TransactionStatus::Failed)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_with_paging() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();
        let mut ids = Vec::new();
        for v in 1..=5 {
            let tx = Transaction::pending_credit(account, amount(v), None);
            ids.push(tx.id);
            store.create_transaction(&tx).await.unwrap();
        }
        store
            .create_transaction(&Transaction::pending_credit(Uuid::new_v4(), amount(1), None))
            .await
            .unwrap();

        let page = store.list_transactions(account, 2, 1).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[3]);
        assert_eq!(page[1].id, ids[2]);

        let all = store.list_transactions(account, 50, 0).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, ids[4]);
    }

    #[tokio::test]
    async fn test_run_atomic_is_all_or_nothing() {
        let store = MemoryStore::new();
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        store.conditional_adjust_balance(from, 50).await.unwrap();

        let tx = Transaction::pending_transfer(from, to, amount(80), None);
        store.create_transaction(&tx).await.unwrap();

        let steps = [
            AtomicStep::AdjustBalance {
                account_id: to,
                delta: 80,
            },
            AtomicStep::AdjustBalance {
                account_id: from,
                delta: -80,
            },
            AtomicStep::SetStatus {
                transaction_id: tx.id,
                status: TransactionStatus::Completed,
            },
        ];
        let err = store.run_atomic(&steps).await.unwrap_err();
        assert!(err.is_insufficient_funds());

        // The credit staged before the failing debit must not be visible
        assert!(store.get_balance(to).await.unwrap().is_none());
        assert_eq!(store.get_balance(from).await.unwrap().unwrap().amount, 50);
        assert_eq!(
            store.get_transaction(tx.id).await.unwrap().unwrap().status,
            TransactionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_without_atomic_refuses_run_atomic() {
        let store = MemoryStore::without_atomic();
        assert!(!store.supports_atomic());
        assert!(matches!(
            store.run_atomic(&[]).await,
            Err(StoreError::AtomicUnsupported)
        ));
    }

    #[tokio::test]
    async fn test_injected_credit_failure() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();
        store.fail_credits_to(account);

        assert!(matches!(
            store.conditional_adjust_balance(account, 10).await,
            Err(StoreError::Unavailable(_))
        ));

        store.clear_faults();
        assert!(store.conditional_adjust_balance(account, 10).await.is_ok());
    }
}
