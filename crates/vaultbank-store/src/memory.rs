//! In-memory account store
//!
//! Backend for engine tests and the dev server. A single `RwLock` world
//! makes every read-check-mutate sequence indivisible: the write lock is the
//! consistency scope, so no reader ever observes a half-applied transfer or
//! a negative balance. Semantics match [`PgAccountStore`](crate::PgAccountStore)
//! exactly, including idempotency-key resolution and bounded account-number
//! allocation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::RwLock;
use uuid::Uuid;

use vaultbank_types::{
    Account, AccountNumber, Amount, TransferIntent, TransferRecord, TransferStatus, User,
};

use crate::error::{StoreError, StoreResult};
use crate::{generate_account_number, AccountStore, MAX_ALLOCATION_ATTEMPTS};

#[derive(Default)]
struct World {
    users: HashMap<Uuid, User>,
    users_by_email: HashMap<String, Uuid>,
    accounts: HashMap<Uuid, Account>,
    accounts_by_number: HashMap<String, Uuid>,
    transfers: Vec<TransferRecord>,
    transfers_by_key: HashMap<String, usize>,
}

impl World {
    fn record_transfer(&mut self, record: TransferRecord) -> TransferRecord {
        if let Some(key) = &record.idempotency_key {
            self.transfers_by_key
                .insert(key.clone(), self.transfers.len());
        }
        self.transfers.push(record.clone());
        record
    }

    fn transfer_by_key(&self, key: &str) -> Option<TransferRecord> {
        self.transfers_by_key
            .get(key)
            .and_then(|idx| self.transfers.get(*idx))
            .cloned()
    }
}

/// In-process account store
#[derive(Default)]
pub struct MemoryAccountStore {
    world: RwLock<World>,
    fail_next_apply: AtomicBool,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `apply_transfer` fail after its balance check but
    /// before any mutation becomes visible. Lets tests assert that an
    /// interrupted transfer leaves balances exactly as they were.
    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_number(&self, number: &AccountNumber) -> StoreResult<Option<Account>> {
        let world = self.world.read().await;
        Ok(world
            .accounts_by_number
            .get(number.as_str())
            .and_then(|id| world.accounts.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let world = self.world.read().await;
        Ok(world.accounts.get(&id).cloned())
    }

    async fn accounts_by_owner(
        &self,
        owner_id: Uuid,
    ) -> StoreResult<BoxStream<'static, StoreResult<Account>>> {
        let world = self.world.read().await;
        let mut owned: Vec<Account> = world
            .accounts
            .values()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by_key(|a| a.created_at);
        Ok(stream::iter(owned.into_iter().map(Ok)).boxed())
    }

    async fn create_account(&self, owner_id: Uuid) -> StoreResult<Account> {
        let mut world = self.world.write().await;
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let number = generate_account_number();
            if world.accounts_by_number.contains_key(number.as_str()) {
                continue;
            }
            let now = Utc::now();
            let account = Account {
                id: Uuid::new_v4(),
                owner_id,
                account_number: number.clone(),
                balance: Amount::ZERO,
                created_at: now,
                updated_at: now,
            };
            world.accounts_by_number.insert(number.0, account.id);
            world.accounts.insert(account.id, account.clone());
            return Ok(account);
        }
        Err(StoreError::AllocationExhausted)
    }

    async fn deposit(&self, account_id: Uuid, amount: Amount) -> StoreResult<Account> {
        if !amount.is_positive() {
            return Err(StoreError::InvalidInput(
                "deposit amount must be positive".to_string(),
            ));
        }

        let mut world = self.world.write().await;
        let account = world
            .accounts
            .get(&account_id)
            .ok_or_else(|| StoreError::NotFound(account_id.to_string()))?;
        let new_balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| StoreError::InvalidInput("balance overflow".to_string()))?;

        let account = world
            .accounts
            .get_mut(&account_id)
            .expect("account vanished under write lock");
        account.balance = new_balance;
        account.updated_at = Utc::now();
        let updated = account.clone();

        world.record_transfer(TransferRecord {
            id: Uuid::new_v4(),
            idempotency_key: None,
            source_account_id: None,
            destination_account_id: account_id,
            amount,
            status: TransferStatus::Applied,
            reject_kind: None,
            created_at: Utc::now(),
        });

        Ok(updated)
    }

    async fn apply_transfer(&self, intent: &TransferIntent) -> StoreResult<TransferRecord> {
        if !intent.amount.is_positive() {
            return Err(StoreError::InvalidInput(
                "transfer amount must be positive".to_string(),
            ));
        }
        if intent.source_account_id == intent.destination_account_id {
            return Err(StoreError::InvalidInput(
                "source and destination are the same account".to_string(),
            ));
        }

        let mut world = self.world.write().await;

        if let Some(key) = &intent.idempotency_key {
            if let Some(recorded) = world.transfer_by_key(key) {
                return Ok(recorded);
            }
        }

        let source = world
            .accounts
            .get(&intent.source_account_id)
            .ok_or_else(|| StoreError::NotFound(intent.source_account_id.to_string()))?;
        let destination = world
            .accounts
            .get(&intent.destination_account_id)
            .ok_or_else(|| StoreError::NotFound(intent.destination_account_id.to_string()))?;

        if source.balance < intent.amount {
            return Err(StoreError::InsufficientFunds {
                available: source.balance,
                required: intent.amount,
            });
        }

        // Both new balances are computed before either is written back, so
        // every failure path leaves the world untouched
        let debited = source
            .balance
            .checked_sub(intent.amount)
            .ok_or_else(|| StoreError::InvalidInput("balance underflow".to_string()))?;
        let credited = destination
            .balance
            .checked_add(intent.amount)
            .ok_or_else(|| StoreError::InvalidInput("balance overflow".to_string()))?;

        // Fault injection point for atomicity tests
        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected fault".to_string()));
        }

        let now = Utc::now();
        {
            let source = world
                .accounts
                .get_mut(&intent.source_account_id)
                .expect("source vanished under write lock");
            source.balance = debited;
            source.updated_at = now;
        }
        {
            let destination = world
                .accounts
                .get_mut(&intent.destination_account_id)
                .expect("destination vanished under write lock");
            destination.balance = credited;
            destination.updated_at = now;
        }

        Ok(world.record_transfer(TransferRecord {
            id: Uuid::new_v4(),
            idempotency_key: intent.idempotency_key.clone(),
            source_account_id: Some(intent.source_account_id),
            destination_account_id: intent.destination_account_id,
            amount: intent.amount,
            status: TransferStatus::Applied,
            reject_kind: None,
            created_at: now,
        }))
    }

    async fn find_transfer_by_key(&self, key: &str) -> StoreResult<Option<TransferRecord>> {
        let world = self.world.read().await;
        Ok(world.transfer_by_key(key))
    }

    async fn record_rejection(
        &self,
        intent: &TransferIntent,
        reject_kind: &str,
    ) -> StoreResult<TransferRecord> {
        let mut world = self.world.write().await;

        if let Some(key) = &intent.idempotency_key {
            if world.transfers_by_key.contains_key(key) {
                return Err(StoreError::Duplicate(key.clone()));
            }
        }

        Ok(world.record_transfer(TransferRecord {
            id: Uuid::new_v4(),
            idempotency_key: intent.idempotency_key.clone(),
            source_account_id: Some(intent.source_account_id),
            destination_account_id: intent.destination_account_id,
            amount: intent.amount,
            status: TransferStatus::Rejected,
            reject_kind: Some(reject_kind.to_string()),
            created_at: Utc::now(),
        }))
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let mut world = self.world.write().await;
        if world.users_by_email.contains_key(email) {
            return Err(StoreError::Duplicate(format!(
                "email {} already registered",
                email
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        world.users_by_email.insert(email.to_string(), user.id);
        world.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let world = self.world.read().await;
        Ok(world
            .users_by_email
            .get(email)
            .and_then(|id| world.users.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let world = self.world.read().await;
        Ok(world.users.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn intent(source: &Account, destination: &Account, minor: i64) -> TransferIntent {
        TransferIntent {
            source_account_id: source.id,
            destination_account_id: destination.id,
            amount: Amount::from_minor(minor),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn deposit_then_transfer() {
        let store = MemoryAccountStore::new();
        let owner = Uuid::new_v4();
        let source = store.create_account(owner).await.unwrap();
        let destination = store.create_account(owner).await.unwrap();

        store
            .deposit(source.id, Amount::from_minor(10_000))
            .await
            .unwrap();

        let record = store
            .apply_transfer(&intent(&source, &destination, 4_000))
            .await
            .unwrap();
        assert_eq!(record.status, TransferStatus::Applied);

        let source = store.find_by_id(source.id).await.unwrap().unwrap();
        let destination = store.find_by_id(destination.id).await.unwrap().unwrap();
        assert_eq!(source.balance, Amount::from_minor(6_000));
        assert_eq!(destination.balance, Amount::from_minor(4_000));
    }

    #[tokio::test]
    async fn overdraw_is_rejected_without_effect() {
        let store = MemoryAccountStore::new();
        let owner = Uuid::new_v4();
        let source = store.create_account(owner).await.unwrap();
        let destination = store.create_account(owner).await.unwrap();
        store
            .deposit(source.id, Amount::from_minor(100))
            .await
            .unwrap();

        let err = store
            .apply_transfer(&intent(&source, &destination, 200))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { .. }));

        let source = store.find_by_id(source.id).await.unwrap().unwrap();
        let destination = store.find_by_id(destination.id).await.unwrap().unwrap();
        assert_eq!(source.balance, Amount::from_minor(100));
        assert_eq!(destination.balance, Amount::ZERO);
    }

    #[tokio::test]
    async fn duplicate_key_replays_recorded_transfer() {
        let store = MemoryAccountStore::new();
        let owner = Uuid::new_v4();
        let source = store.create_account(owner).await.unwrap();
        let destination = store.create_account(owner).await.unwrap();
        store
            .deposit(source.id, Amount::from_minor(1_000))
            .await
            .unwrap();

        let mut keyed = intent(&source, &destination, 400);
        keyed.idempotency_key = Some("transfer-1".to_string());

        let first = store.apply_transfer(&keyed).await.unwrap();
        let second = store.apply_transfer(&keyed).await.unwrap();
        assert_eq!(first.id, second.id);

        let source = store.find_by_id(source.id).await.unwrap().unwrap();
        assert_eq!(source.balance, Amount::from_minor(600));
    }

    #[tokio::test]
    async fn injected_fault_leaves_balances_untouched() {
        let store = MemoryAccountStore::new();
        let owner = Uuid::new_v4();
        let source = store.create_account(owner).await.unwrap();
        let destination = store.create_account(owner).await.unwrap();
        store
            .deposit(source.id, Amount::from_minor(500))
            .await
            .unwrap();

        store.fail_next_apply();
        let err = store
            .apply_transfer(&intent(&source, &destination, 300))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let source_after = store.find_by_id(source.id).await.unwrap().unwrap();
        let destination_after = store.find_by_id(destination.id).await.unwrap().unwrap();
        assert_eq!(source_after.balance, Amount::from_minor(500));
        assert_eq!(destination_after.balance, Amount::ZERO);

        // The fault is one-shot; the retry succeeds
        store
            .apply_transfer(&intent(&source, &destination, 300))
            .await
            .unwrap();
        let source_after = store.find_by_id(source.id).await.unwrap().unwrap();
        assert_eq!(source_after.balance, Amount::from_minor(200));
    }

    #[tokio::test]
    async fn accounts_by_owner_streams_in_creation_order() {
        let store = MemoryAccountStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = store.create_account(owner).await.unwrap();
        let b = store.create_account(owner).await.unwrap();
        store.create_account(other).await.unwrap();

        let owned: Vec<Account> = store
            .accounts_by_owner(owner)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            owned.iter().map(|acct| acct.id).collect::<Vec<_>>(),
            vec![a.id, b.id]
        );

        // Restartable: a second call replays from the top
        let again: Vec<Account> = store
            .accounts_by_owner(owner)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(again.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryAccountStore::new();
        store.create_user("a@example.com", "hash").await.unwrap();
        let err = store
            .create_user("a@example.com", "hash2")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }
}
