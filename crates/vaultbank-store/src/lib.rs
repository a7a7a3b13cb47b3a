//! Vaultbank account store
//!
//! Durable, queryable storage of account records and balances with support
//! for consistent read-then-write sequences.
//!
//! # Invariants
//!
//! 1. No account balance is ever observable below zero
//! 2. A paired mutation lands both legs or neither
//! 3. Balance changes happen only through [`AccountStore::apply_transfer`]
//!    and [`AccountStore::deposit`]
//! 4. A given idempotency key maps to at most one recorded outcome
//!
//! Two backends implement the [`AccountStore`] seam: [`PgAccountStore`]
//! (PostgreSQL, pooled connections, row locks) and [`MemoryAccountStore`]
//! (in-process, used by engine tests and the dev server).

pub mod config;
pub mod error;
pub mod memory;
pub mod pg;

use async_trait::async_trait;
use futures::stream::BoxStream;
use rand::Rng;
use uuid::Uuid;

use vaultbank_types::{Account, AccountNumber, Amount, TransferIntent, TransferRecord, User};

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryAccountStore;
pub use pg::PgAccountStore;

/// Attempts at generating a unique account number before giving up
/// with [`StoreError::AllocationExhausted`].
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

/// Durable account and transfer storage
///
/// Handed to the engine as an injected `Arc<dyn AccountStore>`; there is no
/// process-wide connection the engine reaches into implicitly. Balance reads
/// and [`apply_transfer`](Self::apply_transfer) are the only operations that
/// may block on the backend's consistency mechanism.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an account by its human-presentable number.
    async fn find_by_number(&self, number: &AccountNumber) -> StoreResult<Option<Account>>;

    /// Look up an account by primary key.
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Account>>;

    /// All accounts owned by a user, as a lazy finite stream.
    ///
    /// Restartable: calling again re-runs the query from the top.
    async fn accounts_by_owner(
        &self,
        owner_id: Uuid,
    ) -> StoreResult<BoxStream<'static, StoreResult<Account>>>;

    /// Create an account with a zero balance and a freshly allocated number.
    async fn create_account(&self, owner_id: Uuid) -> StoreResult<Account>;

    /// Credit a single account. The dedicated funding path; records an
    /// `applied` transfer row with no debit leg.
    async fn deposit(&self, account_id: Uuid, amount: Amount) -> StoreResult<Account>;

    /// Apply a paired debit/credit as one atomic unit.
    ///
    /// The source balance is re-read and checked against the amount inside
    /// the same consistency scope as both updates; on any failure the
    /// balances are left exactly as they were. A duplicate idempotency key
    /// resolves to the previously recorded transfer instead of applying
    /// the mutation a second time.
    async fn apply_transfer(&self, intent: &TransferIntent) -> StoreResult<TransferRecord>;

    /// Look up the recorded outcome for an idempotency key.
    async fn find_transfer_by_key(&self, key: &str) -> StoreResult<Option<TransferRecord>>;

    /// Persist a rejected transfer attempt so keyed retries replay the same
    /// outcome. Fails with [`StoreError::Duplicate`] if the key is taken.
    async fn record_rejection(
        &self,
        intent: &TransferIntent,
        reject_kind: &str,
    ) -> StoreResult<TransferRecord>;

    // User operations, consumed by the request authorizer.

    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
}

/// Generate a candidate account number ("ACC" + 10 digits).
///
/// Uniqueness is the caller's problem: both backends insert and retry on
/// collision up to [`MAX_ALLOCATION_ATTEMPTS`].
pub(crate) fn generate_account_number() -> AccountNumber {
    let mut rng = rand::thread_rng();
    AccountNumber(format!("ACC{:010}", rng.gen_range(0..10_000_000_000u64)))
}
