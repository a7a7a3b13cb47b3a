//! PostgreSQL-backed account store
//!
//! The production backend. Paired mutations run in a single transaction with
//! `SELECT ... FOR UPDATE` row locks taken in ascending account-id order, so
//! two transfers moving funds in opposite directions between the same pair of
//! accounts cannot deadlock. Lock waits are bounded per transaction; hitting
//! the bound surfaces as a retryable conflict, never a partial mutation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::{FromRow, Transaction};
use uuid::Uuid;

use async_trait::async_trait;
use vaultbank_types::{Account, AccountNumber, Amount, TransferIntent, TransferRecord, TransferStatus, User};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::{generate_account_number, AccountStore, MAX_ALLOCATION_ATTEMPTS};

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;

const ACCOUNT_COLUMNS: &str = "id, owner_id, account_number, balance, created_at, updated_at";
const TRANSFER_COLUMNS: &str =
    "id, idempotency_key, source_account_id, destination_account_id, amount, status, reject_kind, created_at";

/// PostgreSQL account store over a shared connection pool
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgAccountStore {
    /// Connect a new pool from configuration.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        tracing::info!("connecting to PostgreSQL: {}", config.database_url_masked());

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!("connected to PostgreSQL");

        Ok(Self {
            pool,
            lock_timeout_ms: config.lock_timeout_ms,
        })
    }

    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        tracing::info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::info!("migrations complete");
        Ok(())
    }

    async fn begin_locked_tx(&self) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        // lock_timeout cannot be bound as a parameter; the value is our own
        // config, not caller input
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout_ms
        ))
        .execute(&mut *tx)
        .await
        .map_err(classify)?;
        Ok(tx)
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_number(&self, number: &AccountNumber) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1"
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        Ok(account)
    }

    async fn accounts_by_owner(
        &self,
        owner_id: Uuid,
    ) -> StoreResult<BoxStream<'static, StoreResult<Account>>> {
        let pool = self.pool.clone();
        let stream = async_stream::try_stream! {
            let mut rows = sqlx::query_as::<_, Account>(
                "SELECT id, owner_id, account_number, balance, created_at, updated_at \
                 FROM accounts WHERE owner_id = $1 ORDER BY created_at",
            )
            .bind(owner_id)
            .fetch(&pool);

            while let Some(account) = rows.try_next().await? {
                yield account;
            }
        };
        Ok(Box::pin(stream))
    }

    async fn create_account(&self, owner_id: Uuid) -> StoreResult<Account> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let number = generate_account_number();
            let inserted = sqlx::query_as::<_, Account>(&format!(
                "INSERT INTO accounts (id, owner_id, account_number, balance) \
                 VALUES ($1, $2, $3, 0) \
                 RETURNING {ACCOUNT_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(owner_id)
            .bind(number.clone())
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(account) => {
                    tracing::info!(
                        owner_id = %owner_id,
                        account_number = %account.account_number,
                        "account created"
                    );
                    return Ok(account);
                }
                Err(e) if is_unique_violation(&e, "accounts_account_number_key") => {
                    tracing::warn!(attempt, "account number collision, regenerating");
                    continue;
                }
                Err(e) => return Err(classify(e)),
            }
        }

        Err(StoreError::AllocationExhausted)
    }

    async fn deposit(&self, account_id: Uuid, amount: Amount) -> StoreResult<Account> {
        if !amount.is_positive() {
            return Err(StoreError::InvalidInput(
                "deposit amount must be positive".to_string(),
            ));
        }

        let mut tx = self.begin_locked_tx().await?;

        let account = lock_account(&mut tx, account_id).await?;
        let new_balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| StoreError::InvalidInput("balance overflow".to_string()))?;

        let updated = sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET balance = $1, updated_at = NOW() WHERE id = $2 \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(new_balance)
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        sqlx::query(
            "INSERT INTO transfers \
                 (id, idempotency_key, source_account_id, destination_account_id, amount, status) \
             VALUES ($1, NULL, NULL, $2, $3, 'applied')",
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

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

        let mut tx = self.begin_locked_tx().await?;

        // Fixed global lock order by account id; prevents deadlock between
        // opposite-direction transfers over the same pair
        let (first_id, second_id) =
            if intent.source_account_id < intent.destination_account_id {
                (intent.source_account_id, intent.destination_account_id)
            } else {
                (intent.destination_account_id, intent.source_account_id)
            };

        let first = lock_account(&mut tx, first_id).await?;
        let second = lock_account(&mut tx, second_id).await?;
        let source = if first.id == intent.source_account_id {
            &first
        } else {
            &second
        };

        // The authoritative balance check: same atomic scope as both updates
        if source.balance < intent.amount {
            return Err(StoreError::InsufficientFunds {
                available: source.balance,
                required: intent.amount,
            });
        }

        sqlx::query("UPDATE accounts SET balance = balance - $1, updated_at = NOW() WHERE id = $2")
            .bind(intent.amount)
            .bind(intent.source_account_id)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        sqlx::query("UPDATE accounts SET balance = balance + $1, updated_at = NOW() WHERE id = $2")
            .bind(intent.amount)
            .bind(intent.destination_account_id)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let inserted = sqlx::query_as::<_, TransferRow>(&format!(
            "INSERT INTO transfers \
                 (id, idempotency_key, source_account_id, destination_account_id, amount, status) \
             VALUES ($1, $2, $3, $4, $5, 'applied') \
             RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(intent.idempotency_key.as_deref())
        .bind(intent.source_account_id)
        .bind(intent.destination_account_id)
        .bind(intent.amount)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e, "transfers_idempotency_key_key") => {
                // A concurrent duplicate won the race; discard our mutation
                // and replay the recorded outcome
                drop(tx);
                let key = intent.idempotency_key.as_deref().unwrap_or_default();
                return self
                    .find_transfer_by_key(key)
                    .await?
                    .ok_or(StoreError::ConflictTimeout);
            }
            Err(e) => return Err(classify(e)),
        };

        tx.commit().await.map_err(classify)?;

        row.into_record()
    }

    async fn find_transfer_by_key(&self, key: &str) -> StoreResult<Option<TransferRecord>> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.map(TransferRow::into_record).transpose()
    }

    async fn record_rejection(
        &self,
        intent: &TransferIntent,
        reject_kind: &str,
    ) -> StoreResult<TransferRecord> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "INSERT INTO transfers \
                 (id, idempotency_key, source_account_id, destination_account_id, amount, status, reject_kind) \
             VALUES ($1, $2, $3, $4, $5, 'rejected', $6) \
             RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(intent.idempotency_key.as_deref())
        .bind(intent.source_account_id)
        .bind(intent.destination_account_id)
        .bind(intent.amount)
        .bind(reject_kind)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "transfers_idempotency_key_key") {
                let key = intent.idempotency_key.clone().unwrap_or_default();
                StoreError::Duplicate(key)
            } else {
                classify(e)
            }
        })?;

        row.into_record()
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3) \
             RETURNING id, email, password_hash, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "users_email_key") {
                StoreError::Duplicate(format!("email {} already registered", email))
            } else {
                classify(e)
            }
        })?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        Ok(user)
    }
}

/// Lock one account row for the remainder of the transaction.
async fn lock_account(
    tx: &mut Transaction<'static, Postgres>,
    id: Uuid,
) -> StoreResult<Account> {
    sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(classify)?
    .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

/// Map sqlx errors, surfacing contention as a retryable conflict.
///
/// 55P03 = lock_not_available, 40001 = serialization_failure,
/// 40P01 = deadlock_detected.
fn classify(e: sqlx::Error) -> StoreError {
    let retryable = match &e {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("55P03") | Some("40001") | Some("40P01")
        ),
        _ => false,
    };
    if retryable {
        StoreError::ConflictTimeout
    } else {
        StoreError::Query(e)
    }
}

fn is_unique_violation(e: &sqlx::Error, constraint: &str) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.constraint() == Some(constraint))
}

/// Raw transfers row; `status` stays TEXT in SQL
#[derive(FromRow)]
struct TransferRow {
    id: Uuid,
    idempotency_key: Option<String>,
    source_account_id: Option<Uuid>,
    destination_account_id: Uuid,
    amount: Amount,
    status: String,
    reject_kind: Option<String>,
    created_at: DateTime<Utc>,
}

impl TransferRow {
    fn into_record(self) -> StoreResult<TransferRecord> {
        let status = TransferStatus::parse(&self.status).ok_or_else(|| {
            StoreError::InvalidInput(format!("unknown transfer status '{}'", self.status))
        })?;
        Ok(TransferRecord {
            id: self.id,
            idempotency_key: self.idempotency_key,
            source_account_id: self.source_account_id,
            destination_account_id: self.destination_account_id,
            amount: self.amount,
            status,
            reject_kind: self.reject_kind,
            created_at: self.created_at,
        })
    }
}
