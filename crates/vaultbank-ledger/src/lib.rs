//! Vaultbank ledger transfer engine
//!
//! Validates a transfer request, acquires the store's consistency guarantees,
//! and applies a paired debit/credit as a single atomic unit.
//!
//! # Invariants
//!
//! 1. The sum of all balances is unchanged by any transfer (conservation)
//! 2. No balance is ever observable below zero, including mid-execution
//! 3. Both legs land or neither does; no partial state is visible
//! 4. A keyed request changes balances at most once, however often it is
//!    redelivered
//!
//! Every path out of [`TransferEngine::execute`] is an explicit result: the
//! deterministic rejections and retryable contention come back as
//! [`TransferOutcome::Rejected`], and only an infrastructure fault becomes an
//! [`EngineError`].

pub mod access;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use vaultbank_store::{AccountStore, StoreError};
use vaultbank_types::{AccountNumber, Amount, TransferIntent, TransferRecord, TransferStatus};

pub use access::{debit_access, Access};

/// Errors that escape the engine
///
/// Everything the caller can act on is a [`TransferOutcome`]; this is only
/// for faults where the store itself could not answer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Why a transfer was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    InvalidAmount,
    SelfTransfer,
    SourceNotFound,
    UnauthorizedSource,
    DestinationNotFound,
    InsufficientFunds,
    ConflictTimeout,
}

impl RejectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectKind::InvalidAmount => "invalid_amount",
            RejectKind::SelfTransfer => "self_transfer",
            RejectKind::SourceNotFound => "source_not_found",
            RejectKind::UnauthorizedSource => "unauthorized_source",
            RejectKind::DestinationNotFound => "destination_not_found",
            RejectKind::InsufficientFunds => "insufficient_funds",
            RejectKind::ConflictTimeout => "conflict_timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invalid_amount" => Some(RejectKind::InvalidAmount),
            "self_transfer" => Some(RejectKind::SelfTransfer),
            "source_not_found" => Some(RejectKind::SourceNotFound),
            "unauthorized_source" => Some(RejectKind::UnauthorizedSource),
            "destination_not_found" => Some(RejectKind::DestinationNotFound),
            "insufficient_funds" => Some(RejectKind::InsufficientFunds),
            "conflict_timeout" => Some(RejectKind::ConflictTimeout),
            _ => None,
        }
    }

    /// Caller-facing message. Never carries store internals, and an
    /// unauthorized source reads exactly like a missing one.
    pub fn message(self) -> &'static str {
        match self {
            RejectKind::InvalidAmount => "amount must be positive with at most 2 decimal places",
            RejectKind::SelfTransfer => "source and destination must be different accounts",
            RejectKind::SourceNotFound | RejectKind::UnauthorizedSource => {
                "source account not found"
            }
            RejectKind::DestinationNotFound => "destination account not found",
            RejectKind::InsufficientFunds => "insufficient funds",
            RejectKind::ConflictTimeout => "transfer could not be completed in time, retry",
        }
    }

    /// Only contention is worth retrying; everything else is deterministic.
    pub fn is_retryable(self) -> bool {
        matches!(self, RejectKind::ConflictTimeout)
    }
}

/// A validated request to move funds between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source: AccountNumber,
    pub destination: AccountNumber,
    pub amount: Amount,
    /// Making retries safe requires a key; without one the engine is atomic
    /// but not exactly-once across redeliveries.
    pub idempotency_key: Option<String>,
}

/// Result of executing a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TransferOutcome {
    Applied {
        transfer_id: Uuid,
    },
    Rejected {
        kind: RejectKind,
        message: String,
    },
}

/// The ledger transfer engine
///
/// Holds nothing but an injected store handle; safe to clone and call from
/// any number of concurrent tasks.
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn AccountStore>,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Validate and execute a transfer on behalf of `authorized_user_id`.
    ///
    /// Validation fails fast in a fixed order: amount, source existence and
    /// ownership, destination existence, self-transfer. The authoritative
    /// balance check runs inside the store's consistency scope, not here;
    /// an earlier read would be stale by the time the mutation lands.
    pub async fn execute(
        &self,
        request: &TransferRequest,
        authorized_user_id: Uuid,
    ) -> EngineResult<TransferOutcome> {
        if let Some(key) = request.idempotency_key.as_deref() {
            match self.store.find_transfer_by_key(key).await {
                Ok(Some(recorded)) => {
                    tracing::debug!(key, "replaying recorded transfer outcome");
                    return Ok(outcome_of_record(&recorded));
                }
                Ok(None) => {}
                Err(StoreError::ConflictTimeout) => {
                    return Ok(rejected(RejectKind::ConflictTimeout))
                }
                Err(e) => return Err(infra(e)),
            }
        }

        if !request.amount.is_positive() {
            return Ok(rejected(RejectKind::InvalidAmount));
        }

        let source = match self.store.find_by_number(&request.source).await {
            Ok(Some(account)) => account,
            Ok(None) => return Ok(rejected(RejectKind::SourceNotFound)),
            Err(StoreError::ConflictTimeout) => return Ok(rejected(RejectKind::ConflictTimeout)),
            Err(e) => return Err(infra(e)),
        };

        if debit_access(authorized_user_id, &source) == Access::Denied {
            tracing::debug!(
                user_id = %authorized_user_id,
                account_number = %source.account_number,
                "debit access denied"
            );
            return Ok(rejected(RejectKind::UnauthorizedSource));
        }

        let destination = match self.store.find_by_number(&request.destination).await {
            Ok(Some(account)) => account,
            Ok(None) => return Ok(rejected(RejectKind::DestinationNotFound)),
            Err(StoreError::ConflictTimeout) => return Ok(rejected(RejectKind::ConflictTimeout)),
            Err(e) => return Err(infra(e)),
        };

        let intent = TransferIntent {
            source_account_id: source.id,
            destination_account_id: destination.id,
            amount: request.amount,
            idempotency_key: request.idempotency_key.clone(),
        };

        if source.id == destination.id {
            return self.reject_recorded(&intent, RejectKind::SelfTransfer).await;
        }

        match self.store.apply_transfer(&intent).await {
            Ok(record) if record.status == TransferStatus::Applied => {
                tracing::info!(
                    transfer_id = %record.id,
                    source = %request.source,
                    destination = %request.destination,
                    amount = %request.amount,
                    "transfer applied"
                );
                Ok(TransferOutcome::Applied {
                    transfer_id: record.id,
                })
            }
            // A keyed duplicate can resolve to a previously recorded rejection
            Ok(record) => Ok(outcome_of_record(&record)),
            Err(StoreError::InsufficientFunds { available, required }) => {
                tracing::debug!(
                    source = %request.source,
                    %available,
                    %required,
                    "transfer rejected: insufficient funds"
                );
                self.reject_recorded(&intent, RejectKind::InsufficientFunds)
                    .await
            }
            // Never recorded under the key: a retry has to be able to succeed
            Err(StoreError::ConflictTimeout) => Ok(rejected(RejectKind::ConflictTimeout)),
            Err(StoreError::NotFound(id)) => {
                // An account vanished between resolution and locking; accounts
                // are never hard-deleted, so treat this as the not-found it is
                let kind = if id == intent.source_account_id.to_string() {
                    RejectKind::SourceNotFound
                } else {
                    RejectKind::DestinationNotFound
                };
                Ok(rejected(kind))
            }
            Err(e) => Err(infra(e)),
        }
    }

    /// Reject with a resolved intent, persisting the outcome when the request
    /// carries an idempotency key so retries replay it.
    async fn reject_recorded(
        &self,
        intent: &TransferIntent,
        kind: RejectKind,
    ) -> EngineResult<TransferOutcome> {
        if intent.idempotency_key.is_some() {
            match self.store.record_rejection(intent, kind.as_str()).await {
                Ok(_) => {}
                Err(StoreError::Duplicate(key)) => {
                    // A concurrent retry recorded first; replay whatever won
                    match self.store.find_transfer_by_key(&key).await {
                        Ok(Some(recorded)) => return Ok(outcome_of_record(&recorded)),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to replay recorded rejection")
                        }
                    }
                }
                Err(e) => {
                    // The rejection itself stands; losing the audit row only
                    // costs replay of a deterministic outcome
                    tracing::warn!(error = %e, kind = kind.as_str(), "failed to record rejection");
                }
            }
        }
        Ok(rejected(kind))
    }
}

fn rejected(kind: RejectKind) -> TransferOutcome {
    TransferOutcome::Rejected {
        kind,
        message: kind.message().to_string(),
    }
}

fn outcome_of_record(record: &TransferRecord) -> TransferOutcome {
    match record.status {
        TransferStatus::Applied => TransferOutcome::Applied {
            transfer_id: record.id,
        },
        TransferStatus::Rejected => {
            // Unknown recorded kinds degrade to a retryable conflict so the
            // caller re-derives a fresh outcome
            let kind = record
                .reject_kind
                .as_deref()
                .and_then(RejectKind::parse)
                .unwrap_or(RejectKind::ConflictTimeout);
            rejected(kind)
        }
    }
}

fn infra(e: StoreError) -> EngineError {
    EngineError::StoreUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultbank_store::MemoryAccountStore;
    use vaultbank_types::Account;

    struct Fixture {
        store: Arc<MemoryAccountStore>,
        engine: TransferEngine,
        owner: Uuid,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(MemoryAccountStore::new());
            let engine = TransferEngine::new(store.clone());
            Self {
                store,
                engine,
                owner: Uuid::new_v4(),
            }
        }

        async fn funded_account(&self, owner: Uuid, minor: i64) -> Account {
            let account = self.store.create_account(owner).await.unwrap();
            if minor > 0 {
                self.store
                    .deposit(account.id, Amount::from_minor(minor))
                    .await
                    .unwrap();
            }
            self.store.find_by_id(account.id).await.unwrap().unwrap()
        }

        async fn balance_of(&self, account: &Account) -> Amount {
            self.store
                .find_by_id(account.id)
                .await
                .unwrap()
                .unwrap()
                .balance
        }
    }

    fn request(source: &Account, destination: &Account, amount: &str) -> TransferRequest {
        TransferRequest {
            source: source.account_number.clone(),
            destination: destination.account_number.clone(),
            amount: amount.parse().unwrap(),
            idempotency_key: None,
        }
    }

    fn assert_rejected(outcome: &TransferOutcome, expected: RejectKind) {
        match outcome {
            TransferOutcome::Rejected { kind, .. } => assert_eq!(*kind, expected),
            other => panic!("expected {expected:?} rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn basic_transfer_scenario() {
        let fx = Fixture::new().await;
        let x = fx.funded_account(fx.owner, 10_000).await;
        let y = fx.funded_account(fx.owner, 0).await;

        // 40.00 from X to Y applies
        let outcome = fx.engine.execute(&request(&x, &y, "40.00"), fx.owner).await.unwrap();
        assert!(matches!(outcome, TransferOutcome::Applied { .. }));
        assert_eq!(fx.balance_of(&x).await, Amount::from_minor(6_000));
        assert_eq!(fx.balance_of(&y).await, Amount::from_minor(4_000));

        // 1000.00 overdraws and changes nothing
        let outcome = fx.engine.execute(&request(&x, &y, "1000.00"), fx.owner).await.unwrap();
        assert_rejected(&outcome, RejectKind::InsufficientFunds);
        assert_eq!(fx.balance_of(&x).await, Amount::from_minor(6_000));
        assert_eq!(fx.balance_of(&y).await, Amount::from_minor(4_000));

        // X to X is refused
        let outcome = fx.engine.execute(&request(&x, &x, "10.00"), fx.owner).await.unwrap();
        assert_rejected(&outcome, RejectKind::SelfTransfer);
        assert_eq!(fx.balance_of(&x).await, Amount::from_minor(6_000));
    }

    #[tokio::test]
    async fn validation_failures_fail_fast_in_order() {
        let fx = Fixture::new().await;
        let x = fx.funded_account(fx.owner, 1_000).await;
        let ghost = AccountNumber("ACC9999999999".to_string());

        // Amount is checked before anything is resolved
        let outcome = fx
            .engine
            .execute(
                &TransferRequest {
                    source: ghost.clone(),
                    destination: ghost.clone(),
                    amount: Amount::ZERO,
                    idempotency_key: None,
                },
                fx.owner,
            )
            .await
            .unwrap();
        assert_rejected(&outcome, RejectKind::InvalidAmount);

        let outcome = fx
            .engine
            .execute(
                &TransferRequest {
                    source: ghost.clone(),
                    destination: x.account_number.clone(),
                    amount: Amount::from_minor(100),
                    idempotency_key: None,
                },
                fx.owner,
            )
            .await
            .unwrap();
        assert_rejected(&outcome, RejectKind::SourceNotFound);

        let outcome = fx
            .engine
            .execute(
                &TransferRequest {
                    source: x.account_number.clone(),
                    destination: ghost,
                    amount: Amount::from_minor(100),
                    idempotency_key: None,
                },
                fx.owner,
            )
            .await
            .unwrap();
        assert_rejected(&outcome, RejectKind::DestinationNotFound);
    }

    #[tokio::test]
    async fn foreign_source_is_indistinguishable_from_missing() {
        let fx = Fixture::new().await;
        let stranger = Uuid::new_v4();
        let theirs = fx.funded_account(stranger, 5_000).await;
        let mine = fx.funded_account(fx.owner, 0).await;

        let outcome = fx
            .engine
            .execute(&request(&theirs, &mine, "1.00"), fx.owner)
            .await
            .unwrap();

        let (kind, message) = match outcome {
            TransferOutcome::Rejected { kind, message } => (kind, message),
            other => panic!("expected rejection, got {other:?}"),
        };
        assert_eq!(kind, RejectKind::UnauthorizedSource);
        assert_eq!(message, RejectKind::SourceNotFound.message());
        assert_eq!(fx.balance_of(&theirs).await, Amount::from_minor(5_000));
    }

    #[tokio::test]
    async fn conservation_across_a_mixed_sequence() {
        let fx = Fixture::new().await;
        let a = fx.funded_account(fx.owner, 50_000).await;
        let b = fx.funded_account(fx.owner, 30_000).await;
        let c = fx.funded_account(fx.owner, 0).await;
        let total = Amount::from_minor(80_000);

        let moves = [
            (&a, &b, "120.00"),
            (&b, &c, "335.50"),
            (&c, &a, "1.25"),
            (&a, &c, "9999.99"), // overdraw, rejected
            (&b, &b, "5.00"),    // self, rejected
            (&c, &b, "0.01"),
        ];
        for (source, destination, amount) in moves {
            fx.engine
                .execute(&request(source, destination, amount), fx.owner)
                .await
                .unwrap();
        }

        let mut sum = Amount::ZERO;
        for account in [&a, &b, &c] {
            sum = sum.checked_add(fx.balance_of(account).await).unwrap();
        }
        assert_eq!(sum, total);
    }

    #[tokio::test]
    async fn interrupted_transfer_has_no_effect() {
        let fx = Fixture::new().await;
        let x = fx.funded_account(fx.owner, 5_000).await;
        let y = fx.funded_account(fx.owner, 0).await;

        fx.store.fail_next_apply();
        let err = fx
            .engine
            .execute(&request(&x, &y, "30.00"), fx.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));

        assert_eq!(fx.balance_of(&x).await, Amount::from_minor(5_000));
        assert_eq!(fx.balance_of(&y).await, Amount::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_never_overdraw() {
        let n: i64 = 4;
        let each: i64 = 2_500;

        // Balance covers all n: every transfer succeeds exactly once
        let fx = Fixture::new().await;
        let x = fx.funded_account(fx.owner, n * each).await;
        let y = fx.funded_account(fx.owner, 0).await;

        let mut tasks = Vec::new();
        for _ in 0..n {
            let engine = fx.engine.clone();
            let req = request(&x, &y, "25.00");
            let owner = fx.owner;
            tasks.push(tokio::spawn(async move {
                engine.execute(&req, owner).await.unwrap()
            }));
        }
        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, TransferOutcome::Applied { .. })));
        assert_eq!(fx.balance_of(&x).await, Amount::ZERO);
        assert_eq!(fx.balance_of(&y).await, Amount::from_minor(n * each));

        // Balance covers n-1: exactly one transfer is rejected
        let fx = Fixture::new().await;
        let x = fx.funded_account(fx.owner, (n - 1) * each).await;
        let y = fx.funded_account(fx.owner, 0).await;

        let mut tasks = Vec::new();
        for _ in 0..n {
            let engine = fx.engine.clone();
            let req = request(&x, &y, "25.00");
            let owner = fx.owner;
            tasks.push(tokio::spawn(async move {
                engine.execute(&req, owner).await.unwrap()
            }));
        }
        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }
        let applied = outcomes
            .iter()
            .filter(|o| matches!(o, TransferOutcome::Applied { .. }))
            .count();
        assert_eq!(applied as i64, n - 1);
        for outcome in &outcomes {
            if let TransferOutcome::Rejected { kind, .. } = outcome {
                assert_eq!(*kind, RejectKind::InsufficientFunds);
            }
        }
        assert_eq!(fx.balance_of(&x).await, Amount::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_pair_cannot_both_win() {
        let fx = Fixture::new().await;
        let x = fx.funded_account(fx.owner, 10_000).await;
        let y = fx.funded_account(fx.owner, 0).await;

        let first = {
            let engine = fx.engine.clone();
            let req = request(&x, &y, "60.00");
            let owner = fx.owner;
            tokio::spawn(async move { engine.execute(&req, owner).await.unwrap() })
        };
        let second = {
            let engine = fx.engine.clone();
            let req = request(&x, &y, "60.00");
            let owner = fx.owner;
            tokio::spawn(async move { engine.execute(&req, owner).await.unwrap() })
        };

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        let applied = [&a, &b]
            .iter()
            .filter(|o| matches!(o, TransferOutcome::Applied { .. }))
            .count();
        assert_eq!(applied, 1);
        assert_eq!(fx.balance_of(&x).await, Amount::from_minor(4_000));
        assert_eq!(fx.balance_of(&y).await, Amount::from_minor(6_000));
    }

    #[tokio::test]
    async fn keyed_retry_applies_once() {
        let fx = Fixture::new().await;
        let x = fx.funded_account(fx.owner, 10_000).await;
        let y = fx.funded_account(fx.owner, 0).await;

        let mut req = request(&x, &y, "40.00");
        req.idempotency_key = Some("pay-rent-2026-08".to_string());

        let first = fx.engine.execute(&req, fx.owner).await.unwrap();
        let second = fx.engine.execute(&req, fx.owner).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fx.balance_of(&x).await, Amount::from_minor(6_000));
        assert_eq!(fx.balance_of(&y).await, Amount::from_minor(4_000));
    }

    #[tokio::test]
    async fn keyed_rejection_replays_after_funding() {
        let fx = Fixture::new().await;
        let x = fx.funded_account(fx.owner, 100).await;
        let y = fx.funded_account(fx.owner, 0).await;

        let mut req = request(&x, &y, "50.00");
        req.idempotency_key = Some("doomed".to_string());

        let first = fx.engine.execute(&req, fx.owner).await.unwrap();
        assert_rejected(&first, RejectKind::InsufficientFunds);

        // Funding the account later must not resurrect the keyed request
        fx.store
            .deposit(x.id, Amount::from_minor(100_000))
            .await
            .unwrap();
        let replay = fx.engine.execute(&req, fx.owner).await.unwrap();
        assert_eq!(first, replay);
        assert_eq!(fx.balance_of(&y).await, Amount::ZERO);
    }
}
