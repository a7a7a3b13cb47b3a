//! Transfer intents and records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Amount;

/// Resolved instruction for a paired balance mutation
///
/// Produced by the transfer engine after validation; both account ids are
/// known to refer to distinct, existing accounts at the time of resolution.
/// The store re-establishes everything that matters under its own locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: Amount,
    /// Caller-supplied key making redelivery safe. Without one the transfer
    /// is atomic but not exactly-once across retries.
    pub idempotency_key: Option<String>,
}

/// Terminal state of a recorded transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Applied,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Applied => "applied",
            TransferStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(TransferStatus::Applied),
            "rejected" => Some(TransferStatus::Rejected),
            _ => None,
        }
    }
}

/// Durable audit trace of a transfer attempt
///
/// Doubles as the idempotency lookup table: a keyed retry replays the
/// recorded outcome instead of re-running the mutation. `source_account_id`
/// is `None` for deposit credits, which have no debit leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub idempotency_key: Option<String>,
    pub source_account_id: Option<Uuid>,
    pub destination_account_id: Uuid,
    pub amount: Amount,
    pub status: TransferStatus,
    /// Machine-readable rejection kind, set only when `status` is `Rejected`.
    pub reject_kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [TransferStatus::Applied, TransferStatus::Rejected] {
            assert_eq!(TransferStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TransferStatus::parse("pending"), None);
    }
}
