//! Account access control
//!
//! Ownership policy for debits. A pure function of the (user, account owner)
//! pair; no store access, no side effects. Callers externalize a denial with
//! the same kind and message as a missing account, so probing someone else's
//! account number learns nothing.

use uuid::Uuid;
use vaultbank_types::Account;

/// Access decision for a debit against an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Permitted,
    Denied,
}

/// Decide whether `user_id` may debit `account`.
pub fn debit_access(user_id: Uuid, account: &Account) -> Access {
    if account.owner_id == user_id {
        Access::Permitted
    } else {
        Access::Denied
    }
}
