//! Vaultbank shared domain types
//!
//! Foundation crate for the vaultbank workspace. Everything that crosses a
//! crate boundary lives here:
//!
//! - [`Amount`]: signed minor-unit (cent) amounts with checked arithmetic
//! - [`Account`] / [`AccountNumber`]: balance-holding entities owned by a user
//! - [`TransferRecord`] / [`TransferIntent`]: the durable audit trace of a
//!   balance movement and the transient instruction that produces it
//! - [`User`]: the registered owner of zero or more accounts

pub mod account;
pub mod amount;
pub mod transfer;
pub mod user;

pub use account::{Account, AccountNumber};
pub use amount::{Amount, AmountParseError};
pub use transfer::{TransferIntent, TransferRecord, TransferStatus};
pub use user::User;
