//! Request and response DTOs
//!
//! Amounts cross the wire as decimal strings ("40.00") and are parsed
//! exactly; a value that cannot be represented in minor units is rejected,
//! never rounded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vaultbank_types::Account;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub account_number: String,
    pub balance: String,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            account_number: account.account_number.0,
            balance: account.balance.to_string(),
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequestBody {
    pub source_account_number: String,
    pub destination_account_number: String,
    pub amount: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResponse {
    pub transfer_id: Uuid,
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vaultbank_types::{AccountNumber, Amount};

    #[test]
    fn account_response_formats_balance_as_decimal_string() {
        let account = Account {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            account_number: AccountNumber("ACC0000000042".to_string()),
            balance: Amount::from_minor(6_000),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let response = AccountResponse::from(account);
        assert_eq!(response.balance, "60.00");
        assert_eq!(response.account_number, "ACC0000000042");
    }
}
