//! Account handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use futures::TryStreamExt;

use vaultbank_types::{Account, AccountNumber, Amount};

use crate::dto::{AccountResponse, DepositRequest};
use crate::error::{ApiError, ApiResult};
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

/// Open a new account for the caller
pub async fn open_account(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<(StatusCode, Json<AccountResponse>)> {
    let account = state.store.create_account(user.user_id).await?;

    Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
}

/// List the caller's accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<AccountResponse>>> {
    let accounts: Vec<Account> = state
        .store
        .accounts_by_owner(user.user_id)
        .await?
        .try_collect()
        .await?;

    Ok(Json(accounts.into_iter().map(AccountResponse::from).collect()))
}

/// Get one of the caller's accounts by number
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(number): Path<String>,
) -> ApiResult<Json<AccountResponse>> {
    let account = resolve_owned_account(&state, &user, number).await?;
    Ok(Json(AccountResponse::from(account)))
}

/// Deposit into one of the caller's accounts
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(number): Path<String>,
    Json(request): Json<DepositRequest>,
) -> ApiResult<Json<AccountResponse>> {
    let amount: Amount = request
        .amount
        .parse()
        .map_err(|e: vaultbank_types::AmountParseError| ApiError::InvalidAmount(e.to_string()))?;
    if !amount.is_positive() {
        return Err(ApiError::InvalidAmount(
            "amount must be positive".to_string(),
        ));
    }

    let account = resolve_owned_account(&state, &user, number).await?;
    let updated = state.store.deposit(account.id, amount).await?;

    tracing::info!(
        account_number = %updated.account_number,
        amount = %amount,
        "deposit applied"
    );

    Ok(Json(AccountResponse::from(updated)))
}

/// Resolve an account number to an account the caller owns.
///
/// Someone else's account answers exactly like a missing one.
async fn resolve_owned_account(
    state: &AppState,
    user: &AuthenticatedUser,
    number: String,
) -> ApiResult<Account> {
    let account = state
        .store
        .find_by_number(&AccountNumber(number))
        .await?
        .filter(|account| account.owner_id == user.user_id)
        .ok_or_else(|| ApiError::NotFound("account not found".to_string()))?;

    Ok(account)
}
