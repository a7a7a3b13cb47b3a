//! Transfer handler

use std::sync::Arc;

use axum::{extract::State, Json};

use vaultbank_ledger::{TransferOutcome, TransferRequest};
use vaultbank_types::{AccountNumber, Amount, AmountParseError};

use crate::dto::{TransferRequestBody, TransferResponse};
use crate::error::{ApiError, ApiResult};
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

/// Execute a transfer between two accounts
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(body): Json<TransferRequestBody>,
) -> ApiResult<Json<TransferResponse>> {
    let amount: Amount = body
        .amount
        .parse()
        .map_err(|e: AmountParseError| ApiError::InvalidAmount(e.to_string()))?;

    let request = TransferRequest {
        source: AccountNumber(body.source_account_number),
        destination: AccountNumber(body.destination_account_number),
        amount,
        idempotency_key: body.idempotency_key,
    };

    match state.engine.execute(&request, user.user_id).await? {
        TransferOutcome::Applied { transfer_id } => Ok(Json(TransferResponse {
            transfer_id,
            status: "applied",
        })),
        TransferOutcome::Rejected { kind, .. } => Err(ApiError::Transfer(kind)),
    }
}
