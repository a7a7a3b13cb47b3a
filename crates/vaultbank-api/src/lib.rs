//! Vaultbank HTTP API
//!
//! Thin axum surface over the authorizer, store, and transfer engine.
//! Handlers validate input shape and ownership; everything with a real
//! invariant lives below this crate. Error kinds map to transport status in
//! exactly one place ([`error::ApiError::status_code`]).

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
