//! API routes

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Credentials (public)
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        // Accounts (authenticated)
        .route("/accounts", post(handlers::account::open_account))
        .route("/accounts", get(handlers::account::list_accounts))
        .route("/accounts/:number", get(handlers::account::get_account))
        .route("/accounts/:number/deposit", post(handlers::account::deposit))
        // Transfers (authenticated)
        .route("/transfers", post(handlers::transfer::create_transfer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
