//! Application state shared across handlers

use std::sync::Arc;

use vaultbank_auth::Authorizer;
use vaultbank_ledger::TransferEngine;
use vaultbank_store::AccountStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Account store handle
    pub store: Arc<dyn AccountStore>,
    /// Request authorizer
    pub auth: Arc<Authorizer>,
    /// Ledger transfer engine
    pub engine: TransferEngine,
}

impl AppState {
    /// Create a new application state; the engine shares the store handle.
    pub fn new(store: Arc<dyn AccountStore>, auth: Arc<Authorizer>) -> Self {
        let engine = TransferEngine::new(store.clone());
        Self {
            store,
            auth,
            engine,
        }
    }
}
