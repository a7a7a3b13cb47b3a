//! Vaultbank API server
//!
//! # Usage
//!
//! ```bash
//! # Against PostgreSQL (DATABASE_URL from the environment or a .env file)
//! vaultbank-server
//!
//! # Local development without a database
//! vaultbank-server --memory-store --dev-mode
//!
//! # Environment overrides
//! VAULTBANK_PORT=8080 JWT_SECRET=... vaultbank-server
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vaultbank_api::{create_router, AppState};
use vaultbank_auth::{AuthConfig, Authorizer, DEFAULT_JWT_SECRET};
use vaultbank_store::{AccountStore, MemoryAccountStore, PgAccountStore, StoreConfig};

/// Vaultbank API server
#[derive(Parser, Debug)]
#[command(name = "vaultbank-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "VAULTBANK_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "VAULTBANK_PORT", default_value_t = 5000)]
    port: u16,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// JWT secret key
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VAULTBANK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (json, pretty)
    #[arg(long, env = "VAULTBANK_LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Run against the in-memory store (no PostgreSQL required)
    #[arg(long, env = "VAULTBANK_MEMORY_STORE")]
    memory_store: bool,

    /// Enable development mode (relaxed security checks)
    #[arg(long, env = "VAULTBANK_DEV_MODE")]
    dev_mode: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_logging(&args)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting vaultbank server"
    );

    let mut auth_config = AuthConfig::default();
    if let Some(secret) = args.jwt_secret.clone() {
        auth_config.jwt_secret = secret;
    }
    validate_config(&auth_config, args.dev_mode)?;

    let store = init_store(&args).await?;
    let auth = Arc::new(Authorizer::new(store.clone(), auth_config));
    let state = Arc::new(AppState::new(store, auth));

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(host = %args.host, port = args.port, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(args: &Args) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match args.log_format.as_str() {
        "json" => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        _ => {
            subscriber.with(fmt::layer().with_target(true)).init();
        }
    }

    Ok(())
}

/// Refuse to start with the placeholder JWT secret outside development.
fn validate_config(auth_config: &AuthConfig, dev_mode: bool) -> anyhow::Result<()> {
    if !dev_mode && auth_config.jwt_secret == DEFAULT_JWT_SECRET {
        anyhow::bail!(
            "JWT secret must be changed in production. Set JWT_SECRET, or pass --dev-mode."
        );
    }
    Ok(())
}

/// Connect the configured account store.
async fn init_store(args: &Args) -> anyhow::Result<Arc<dyn AccountStore>> {
    if args.memory_store {
        tracing::warn!("using in-memory store; data will not survive a restart");
        return Ok(Arc::new(MemoryAccountStore::new()));
    }

    let mut config = StoreConfig::from_env();
    if let Some(url) = &args.database_url {
        config.database_url = url.clone();
    }

    let store = PgAccountStore::connect(&config).await?;
    store.migrate().await?;

    Ok(Arc::new(store))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing() {
        let args = Args::parse_from(["vaultbank-server", "--port", "8080", "--memory-store"]);
        assert_eq!(args.port, 8080);
        assert!(args.memory_store);
    }

    #[test]
    fn default_secret_is_refused_outside_dev_mode() {
        let config = AuthConfig {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            ..AuthConfig::default()
        };
        assert!(validate_config(&config, false).is_err());
        assert!(validate_config(&config, true).is_ok());
    }
}
