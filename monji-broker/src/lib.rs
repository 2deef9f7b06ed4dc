pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod state;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use auth::Authenticator;
use monji_core::{
    CipherKey, CredentialGateway, EnvironmentStore, GrantStore, MemoryStore, SecretCipher,
    SqliteStore, UserDirectory,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use config::{BrokerConfig, CliOverrides};
pub use state::AppState;
pub use telemetry::CorrelationId;

pub async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;

    let listener = TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("failed to bind http listener on {}", config.bind_address))?;
    let http_addr = listener.local_addr()?;
    info!(%http_addr, "http server listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")
}

/// Open the configured store and wire the gateway and authenticator.
pub async fn build_state(config: &BrokerConfig) -> anyhow::Result<AppState> {
    let key = CipherKey::from_base64(&config.encryption_key)
        .context("MONJI_ENCRYPTION_KEY must be base64 of 32 bytes")?;

    if config.uses_memory_store() {
        warn!("using in-memory store; environments and grants are lost on exit");
        return Ok(state_with_store(
            Arc::new(MemoryStore::new()),
            &key,
            config.jwt_secret.as_bytes(),
            config.resource_timeout,
        ));
    }

    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    info!(database = %config.database_url, "sqlite store ready");
    Ok(state_with_store(
        Arc::new(store),
        &key,
        config.jwt_secret.as_bytes(),
        config.resource_timeout,
    ))
}

/// Assemble state over any store that serves all three seams.
pub fn state_with_store<S>(
    store: Arc<S>,
    key: &CipherKey,
    jwt_secret: &[u8],
    resource_timeout: Duration,
) -> AppState
where
    S: EnvironmentStore + GrantStore + UserDirectory + 'static,
{
    let environments: Arc<dyn EnvironmentStore> = store.clone();
    let grants: Arc<dyn GrantStore> = store.clone();
    let users: Arc<dyn UserDirectory> = store;

    let cipher = Arc::new(SecretCipher::new(key));
    let gateway = CredentialGateway::new(environments, grants, cipher)
        .with_resource_timeout(resource_timeout);
    let authenticator = Authenticator::new(jwt_secret, users);
    AppState::new(Arc::new(gateway), Arc::new(authenticator))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(?err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
