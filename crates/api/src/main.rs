//! Authgate API server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use authgate_api::{
    auth::{Argon2PasswordEncoder, CredentialStore, InMemoryCredentialStore, LoggingSmsSender},
    create_router, housekeeping, AppState, Config, LogFormat,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(format: LogFormat) {
    let json = format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,authgate_api=debug,tower_http=info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(config.log_format);

    tracing::info!(
        bind_address = %config.bind_address,
        max_sessions = config.max_sessions,
        prevent_login_when_full = config.prevent_login_when_full,
        failure_status = config.failure_status.as_u16(),
        "Starting Authgate API"
    );

    let credentials: Arc<dyn CredentialStore> = match &config.credentials_file {
        Some(path) => Arc::new(
            InMemoryCredentialStore::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
        ),
        None => {
            tracing::warn!("CREDENTIALS_FILE not set; no principal can log in");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let bind_address = config.bind_address.clone();
    let state = AppState::new(
        config,
        credentials,
        Arc::new(Argon2PasswordEncoder),
        Arc::new(LoggingSmsSender),
    );

    let sweeper = housekeeping::spawn_sweeper(state.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    sweeper.abort();
    Ok(())
}
