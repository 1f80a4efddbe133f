use anyhow::{Context, Result};
use secureface_core::{EnrollmentWorkflow, ResolutionEngine};
use secureface_facepp::FaceppClient;
use secureface_store::SqliteStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod http;
mod notifier;

use config::Config;
use http::AppState;
use notifier::EmailNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("securefaced starting");

    // Fail fast: every required setting and resource is checked before serving.
    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!(
        listen = %config.listen_addr,
        api = %config.facepp.base_url,
        faceset = %config.facepp.faceset_token,
        database = %config.database_url,
        threshold = config.match_threshold,
        alert_recipient = %config.alert.recipient,
        "configuration loaded"
    );

    let provider = Arc::new(FaceppClient::new(config.facepp.clone())?);
    let store = Arc::new(
        SqliteStore::open(&config.database_url)
            .await
            .with_context(|| format!("failed to open database {}", config.database_url))?,
    );
    tracing::info!("identity store opened");

    let notifier = Arc::new(EmailNotifier::new(&config.alert).context("invalid SMTP settings")?);

    let state = Arc::new(AppState {
        resolver: ResolutionEngine::new(provider.clone(), store.clone(), notifier)
            .with_threshold(config.match_threshold),
        enroller: EnrollmentWorkflow::new(provider.clone(), store.clone()),
        store,
        faceset: provider,
    });

    let app = http::router(state, config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "securefaced ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("securefaced shutting down");
    Ok(())
}
