mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use parley_api::credentials::Credentials;
use parley_api::media::MediaStore;
use parley_api::token::TokenService;
use parley_api::{AppState, AppStateInner, build_router};
use parley_db::Database;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_server=debug,parley_api=debug,parley_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = Database::open(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    let media = MediaStore::new(&config.media_dir)
        .with_context(|| format!("failed to create media dir {}", config.media_dir.display()))?;
    let credentials = Credentials::new().context("failed to initialise password hasher")?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        tokens: TokenService::new(config.jwt_secret.as_bytes(), config.jwt_algorithm),
        credentials,
        media,
        static_token: config.static_token.clone(),
        token_ttl: chrono::Duration::minutes(config.token_ttl_minutes),
    });

    let app = build_router(state);

    let addr = config.addr()?;
    info!(
        "Parley server listening on {} (tokens {:?} for {} min)",
        addr,
        config.jwt_algorithm,
        config.token_ttl_minutes
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Parley server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("Received Ctrl+C, shutting down...");
    }
}
