//! Auth Service
//! Mission: Multi-tenant registration, login and session lifecycle over HTTP
//! Lifecycle: config → store → engine → sweeper → serve → drain → stop sweeper

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::{future::IntoFuture, path::Path, sync::Arc};
use tokio::{net::TcpListener, sync::Notify};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authservice::{
    api::create_router,
    auth::{AuthEngine, SessionSweeper},
    config::AuthConfig,
    store::{CredentialStore, SqliteCredentialStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    info!("🚀 Auth service starting (v{})", env!("CARGO_PKG_VERSION"));

    let config = AuthConfig::from_env().context("Invalid configuration")?;

    let store: Arc<dyn CredentialStore> = Arc::new(
        SqliteCredentialStore::open(&config.db_path)
            .with_context(|| format!("Failed to open store at {}", config.db_path.display()))?,
    );
    info!("💾 Credential store: {}", config.db_path.display());

    let engine = Arc::new(AuthEngine::from_config(store.clone(), &config));

    let sweeper =
        SessionSweeper::new(store.clone(), config.sweep_interval, config.sweep_timeout).spawn();

    let app = create_router(engine);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    let drain = Arc::new(Notify::new());
    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let drain = drain.clone();
            async move { drain.notified().await }
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        res = &mut server => res.context("Server error")?,
        _ = shutdown_signal() => {
            info!("🛑 Shutdown signal received, draining connections");
            drain.notify_one();
            match tokio::time::timeout(config.shutdown_grace, &mut server).await {
                Ok(res) => res.context("Server error")?,
                Err(_) => warn!(
                    "⚠️  Connections still open after {:?}, exiting anyway",
                    config.shutdown_grace
                ),
            }
        }
    }

    sweeper.stop().await;
    info!("👋 Auth service stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authservice=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Crate directory .env when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
