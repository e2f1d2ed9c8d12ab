//! Auth Service Admin Tool
//!
//! Client provisioning and maintenance against the credential store.
//!
//! Usage:
//!   cargo run --bin authctl -- register-client --name "Mobile App"
//!   cargo run --bin authctl -- check-client --client-id <ID> --secret <SECRET>
//!   cargo run --bin authctl -- --db-path ./authservice.db sweep

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Duration};

use authservice::{
    auth::{engine::generate_refresh_token, AuthEngine, PasswordHasher, SessionSweeper, TokenCodec},
    store::{CredentialStore, SqliteCredentialStore},
};

#[derive(Parser, Debug)]
#[command(name = "authctl")]
#[command(about = "Provision clients and maintain the auth service credential store")]
struct Cli {
    /// Path to the SQLite credential store
    #[arg(long, env = "AUTH_DB_PATH")]
    db_path: Option<PathBuf>,

    /// bcrypt cost for client secrets
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    bcrypt_cost: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a client application and print its credentials
    RegisterClient {
        /// Human-readable client name
        #[arg(long)]
        name: String,
    },

    /// Check a client id / secret pair
    CheckClient {
        #[arg(long)]
        client_id: String,

        #[arg(long, env = "AUTH_CLIENT_SECRET")]
        secret: String,
    },

    /// Purge expired sessions once
    Sweep {
        /// Upper bound on the sweep, in seconds
        #[arg(long, env = "SESSION_SWEEP_TIMEOUT_SECS", default_value = "30")]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authservice=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let db_path = cli
        .db_path
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("authservice.db"));
    let store: Arc<dyn CredentialStore> = Arc::new(
        SqliteCredentialStore::open(&db_path)
            .with_context(|| format!("Failed to open store: {:?}", db_path))?,
    );

    // Admin commands never issue access credentials; a throwaway key suffices
    let engine = AuthEngine::new(
        store.clone(),
        TokenCodec::new(&generate_refresh_token()),
        PasswordHasher::new(cli.bcrypt_cost),
    );

    match cli.command {
        Commands::RegisterClient { name } => {
            let resp = engine.register_client(&name).await;
            if !resp.success {
                bail!("Client registration failed: {}", resp.message);
            }
            println!("Client registered");
            println!("  name:          {}", name.trim());
            println!("  client_id:     {}", resp.client_id.unwrap_or_default());
            println!("  client_secret: {}", resp.client_secret.unwrap_or_default());
            println!();
            println!("Store the secret now; it cannot be shown again.");
        }
        Commands::CheckClient { client_id, secret } => {
            if engine.authenticate_client(&client_id, &secret).await {
                println!("✅ Client credentials valid");
            } else {
                bail!("Client credentials rejected");
            }
        }
        Commands::Sweep { timeout_secs } => {
            let sweeper = SessionSweeper::new(
                store,
                Duration::from_secs(3600),
                Duration::from_secs(timeout_secs.max(1)),
            );
            let purged = sweeper.sweep_once().await?;
            println!("Purged {} expired sessions", purged);
        }
    }

    Ok(())
}
