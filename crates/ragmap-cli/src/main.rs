//! Ragmap admin server
//!
//! Serves the "tenant → knowledge base" mapping page:
//! - lists every tenant with its resolved knowledge-base name,
//! - adds, re-routes and deletes single tenant rows,
//! - optionally gates access on the operator's email being known to the
//!   identity directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ragmap_identity::{AccessGate, GoogleIdentityDirectory};
use ragmap_storage::PostgrestStore;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod page;
mod server;
mod session;

use app::App;
use config::AppConfig;

#[derive(Parser)]
#[command(name = "ragmap")]
#[command(author, version, about = "Ragmap: tenant → knowledge-base mapping admin")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the mapping page over HTTP.
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Listen address (use `127.0.0.1:0` to auto-pick a free port).
    #[arg(long, default_value = "127.0.0.1:8501")]
    listen: SocketAddr,

    /// TOML secrets file with `[store]` and optional `[identity]` tables.
    ///
    /// `RAGMAP_*` environment variables take precedence over its values.
    #[arg(long)]
    secrets: Option<PathBuf>,

    /// How long a loaded snapshot is served before the store is read again.
    #[arg(long, default_value_t = 60)]
    cache_ttl_secs: u64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_serve(args: ServeArgs) -> Result<()> {
    let config = AppConfig::from_environment(args.secrets.as_deref())?;

    let store = PostgrestStore::new(&config.store_url, &config.store_key)
        .context("failed to set up the mapping store client")?;

    let gate = match config.identity {
        Some(credentials) => {
            let project = credentials.project_id.clone();
            let directory = GoogleIdentityDirectory::new(credentials)
                .context("failed to set up the identity directory client")?;
            tracing::info!(project = %project, "access gate enabled");
            tracing::warn!(
                "access gate only checks that the email exists in the identity directory; \
                 it does not verify ownership of the address or any role"
            );
            AccessGate::new(Arc::new(directory))
        }
        None => {
            tracing::warn!("no identity credentials configured; access gate disabled, every visitor can edit mappings");
            AccessGate::disabled()
        }
    };

    let cache_ttl = Duration::from_secs(args.cache_ttl_secs);
    tracing::info!(ttl_secs = args.cache_ttl_secs, "snapshot cache configured");

    let app = Arc::new(App::new(Arc::new(store), cache_ttl, gate));
    // Keep a handle here: the blocking clients inside must not be dropped
    // from within the runtime.
    let result = server::run(app.clone(), args.listen);
    drop(app);
    result
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => cmd_serve(args),
    }
}
