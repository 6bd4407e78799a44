use anyhow::{Context, Result};
use clap::Parser;
use journal_node::config::NodeConfig;
use journal_node::storage::{JournalStore, MemoryJournalStore, PgJournalStore};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Journal Node Arguments
#[derive(Parser)]
#[clap(name = "journal-node")]
#[clap(about = "Journaling API with JWT auth and model-backed entry analysis")]
struct Args {
    /// Optional configuration file (toml, yaml or json); environment variables win
    #[clap(long)]
    config: Option<PathBuf>,

    /// Override the listening port
    #[clap(long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Keep users and entries in memory instead of Postgres
    #[clap(long)]
    in_memory: bool,

    /// Default log filter when RUST_LOG is unset
    #[clap(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("Starting journal node v{}", env!("CARGO_PKG_VERSION"));

    let mut config = NodeConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    config.validate()?;

    let store: Arc<dyn JournalStore> = if args.in_memory {
        warn!("Using in-memory store, data is lost on exit");
        Arc::new(MemoryJournalStore::new())
    } else {
        let store = PgJournalStore::connect(&config.database_url, config.database_max_connections)
            .await
            .context("failed to connect to database")?;
        store.ensure_schema().await.context("failed to prepare schema")?;
        Arc::new(store)
    };
    info!("Store ready ({})", store.backend());

    journal_node::serve(config, store).await
}
