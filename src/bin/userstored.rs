//! userstored - the user store HTTP server
//!
//! Usage:
//!   userstored serve [--config <path>] [--bind <addr>] [--db-path <path>]
//!   userstored compact [--config <path>]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use userstore::{create_router, AppState, Config, Db, StoreService};

#[derive(Parser)]
#[command(name = "userstored")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults applied for anything missing).
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Override the bind address from the config file.
        #[arg(short, long)]
        bind: Option<String>,

        /// Override the database path from the config file.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Rewrite the database log, dropping tombstones and superseded writes.
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    userstore::init_logging();
    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;

    match cli.command {
        Commands::Serve { bind, db_path } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(db_path) = db_path {
                config.db_path = db_path;
            }
            run_server(&config).await
        }
        Commands::Compact => run_compact(&config).await,
    }
}

async fn run_server(config: &Config) -> Result<()> {
    let db = Db::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database at {:?}", config.db_path))?;
    let store = Arc::new(StoreService::new(Arc::new(db)));
    let state = AppState { store };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!(bind = %config.bind, db_path = ?config.db_path, "userstored listening");

    let shutdown = async {
        signal::ctrl_c().await.ok();
        tracing::info!("shutting down");
    };

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("server error")?;
        }
        _ = shutdown => {}
    }

    Ok(())
}

async fn run_compact(config: &Config) -> Result<()> {
    let db = Db::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database at {:?}", config.db_path))?;
    db.compact().await.context("failed to compact database")?;
    tracing::info!(db_path = ?config.db_path, "compaction complete");
    Ok(())
}
