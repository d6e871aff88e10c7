//! OblivionX key API server.
//!
//! Issues, persists, and validates time-limited access keys gated behind
//! an external key-system link-verification flow.
//!
//! Usage:
//!   oblivion-api --port 3000 --database ./database.json

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use oblivion_keys::{JsonFileStore, KeyEngine};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "oblivion-api")]
#[command(about = "OblivionX key issuance and validation API")]
struct Args {
    /// Port for the HTTP API
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Path to the JSON database file
    #[arg(short, long, default_value = "./database.json")]
    database: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("OblivionX API starting...");
    info!("Database: {}", args.database.display());

    let store = JsonFileStore::new(&args.database);
    let engine = Arc::new(KeyEngine::new(store));
    let app = oblivion_api::build_router(engine);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .context("Failed to bind HTTP port")?;
    info!("OblivionX API running on port {}", args.port);

    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;
    Ok(())
}
