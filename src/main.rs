use std::path::PathBuf;

use clap::Parser;

use forge_store::Database;
use forge_telemetry::TelemetryConfig;

#[derive(Parser)]
#[command(name = "forge", about = "Proposal collaboration backend")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Path to the SQLite database. Defaults to ~/.forge/database/forge.db.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log in plain text instead of JSON.
    #[arg(long)]
    plain_logs: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    forge_telemetry::init_telemetry(&TelemetryConfig {
        json: !args.plain_logs,
        ..Default::default()
    });

    tracing::info!("Starting forge server");

    let db_path = args
        .db_path
        .unwrap_or_else(|| dirs_home().join(".forge").join("database").join("forge.db"));
    let db = Database::open(&db_path).expect("Failed to open database");
    tracing::info!(path = %db_path.display(), "Database opened");

    let config = forge_server::ServerConfig {
        port: args.port,
        ..Default::default()
    };
    let handle = forge_server::start(config, db)
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "forge server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
