use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;

use spool_core::config::ContextConfig;
use spool_engine::ContextService;
use spool_llm::{GatewayConfig, GatewayProvider};
use spool_server::ServerConfig;
use spool_store::Database;

#[derive(Parser, Debug)]
#[command(name = "spool", about = "Conversation context-budget server", version)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "SPOOL_PORT", default_value_t = 8787)]
    port: u16,

    /// Database path. Defaults to ~/.spool/database/spool.db.
    #[arg(long, env = "SPOOL_DB")]
    db: Option<PathBuf>,

    /// Base URL of the agent gateway used for summary generation.
    #[arg(long, env = "SPOOL_GATEWAY_URL", default_value = "http://127.0.0.1:9100")]
    gateway_url: String,

    /// Bearer token for the agent gateway.
    #[arg(long, env = "SPOOL_GATEWAY_TOKEN")]
    gateway_token: Option<String>,

    /// Model the gateway should summarize with.
    #[arg(long, env = "SPOOL_GATEWAY_MODEL", default_value = "summary-compact")]
    gateway_model: String,

    /// Token budget for a thread's active window.
    #[arg(long, env = "SPOOL_TOKEN_BUDGET", default_value_t = 200_000)]
    token_budget: u32,

    /// Utilization percentage at which compaction triggers.
    #[arg(long, env = "SPOOL_THRESHOLD_PERCENT", default_value_t = 70.0)]
    threshold_percent: f64,

    /// Upper bound in seconds for a single summary-generation call.
    #[arg(long, env = "SPOOL_SUMMARY_TIMEOUT_SECS", default_value_t = 30)]
    summary_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting spool server");

    let db_path = cli
        .db
        .unwrap_or_else(|| dirs_home().join(".spool").join("database").join("spool.db"));
    let db = Database::open(&db_path).expect("Failed to open database");
    tracing::info!(path = %db_path.display(), "Database opened");

    let provider = GatewayProvider::new(GatewayConfig {
        base_url: cli.gateway_url.clone(),
        token: cli.gateway_token.map(SecretString::from),
        model: cli.gateway_model,
    })
    .expect("Failed to build gateway client");
    tracing::info!(gateway = %cli.gateway_url, "Summary gateway configured");

    let context_config = ContextConfig {
        token_budget: cli.token_budget,
        threshold_percent: cli.threshold_percent,
        summary_timeout: Duration::from_secs(cli.summary_timeout_secs),
        ..Default::default()
    };
    let service = Arc::new(ContextService::new(db, Arc::new(provider), context_config));

    let config = ServerConfig {
        port: cli.port,
        ..Default::default()
    };
    let handle = spool_server::start(config, service)
        .await
        .expect("Failed to start server");
    tracing::info!(port = handle.port, "spool server ready");

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
