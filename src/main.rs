use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use summarizer::config::Config;
use summarizer::config_validator::ConfigValidator;
use summarizer::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Resilient text summarization service
#[derive(Debug, Parser)]
#[command(name = "summarizer", version, about)]
struct Cli {
    /// Address to listen on, overrides BIND_ADDR
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log level, overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    ConfigValidator::validate(&config)
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("summarizer={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting summarizer service");
    tracing::info!(
        bind_addr = %config.bind_addr,
        store = if config.uses_redis() { "redis" } else { "memory" },
        model = %config.gemini_model,
        rate_limit = config.enable_rate_limit,
        store_outage_policy = %config.rate_limit_store_policy,
        fallback = config.enable_fallback,
        evaluation = config.enable_auto_evaluation,
        "Configuration loaded"
    );

    let server = Server::new(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
