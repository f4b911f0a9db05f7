//! RFP assistant server binary
//!
//! Run with: cargo run -p rfp-assistant --bin rfp-assistant-server -- --config rfp.toml

use clap::Parser;
use rfp_assistant::{config::RfpConfig, server::RfpServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rfp-assistant-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "RFP response drafting service", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rfp_assistant=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = RfpConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - LLM: {:?} ({})", config.llm.backend, config.llm.model);
    tracing::info!("  - Memory: {:?}", config.memory.backend);
    tracing::info!("  - Storage: {:?}", config.storage.backend);
    tracing::info!("  - Mermaid: {:?}", config.mermaid.backend);

    let server = RfpServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/info", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
