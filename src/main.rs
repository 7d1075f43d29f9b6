use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hub_gateway::config::GatewayConfig;
use hub_gateway::Gateway;

#[derive(Parser)]
#[command(name = "hub-gateway", version, about = "Local AI infrastructure gateway")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address override
    #[arg(long)]
    host: Option<String>,

    /// Port override
    #[arg(long)]
    port: Option<u16>,

    /// Catalog document override
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hub_gateway=info,tower_http=warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut config =
        GatewayConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(catalog) = cli.catalog {
        config.persistence.catalog_path = catalog;
    }

    let gateway = Gateway::new(config)
        .await
        .context("failed to assemble gateway")?;

    tokio::select! {
        result = gateway.serve() => {
            result.context("http server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            gateway.shutdown();
        }
    }
    Ok(())
}
