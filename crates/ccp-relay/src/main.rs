use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use ccp_relay::{RelayConfig, RelayServer};

#[derive(Debug, Parser)]
#[command(name = "ccp-relay")]
#[command(about = "Relay between CCP controllers and controlled applications")]
struct Cli {
    /// Path to relay.toml (defaults to the user config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file.
    #[arg(long)]
    bind: Option<String>,

    #[arg(long)]
    max_connections: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = RelayConfig::load(cli.config.as_deref()).context("failed to load relay config")?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(max) = cli.max_connections {
        config.max_connections = max;
    }

    RelayServer::new(config).run().await
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
