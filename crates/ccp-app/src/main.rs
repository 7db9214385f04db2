use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use ccp_app::{AppConfig, DemoShop, DEMO_SHOP_ID};

#[derive(Debug, Parser)]
#[command(name = "ccp-demo-shop")]
#[command(about = "Demo food-ordering application controllable over a CCP relay")]
struct Cli {
    /// Path to app.toml (defaults to the user config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    relay_url: Option<String>,

    #[arg(long)]
    software_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load app config")?;
    if let Some(url) = cli.relay_url {
        config.relay_url = url;
    }
    if let Some(id) = cli.software_id {
        config.software_id = Some(id);
    }

    let software_id = config.software_id.clone().unwrap_or_else(|| DEMO_SHOP_ID.to_string());
    tracing::info!(software_id = %software_id, relay = %config.relay_url, "Starting demo shop");
    ccp_app::run(&config, DemoShop::new(software_id)).await
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
