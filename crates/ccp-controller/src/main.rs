use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use ccp_controller::{AutoOperator, ControllerConfig, HttpPlanner, OperatorInput, StdinOperator};

#[derive(Debug, Parser)]
#[command(name = "ccp-controller")]
#[command(about = "Drive tasks against applications connected to a CCP relay")]
struct Cli {
    /// Path to controller.toml (defaults to the user config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    relay_url: Option<String>,

    #[arg(long)]
    client_id: Option<String>,

    /// HTTP planner endpoint, overrides `[planner] endpoint`.
    #[arg(long)]
    planner_endpoint: Option<String>,

    /// Run the given tasks unattended instead of reading stdin.
    #[arg(long)]
    auto: bool,

    /// Task for unattended mode. Repeatable.
    #[arg(long = "task", requires = "auto")]
    tasks: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config =
        ControllerConfig::load(cli.config.as_deref()).context("failed to load controller config")?;
    if let Some(url) = cli.relay_url {
        config.relay_url = url;
    }
    if let Some(id) = cli.client_id {
        config.client_id = id;
    }
    if let Some(endpoint) = cli.planner_endpoint {
        config.planner.endpoint = Some(endpoint);
    }

    let endpoint = config
        .planner
        .endpoint
        .clone()
        .context("no planner endpoint configured (use --planner-endpoint or [planner] endpoint)")?;
    let planner = Arc::new(HttpPlanner::new(endpoint));

    let operator: Arc<dyn OperatorInput> = if cli.auto {
        Arc::new(AutoOperator::new(cli.tasks))
    } else {
        Arc::new(StdinOperator::new())
    };

    tracing::info!(relay = %config.relay_url, client_id = %config.client_id, "Starting controller");
    let summary = ccp_controller::run(&config, planner, operator).await?;
    println!(
        "completed: {}, failed: {}, aborted: {}",
        summary.completed, summary.failed, summary.aborted
    );
    Ok(())
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
