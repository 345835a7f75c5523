use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use user_data_pipeline::cli::{Cli, Command};
use user_data_pipeline::config::PipelineConfig;
use user_data_pipeline::runner;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before the config layer reads PIPELINE__*
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = PipelineConfig::load(Some(cli.config.as_path()))
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    info!(
        "🚀 Starting user data pipeline: {:?} (input {}, output {})",
        cli.command,
        config.paths.input_dir.display(),
        config.paths.output_dir.display()
    );

    let result = match cli.command {
        Command::Clean => runner::clean_shards(&config).await.map(|_| ()),
        Command::Score => runner::score_users(&config).await.map(|_| ()),
        Command::Transactions => runner::structure_transactions(&config).await.map(|_| ()),
        Command::Rules => runner::mine_rules(&config).await.map(|_| ()),
        Command::Seasonality => runner::summarize_seasonality(&config).await.map(|_| ()),
        Command::Run => runner::run_all(&config).await,
    };

    if let Err(e) = &result {
        error!("❌ {:?} failed: {:#}", cli.command, e);
    }

    result
}
