//! Command-line interface for the pipeline driver.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PipelineConfig;

/// Batch cleaning, scoring and transaction analysis over user snapshot shards
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (TOML). Missing file means defaults
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Override the number of files processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Dedup, drop missing values and reject outliers in every raw shard
    Clean,
    /// Rank users by quality score and write the top K
    Score,
    /// Map purchase histories to main-category transactions
    Transactions,
    /// Mine association rules over the structured transactions
    Rules,
    /// Count purchases by month, quarter and category
    Seasonality,
    /// Every stage in order
    Run,
}

impl Cli {
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(workers) = self.workers {
            config.cleaning.workers = workers;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["user-data-pipeline", "run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("pipeline.toml"));
        assert_eq!(cli.command, Command::Run);
        assert!(cli.workers.is_none());
    }

    #[test]
    fn test_workers_override() {
        let cli = Cli::try_parse_from([
            "user-data-pipeline",
            "--config",
            "custom.toml",
            "--workers",
            "8",
            "score",
        ])
        .unwrap();

        let mut config = PipelineConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.cleaning.workers, 8);
        assert_eq!(cli.command, Command::Score);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["user-data-pipeline"]).is_err());
    }
}
