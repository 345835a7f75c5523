use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::rules_config::RulesConfig;
use super::scoring_config::ScoringConfig;
use crate::error::PipelineError;
use crate::models::columns;

const ENV_PREFIX: &str = "PIPELINE";

/// Top-level configuration for every pipeline stage.
///
/// Loaded from an optional TOML file, then overridden by `PIPELINE__*`
/// environment variables (`PIPELINE__CLEANING__WORKERS=8`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub cleaning: CleaningConfig,
    pub scoring: ScoringConfig,
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Shard selection: files whose extension matches are processed
    pub input_extension: String,
    /// Appended to the shard stem for the cleaned CSV
    pub cleaned_suffix: String,
    pub catalog_path: PathBuf,
    /// Optional TOML replacement for the built-in subcategory table
    pub category_table: Option<PathBuf>,
    pub top_users_file: String,
    pub transactions_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub z_threshold: f64,
    /// Filtered in this order; statistics are recomputed after each pass
    pub outlier_columns: Vec<String>,
    pub required_columns: Vec<String>,
    pub timestamp_columns: Vec<String>,
    pub workers: usize,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/raw"),
            output_dir: PathBuf::from("data/processed"),
            input_extension: "parquet".to_string(),
            cleaned_suffix: "_processed".to_string(),
            catalog_path: PathBuf::from("data/product_catalog.json"),
            category_table: None,
            top_users_file: "top100_high_quality_users.csv".to_string(),
            transactions_file: "structured_transactions.csv".to_string(),
        }
    }
}

fn names(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            outlier_columns: names(&[columns::AGE, columns::INCOME]),
            required_columns: names(&[
                columns::ID,
                columns::AGE,
                columns::INCOME,
                columns::LAST_LOGIN,
                columns::REGISTRATION_DATE,
            ]),
            timestamp_columns: names(&[columns::LAST_LOGIN, columns::REGISTRATION_DATE]),
            workers: 4,
        }
    }
}

impl PipelineConfig {
    /// Layer the TOML file (if it exists) and environment overrides on top of
    /// the defaults, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("Failed to assemble pipeline configuration")?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .context("Failed to deserialize pipeline configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(content).context("Failed to parse pipeline configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.cleaning.workers == 0 {
            return Err(PipelineError::Configuration(
                "cleaning.workers must be at least 1".to_string(),
            ));
        }

        if !(self.cleaning.z_threshold > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "cleaning.z_threshold must be positive, got {}",
                self.cleaning.z_threshold
            )));
        }

        if self.paths.input_extension.trim_start_matches('.').is_empty() {
            return Err(PipelineError::Configuration(
                "paths.input_extension cannot be empty".to_string(),
            ));
        }

        self.scoring.validate()?;
        self.rules.validate()?;

        Ok(())
    }

    pub fn top_users_path(&self) -> PathBuf {
        self.paths.output_dir.join(&self.paths.top_users_file)
    }

    pub fn transactions_path(&self) -> PathBuf {
        self.paths.output_dir.join(&self.paths.transactions_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.cleaning.z_threshold, 3.0);
        assert_eq!(config.cleaning.outlier_columns, vec!["age", "income"]);
        assert_eq!(config.scoring.top_k, 100);
        assert_eq!(config.paths.input_extension, "parquet");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [paths]
            input_dir = "/data/30G"
            input_extension = "csv"

            [cleaning]
            workers = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.input_dir, PathBuf::from("/data/30G"));
        assert_eq!(config.paths.input_extension, "csv");
        assert_eq!(config.paths.cleaned_suffix, "_processed");
        assert_eq!(config.cleaning.workers, 2);
        assert_eq!(config.cleaning.z_threshold, 3.0);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = PipelineConfig::from_toml_str("[cleaning]\nworkers = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_weights_abort_startup() {
        let result = PipelineConfig::from_toml_str(
            r#"
            [scoring.weights]
            age = 0.5
            income = 0.5
            active = 0.5
            purchase = 0.0
            login = 0.0
            "#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[scoring]\ntop_k = 10\n").unwrap();

        let config = PipelineConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.scoring.top_k, 10);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        let config = PipelineConfig::load(Some(missing.as_path())).unwrap();
        assert_eq!(config.scoring.top_k, 100);
    }
}
