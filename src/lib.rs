//! Batch pipeline over user/transaction snapshot shards.
//!
//! Shards are cleaned one file at a time (dedup, missing-value drop, z-score
//! outlier rejection, timestamp normalization), then fed to two downstream
//! consumers: user quality scoring and purchase transaction structuring.
//! Structured transactions feed association rule mining and seasonality
//! summaries.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod processor;
pub mod runner;
pub mod storage;

pub use error::{FieldParseError, PipelineError};

/// Common result type used by the orchestration layer
pub type Result<T> = anyhow::Result<T>;
