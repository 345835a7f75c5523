use anyhow::Result;
use polars::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use super::outlier_filter::OutlierFilter;
use super::record_sanitizer::{normalize_timestamp, text_column};
use crate::config::CleaningConfig;
use crate::error::PipelineError;
use crate::models::{CleaningStats, columns};
use crate::storage::shard_store;

/// Per-shard cleaning: dedup -> missing-value drop -> outlier rejection ->
/// timestamp normalization, in that order.
pub struct FileCleaner {
    required_columns: Vec<String>,
    timestamp_columns: Vec<String>,
    outlier_filter: OutlierFilter,
}

impl FileCleaner {
    pub fn new(config: &CleaningConfig) -> Self {
        FileCleaner {
            required_columns: config.required_columns.clone(),
            timestamp_columns: config.timestamp_columns.clone(),
            outlier_filter: OutlierFilter::new(
                config.z_threshold,
                config.outlier_columns.clone(),
            ),
        }
    }

    /// Read one shard, clean it and write the cleaned CSV.
    pub fn clean_file(&self, input: &Path, output: &Path) -> Result<CleaningStats, PipelineError> {
        let file_name = display_name(input);

        info!("Reading shard {}", file_name);
        let df = shard_store::read_frame(input)?;
        info!("Read {} rows from {}", df.height(), file_name);

        self.check_schema(&df, input)?;

        let (mut cleaned, stats) = self
            .clean_frame(df)
            .map_err(|e| PipelineError::file_read(input.display().to_string(), e))?;

        shard_store::write_csv(output, &mut cleaned)?;
        info!(
            "Saved {} rows from {} to {}",
            stats.final_rows,
            file_name,
            output.display()
        );

        Ok(stats)
    }

    pub fn check_schema(&self, df: &DataFrame, path: &Path) -> Result<(), PipelineError> {
        for column in &self.required_columns {
            if df.column(column).is_err() {
                return Err(PipelineError::SchemaViolation {
                    path: path.display().to_string(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    /// In-memory part of the pipeline.
    pub fn clean_frame(&self, df: DataFrame) -> Result<(DataFrame, CleaningStats)> {
        let original_rows = df.height();

        let (df, duplicates_removed) = dedup_by_id(df)?;
        info!("Dedup removed {} rows", duplicates_removed);

        let (df, missing_removed) = drop_missing(df)?;
        info!("Missing-value drop removed {} rows", missing_removed);

        let (df, outliers_removed) = self.outlier_filter.filter(df)?;
        info!(
            "Outlier rejection (|z| > {}) removed {} rows",
            self.outlier_filter.threshold(),
            outliers_removed
        );

        let df = normalize_timestamps(df, &self.timestamp_columns)?;

        let stats = CleaningStats {
            original_rows,
            duplicates_removed,
            missing_removed,
            outliers_removed,
            final_rows: df.height(),
        };

        Ok((df, stats))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Keep the first row for each `id` in file order.
pub fn dedup_by_id(df: DataFrame) -> Result<(DataFrame, usize)> {
    let ids = text_column(&df, columns::ID)?;

    let mut seen: HashSet<Option<String>> = HashSet::with_capacity(ids.len());
    let mask: Vec<bool> = ids.into_iter().map(|id| seen.insert(id)).collect();

    apply_mask(df, mask)
}

/// Drop every row holding a null (or a float NaN) in any column.
pub fn drop_missing(df: DataFrame) -> Result<(DataFrame, usize)> {
    let mut mask = vec![true; df.height()];

    for column in df.get_columns() {
        if column.null_count() > 0 {
            let nulls = column.as_materialized_series().is_null();
            for (keep, is_null) in mask.iter_mut().zip(nulls.into_iter()) {
                if is_null.unwrap_or(false) {
                    *keep = false;
                }
            }
        }

        if matches!(column.dtype(), DataType::Float32 | DataType::Float64) {
            let values = column.cast(&DataType::Float64)?;
            for (keep, value) in mask.iter_mut().zip(values.f64()?.into_iter()) {
                if value.is_some_and(f64::is_nan) {
                    *keep = false;
                }
            }
        }
    }

    apply_mask(df, mask)
}

/// Rewrite timestamp columns to canonical text. Unparsable values become
/// null; the row is kept.
pub fn normalize_timestamps(mut df: DataFrame, timestamp_columns: &[String]) -> Result<DataFrame> {
    for name in timestamp_columns {
        if df.column(name).is_err() {
            continue;
        }

        let normalized: Vec<Option<String>> = text_column(&df, name)?
            .into_iter()
            .map(|value| value.and_then(|v| normalize_timestamp(&v)))
            .collect();

        df.with_column(Series::new(name.as_str().into(), normalized))?;
    }

    Ok(df)
}

fn apply_mask(df: DataFrame, mask: Vec<bool>) -> Result<(DataFrame, usize)> {
    let before = df.height();
    if mask.iter().all(|keep| *keep) {
        return Ok((df, 0));
    }

    let mask_series = Series::new("mask".into(), mask);
    let filtered = df.filter(mask_series.bool()?)?;
    let removed = before - filtered.height();
    Ok((filtered, removed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> FileCleaner {
        FileCleaner::new(&CleaningConfig::default())
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let df = df! {
            "id" => [1i64, 2, 1, 3, 2],
            "fullname" => ["first", "b", "second", "c", "d"],
        }
        .unwrap();

        let (deduped, removed) = dedup_by_id(df).unwrap();
        assert_eq!(removed, 2);

        let names = text_column(&deduped, "fullname").unwrap();
        assert_eq!(
            names,
            vec![
                Some("first".to_string()),
                Some("b".to_string()),
                Some("c".to_string())
            ]
        );
    }

    #[test]
    fn test_null_anywhere_drops_the_row() {
        let df = df! {
            "id" => [Some(1i64), Some(2), Some(3), Some(4)],
            "gender" => [Some("f"), None, Some("m"), Some("f")],
            "income" => [Some(1.0), Some(2.0), Some(f64::NAN), Some(4.0)],
        }
        .unwrap();

        let (kept, removed) = drop_missing(df).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            text_column(&kept, "id").unwrap(),
            vec![Some("1".to_string()), Some("4".to_string())]
        );
    }

    #[test]
    fn test_unparsable_timestamps_become_null_not_dropped() {
        let df = df! {
            "id" => [1i64, 2],
            "last_login" => ["2024-01-02T03:04:05", "soon"],
        }
        .unwrap();

        let normalized = normalize_timestamps(df, &["last_login".to_string()]).unwrap();
        assert_eq!(normalized.height(), 2);
        assert_eq!(
            text_column(&normalized, "last_login").unwrap(),
            vec![Some("2024-01-02 03:04:05".to_string()), None]
        );
    }

    #[test]
    fn test_schema_violation_names_the_column() {
        let df = df! {
            "id" => [1i64],
            "age" => [30.0],
            "income" => [10.0],
            "last_login" => ["2024-01-01"],
        }
        .unwrap();

        let err = cleaner()
            .check_schema(&df, Path::new("part-7.parquet"))
            .unwrap_err();
        match err {
            PipelineError::SchemaViolation { column, .. } => {
                assert_eq!(column, "registration_date")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_clean_frame_counts_each_step() {
        let mut ids: Vec<i64> = (0..30).collect();
        ids.push(0); // duplicate of the first row
        let mut ages = vec![30.0; 31];
        ages[5] = 900.0; // outlier
        let mut genders = vec![Some("f"); 31];
        genders[7] = None; // missing

        let df = df! {
            "id" => ids,
            "age" => ages,
            "income" => vec![5000.0; 31],
            "gender" => genders,
            "last_login" => vec!["2024-02-03 10:00:00"; 31],
            "registration_date" => vec!["bad date"; 31],
        }
        .unwrap();

        let (cleaned, stats) = cleaner().clean_frame(df).unwrap();
        assert_eq!(stats.original_rows, 31);
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(stats.missing_removed, 1);
        assert_eq!(stats.outliers_removed, 1);
        assert_eq!(stats.final_rows, 28);
        assert_eq!(cleaned.height(), 28);
        assert!(stats.is_balanced());

        assert_eq!(cleaned.column("registration_date").unwrap().null_count(), 28);
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let df = df! {
            "id" => (0..50i64).collect::<Vec<_>>(),
            "age" => (0..50).map(|i| 20.0 + (i % 30) as f64).collect::<Vec<_>>(),
            "income" => (0..50).map(|i| 3000.0 + (i * 37 % 500) as f64).collect::<Vec<_>>(),
            "last_login" => vec!["2024-02-03 10:00:00"; 50],
            "registration_date" => vec!["2020-01-01 00:00:00"; 50],
        }
        .unwrap();

        let (once, _) = cleaner().clean_frame(df).unwrap();
        let (twice, stats) = cleaner().clean_frame(once.clone()).unwrap();

        assert_eq!(stats.removed(), 0);
        assert_eq!(twice.height(), once.height());
    }
}
