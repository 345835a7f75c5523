use anyhow::Result;
use polars::prelude::*;
use tracing::debug;

use super::record_sanitizer::float_column;

/// Mean and sample standard deviation of the non-null values of a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
}

impl ColumnStats {
    pub fn from_values(values: &[Option<f64>]) -> Option<Self> {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return None;
        }

        let count = present.len();
        let mean = present.iter().sum::<f64>() / count as f64;
        let std = if count < 2 {
            0.0
        } else {
            let variance =
                present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        };

        Some(ColumnStats { count, mean, std })
    }

    /// Zero for a degenerate column instead of dividing by zero.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std > 0.0 {
            (value - self.mean) / self.std
        } else {
            0.0
        }
    }
}

/// Rows to keep: `|z| <= threshold`. Null values have no z-score and are
/// rejected.
pub fn zscore_mask(values: &[Option<f64>], threshold: f64) -> Vec<bool> {
    let Some(stats) = ColumnStats::from_values(values) else {
        return vec![false; values.len()];
    };

    values
        .iter()
        .map(|v| match v {
            Some(v) => stats.z_score(*v).abs() <= threshold,
            None => false,
        })
        .collect()
}

/// Sequential z-score rejection: each column's statistics are computed over
/// the rows that survived the previous column's pass.
pub struct OutlierFilter {
    threshold: f64,
    columns: Vec<String>,
}

impl OutlierFilter {
    pub fn new(threshold: f64, columns: Vec<String>) -> Self {
        OutlierFilter { threshold, columns }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the filtered frame and the number of rows removed across all
    /// passes.
    pub fn filter(&self, df: DataFrame) -> Result<(DataFrame, usize)> {
        let before = df.height();
        let mut current = df;

        for column in &self.columns {
            current = self.filter_column(current, column)?;
        }

        let removed = before - current.height();
        Ok((current, removed))
    }

    fn filter_column(&self, df: DataFrame, column: &str) -> Result<DataFrame> {
        let values = float_column(&df, column)?;
        let mask = zscore_mask(&values, self.threshold);

        let kept = mask.iter().filter(|keep| **keep).count();
        debug!(
            "Outlier pass on {}: keeping {} of {} rows",
            column,
            kept,
            df.height()
        );

        if kept == df.height() {
            return Ok(df);
        }

        let mask_series = Series::new("mask".into(), mask);
        let filtered = df.filter(mask_series.bool()?)?;
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_sample_std() {
        let stats = ColumnStats::from_values(&some(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]))
            .unwrap();
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        // sample variance = 32 / 7
        assert!((stats.std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_variance_keeps_everything() {
        let values = some(&[50_000.0; 6]);
        assert_eq!(zscore_mask(&values, 3.0), vec![true; 6]);

        let single = some(&[42.0]);
        assert_eq!(zscore_mask(&single, 3.0), vec![true]);
    }

    #[test]
    fn test_far_value_rejected() {
        let mut values = vec![30.0; 20];
        values.push(1000.0);
        let mask = zscore_mask(&some(&values), 3.0);
        assert!(mask[..20].iter().all(|keep| *keep));
        assert!(!mask[20]);
    }

    #[test]
    fn test_nulls_rejected() {
        let mask = zscore_mask(&[Some(1.0), None, Some(2.0)], 3.0);
        assert_eq!(mask, vec![true, false, true]);
        assert_eq!(zscore_mask(&[None, None], 3.0), vec![false, false]);
    }

    #[test]
    fn test_income_stats_use_age_filtered_rows() {
        // Row 20 is an age outlier carrying an extreme income. Once it is
        // gone the remaining incomes are uniform, so nothing else drops.
        let mut ages = vec![30.0; 20];
        ages.push(500.0);
        let mut incomes = vec![1000.0; 20];
        incomes.push(1_000_000.0);

        let df = df! {
            "age" => ages,
            "income" => incomes,
        }
        .unwrap();

        let filter = OutlierFilter::new(3.0, vec!["age".to_string(), "income".to_string()]);
        let (filtered, removed) = filter.filter(df).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(filtered.height(), 20);
    }

    #[test]
    fn test_zero_variance_income_drops_nothing() {
        let df = df! {
            "age" => [25.0, 30.0, 35.0, 40.0],
            "income" => [7000.0, 7000.0, 7000.0, 7000.0],
        }
        .unwrap();

        let filter = OutlierFilter::new(3.0, vec!["income".to_string()]);
        let (filtered, removed) = filter.filter(df).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(filtered.height(), 4);
    }
}
