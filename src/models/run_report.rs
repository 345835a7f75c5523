use std::iter::Sum;
use std::ops::Add;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Row counters for one shard, or the merged totals of a run.
///
/// Merging is plain addition, so per-worker results can be reduced in any
/// order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningStats {
    pub original_rows: usize,
    pub duplicates_removed: usize,
    pub missing_removed: usize,
    pub outliers_removed: usize,
    pub final_rows: usize,
}

impl CleaningStats {
    pub fn removed(&self) -> usize {
        self.duplicates_removed + self.missing_removed + self.outliers_removed
    }

    /// original = removed + kept
    pub fn is_balanced(&self) -> bool {
        self.original_rows == self.removed() + self.final_rows
    }
}

impl Add for CleaningStats {
    type Output = CleaningStats;

    fn add(self, other: CleaningStats) -> CleaningStats {
        CleaningStats {
            original_rows: self.original_rows + other.original_rows,
            duplicates_removed: self.duplicates_removed + other.duplicates_removed,
            missing_removed: self.missing_removed + other.missing_removed,
            outliers_removed: self.outliers_removed + other.outliers_removed,
            final_rows: self.final_rows + other.final_rows,
        }
    }
}

impl Sum for CleaningStats {
    fn sum<I: Iterator<Item = CleaningStats>>(iter: I) -> Self {
        iter.fold(CleaningStats::default(), Add::add)
    }
}

impl<'a> Sum<&'a CleaningStats> for CleaningStats {
    fn sum<I: Iterator<Item = &'a CleaningStats>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone)]
pub enum FileOutcome {
    Cleaned {
        stats: CleaningStats,
        output_path: PathBuf,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub file_name: String,
    pub outcome: FileOutcome,
    pub elapsed: Duration,
}

impl FileReport {
    pub fn stats(&self) -> Option<&CleaningStats> {
        match &self.outcome {
            FileOutcome::Cleaned { stats, .. } => Some(stats),
            FileOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }
}

/// Result of one cleaning run across every shard.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub files: Vec<FileReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(files: Vec<FileReport>, elapsed: Duration) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            files,
            elapsed,
        }
    }

    /// Failed files contribute nothing to the totals.
    pub fn totals(&self) -> CleaningStats {
        self.files.iter().filter_map(FileReport::stats).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| !f.is_failed()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.is_failed())
    }

    pub fn log_summary(&self) {
        let totals = self.totals();

        info!("\n=== Cleaning Summary (run {}) ===", self.run_id);
        info!(
            "✅ Cleaned {} out of {} shards",
            self.succeeded(),
            self.files.len()
        );
        info!("📊 Original rows: {}", totals.original_rows);
        info!("📊 Duplicates removed: {}", totals.duplicates_removed);
        info!("📊 Missing-value rows removed: {}", totals.missing_removed);
        info!("📊 Outlier rows removed: {}", totals.outliers_removed);
        info!("📊 Final rows kept: {}", totals.final_rows);
        info!("⏱️ Total elapsed: {:.2}s", self.elapsed.as_secs_f64());

        for report in &self.files {
            match &report.outcome {
                FileOutcome::Cleaned { stats, .. } if stats.final_rows == 0 => warn!(
                    " - {:<30}: {:.2}s, cleaned but kept 0 of {} rows",
                    report.file_name,
                    report.elapsed.as_secs_f64(),
                    stats.original_rows
                ),
                FileOutcome::Cleaned { stats, .. } => info!(
                    " - {:<30}: {:.2}s, kept {} of {} rows",
                    report.file_name,
                    report.elapsed.as_secs_f64(),
                    stats.final_rows,
                    stats.original_rows
                ),
                FileOutcome::Failed { error: e } => error!(
                    " - {:<30}: ❌ failed after {:.2}s: {}",
                    report.file_name,
                    report.elapsed.as_secs_f64(),
                    e
                ),
            }
        }
    }
}
