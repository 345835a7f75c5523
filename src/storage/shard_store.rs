use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::PathsConfig;
use crate::error::PipelineError;

/// Local directory layout for raw shards and cleaned outputs.
#[derive(Debug, Clone)]
pub struct ShardStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
    input_extension: String,
    cleaned_suffix: String,
}

impl ShardStore {
    pub fn new(paths: &PathsConfig) -> Self {
        ShardStore {
            input_dir: paths.input_dir.clone(),
            output_dir: paths.output_dir.clone(),
            input_extension: paths.input_extension.trim_start_matches('.').to_string(),
            cleaned_suffix: paths.cleaned_suffix.clone(),
        }
    }

    pub fn ensure_output_dir(&self) -> Result<(), PipelineError> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| PipelineError::write(self.output_dir.display().to_string(), e))
    }

    /// Raw shards with the configured extension, sorted by file name.
    pub fn list_shards(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let extension = self.input_extension.clone();
        let shards = list_sorted(&self.input_dir, |path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case(extension.as_str()))
                .unwrap_or(false)
        })?;

        info!(
            "Found {} .{} shards in {}",
            shards.len(),
            self.input_extension,
            self.input_dir.display()
        );
        Ok(shards)
    }

    /// `<stem><suffix>.csv` in the output directory.
    pub fn cleaned_path_for(&self, shard: &Path) -> PathBuf {
        let stem = shard
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.output_dir
            .join(format!("{}{}.csv", stem, self.cleaned_suffix))
    }

    /// Cleaned CSVs in the output directory, sorted by file name.
    pub fn list_cleaned(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let suffix = format!("{}.csv", self.cleaned_suffix);
        list_sorted(&self.output_dir, |path| {
            path.file_name()
                .map(|name| name.to_string_lossy().ends_with(&suffix))
                .unwrap_or(false)
        })
    }
}

fn list_sorted(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::file_read(dir.display().to_string(), e))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && keep(path))
        .collect();

    paths.sort();
    Ok(paths)
}

/// Read a Parquet or CSV shard, choosing the reader by extension.
pub fn read_frame(path: &Path) -> Result<DataFrame, PipelineError> {
    let to_error = |e: PolarsError| PipelineError::file_read(path.display().to_string(), e);

    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .map_err(to_error)?
            .finish()
            .map_err(to_error)
    } else {
        let file = File::open(path)
            .map_err(|e| PipelineError::file_read(path.display().to_string(), e))?;
        ParquetReader::new(file).finish().map_err(to_error)
    }
}

/// Read a CSV with every column as text, leaving typing to the sanitizer.
pub fn read_text_frame(path: &Path) -> Result<DataFrame, PipelineError> {
    let to_error = |e: PolarsError| PipelineError::file_read(path.display().to_string(), e);

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(to_error)?
        .finish()
        .map_err(to_error)
}

/// Like [`read_text_frame`], but parses only the `wanted` columns the file
/// has. Missing ones are left for the caller to default or reject.
pub fn read_text_columns(path: &Path, wanted: &[&str]) -> Result<DataFrame, PipelineError> {
    let to_error = |e: PolarsError| PipelineError::file_read(path.display().to_string(), e);
    let text_reader = || {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
    };

    let header = text_reader()
        .with_n_rows(Some(1))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(to_error)?
        .finish()
        .map_err(to_error)?;

    let present: Vec<PlSmallStr> = wanted
        .iter()
        .filter(|name| header.get_column_index(name).is_some())
        .map(|name| PlSmallStr::from(*name))
        .collect();

    text_reader()
        .with_columns(Some(Arc::from(present)))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(to_error)?
        .finish()
        .map_err(to_error)
}

/// Write through a `.tmp` sibling and rename, so a failed write never leaves
/// a truncated file under the final name.
pub fn write_csv(path: &Path, df: &mut DataFrame) -> Result<(), PipelineError> {
    let to_error = |e: &dyn std::fmt::Display| PipelineError::write(path.display().to_string(), e);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| to_error(&e))?;
    }

    let staging = staging_path(path);
    let written = File::create(&staging)
        .map_err(|e| to_error(&e))
        .and_then(|mut file| {
            CsvWriter::new(&mut file)
                .include_header(true)
                .finish(df)
                .map_err(|e| to_error(&e))?;
            file.sync_all().map_err(|e| to_error(&e))
        })
        .and_then(|()| std::fs::rename(&staging, path).map_err(|e| to_error(&e)));

    if written.is_err() {
        let _ = std::fs::remove_file(&staging);
    }
    written
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
