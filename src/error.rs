use thiserror::Error;

/// Failures that end processing of a single shard, or the whole run for
/// configuration problems.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read shard {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("shard {path} is missing required column `{column}`")]
    SchemaViolation { path: String, column: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("no usable records produced for {0}")]
    EmptyOutput(String),
}

impl PipelineError {
    pub fn file_read(path: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::FileRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(path: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Field-level parse failures. These never cross the extraction boundary:
/// callers recover with a documented default.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldParseError {
    #[error("malformed embedded document: {0}")]
    Document(String),

    #[error("unparsable timestamp `{0}`")]
    Timestamp(String),

    #[error("not a number: `{0}`")]
    Numeric(String),
}
