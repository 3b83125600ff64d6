use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::orchestrator::{PipelineRun, Stage};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("source file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read source file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed delimited data in {} at line {}: {source}", .path.display(), .line.map_or_else(|| "?".to_string(), |l| l.to_string()))]
    Malformed {
        path: PathBuf,
        line: Option<u64>,
        #[source]
        source: csv::Error,
    },

    #[error("source file {} has no header row", .path.display())]
    MissingHeader { path: PathBuf },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("source is missing expected columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("warehouse connection failed: {message}")]
    Connection { message: String },

    #[error("warehouse constraint violated: {message}")]
    Constraint { message: String },

    #[error("warehouse schema mismatch: {message}")]
    SchemaMismatch { message: String },

    #[error("warehouse error: {message}")]
    Store { message: String },
}

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("failed to launch aggregation command `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("aggregation command `{command}` exited with {}: {}", .code.map_or_else(|| "no status (terminated by signal)".to_string(), |c| format!("status {c}")), .stderr.trim())]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// Machine-readable name of the error class a stage failed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ExtractError,
    TransformError,
    LoadError,
    AggregationError,
    OrchestrationError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ExtractError => "ExtractError",
            ErrorKind::TransformError => "TransformError",
            ErrorKind::LoadError => "LoadError",
            ErrorKind::AggregationError => "AggregationError",
            ErrorKind::OrchestrationError => "OrchestrationError",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("stage {stage} ran without the output of {upstream}")]
    MissingInput { stage: Stage, upstream: Stage },
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Extract(_) => ErrorKind::ExtractError,
            StageError::Transform(_) => ErrorKind::TransformError,
            StageError::Load(_) => ErrorKind::LoadError,
            StageError::Aggregation(_) => ErrorKind::AggregationError,
            StageError::MissingInput { .. } => ErrorKind::OrchestrationError,
        }
    }
}

/// The first stage failure of a run, annotated with where it happened.
#[derive(Error, Debug)]
#[error("pipeline run {} failed at {stage}: {cause}", .run.id)]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub cause: StageError,
    pub run: Box<PipelineRun>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("task '{task}' is already defined")]
    DuplicateTask { task: String },

    #[error("task '{task}' is not defined")]
    UnknownTask { task: String },

    #[error("dependency cycle detected at task '{task}'")]
    CycleDetected { task: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("DB_PORT must be a port number, got '{value}'")]
    InvalidPort { value: String },

    #[error("invalid table name '{0}'")]
    InvalidTable(String),

    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error("no aggregation project directory configured (use --project-dir or [aggregation] project_dir)")]
    MissingProjectDir,
}
