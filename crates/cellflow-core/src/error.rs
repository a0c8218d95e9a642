//! Error types for Cellflow core.

use std::path::PathBuf;

use thiserror::Error;

use cellflow_engine::EngineError;

/// Errors from loading, saving and configuring notebooks.
#[derive(Error, Debug)]
pub enum CellflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("Cell record {index}: {message}")]
    Parse { index: usize, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("No file path set")]
    NoFilePath,
}

pub type Result<T> = std::result::Result<T, CellflowError>;
