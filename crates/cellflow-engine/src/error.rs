//! Error types for the Cellflow engine.
//!
//! Two families live here:
//!
//! - [`EngineError`] is returned from engine entry points (editing cells,
//!   structural maintenance). These are caller mistakes.
//! - [`CellFault`] is the per-cell failure state. It never escapes the
//!   scheduler as a Rust error; it is stored as an error marker in the
//!   variable store so subscribers and dependent cells can see it.

use thiserror::Error;

use crate::cell::CellId;

/// Errors returned by [`crate::NotebookEngine`] operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown cell: {0}")]
    UnknownCell(CellId),

    #[error("Duplicate cell id: {0}")]
    DuplicateCell(CellId),

    #[error("Index {index} out of range (notebook has {len} cells)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Cell {0} does not declare an output variable")]
    NoOutputVariable(CellId),

    #[error("Invalid variable name: {0:?}")]
    InvalidVariableName(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure state of a single cell, carried through the store as an error value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CellFault {
    /// The cell sits on a dependency cycle and was not executed.
    #[error("Circular dependency: {}", format_path(path))]
    Cycle { cell: CellId, path: Vec<CellId> },

    /// The cell's executor raised an error.
    #[error("{message}")]
    Execution { cell: CellId, message: String },

    /// An input variable holds an error marker written by another cell.
    #[error("Upstream error in `{variable}` (from cell {origin})")]
    Upstream { variable: String, origin: CellId },
}

impl CellFault {
    /// The cell where the failure started.
    pub fn origin(&self) -> &CellId {
        match self {
            CellFault::Cycle { cell, .. } => cell,
            CellFault::Execution { cell, .. } => cell,
            CellFault::Upstream { origin, .. } => origin,
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, CellFault::Cycle { .. })
    }
}

fn format_path(path: &[CellId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
