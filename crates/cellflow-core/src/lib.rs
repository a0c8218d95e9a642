//! cellflow-core - UI-agnostic notebook document, storage and configuration.

pub mod config;
pub mod document;
pub mod error;
pub mod storage;

pub use config::{load_config, user_config_path};
pub use document::Document;
pub use error::{CellflowError, Result};

pub use cellflow_engine::{CellDefinition, CellId, EngineConfig, NotebookEngine};
