use std::path::PathBuf;

use cellflow_engine::{EngineConfig, NotebookEngine};

/// A notebook as the user works on it: the engine plus file bookkeeping.
pub struct Document {
    pub engine: NotebookEngine,
    /// Current file path
    pub file_path: Option<PathBuf>,
    /// Whether cells changed since the last save
    pub modified: bool,
}

impl Document {
    /// Create an empty document.
    ///
    /// This constructor is side-effect free: it does not touch the filesystem.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_engine(NotebookEngine::new(config))
    }

    pub fn with_engine(engine: NotebookEngine) -> Self {
        Document {
            engine,
            file_path: None,
            modified: false,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
