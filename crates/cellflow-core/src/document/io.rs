use std::path::{Path, PathBuf};

use super::Document;
use crate::error::{CellflowError, Result};
use crate::storage::{parse_notebook, write_markdown, write_notebook};
use cellflow_engine::{EngineConfig, NotebookEngine};

impl Document {
    /// Load a notebook file into a fresh engine. The current document is
    /// only replaced once every cell was accepted.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let defs = parse_notebook(path)?;

        let config: EngineConfig = self.engine.config().clone();
        let mut engine = NotebookEngine::new(config);
        for def in defs {
            engine.push_cell(def)?;
        }

        tracing::debug!(path = %path.display(), cells = engine.cells().len(), "notebook loaded");
        self.engine = engine;
        self.file_path = Some(path.to_path_buf());
        self.modified = false;
        Ok(())
    }

    /// Open a notebook file with the given engine configuration.
    pub fn open(path: &Path, config: EngineConfig) -> Result<Document> {
        let mut doc = Document::with_config(config);
        doc.load_file(path)?;
        Ok(doc)
    }

    /// Save to the current file path.
    /// Returns the path saved to.
    pub fn save_file(&mut self) -> Result<PathBuf> {
        let Some(path) = &self.file_path else {
            return Err(CellflowError::NoFilePath);
        };

        write_notebook(path, &self.definitions())?;
        self.modified = false;
        Ok(path.clone())
    }

    /// Save to a new path and make it the current one.
    pub fn save_as(&mut self, path: &Path) -> Result<PathBuf> {
        self.file_path = Some(path.to_path_buf());
        self.save_file()
    }

    /// Export the evaluated notebook as markdown.
    pub fn export_markdown(&self, path: &Path) -> Result<()> {
        write_markdown(path, &self.engine)?;
        Ok(())
    }
}
