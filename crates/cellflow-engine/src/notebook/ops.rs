use super::NotebookEngine;
use crate::analyzer::is_valid_variable_name;
use crate::cell::{Cell, CellDefinition, CellId, CellKind, CellStatus};
use crate::error::{EngineError, Result};

fn validate_output(def: &CellDefinition) -> Result<()> {
    match def.kind.output() {
        Some("") => Err(EngineError::NoOutputVariable(def.id.clone())),
        Some(name) if !is_valid_variable_name(name) => {
            Err(EngineError::InvalidVariableName(name.to_string()))
        }
        _ => Ok(()),
    }
}

impl NotebookEngine {
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, id: &CellId) -> Option<&Cell> {
        self.cells.iter().find(|cell| &cell.id == id)
    }

    /// Rendered text of a markdown cell, once it has run.
    pub fn rendered(&self, id: &CellId) -> Option<&str> {
        self.cell(id).and_then(|cell| cell.rendered.as_deref())
    }

    pub fn status(&self, id: &CellId) -> Option<&CellStatus> {
        self.cell(id).map(|cell| &cell.status)
    }

    /// Insert a cell at `at_index` (0..=len) and schedule it.
    pub fn add_cell(&mut self, def: CellDefinition, at_index: usize) -> Result<()> {
        if at_index > self.cells.len() {
            return Err(EngineError::IndexOutOfRange {
                index: at_index,
                len: self.cells.len(),
            });
        }
        if self.cell(&def.id).is_some() {
            return Err(EngineError::DuplicateCell(def.id));
        }
        validate_output(&def)?;

        let cell = Cell::new(def);
        tracing::debug!(cell = %cell.id, kind = cell.kind.type_name(), at_index, "cell added");
        self.scheduler.seed(cell.id.clone());
        self.cells.insert(at_index, cell);
        self.rebuild_graph();
        Ok(())
    }

    /// Append a cell at the end of the notebook.
    pub fn push_cell(&mut self, def: CellDefinition) -> Result<()> {
        self.add_cell(def, self.cells.len())
    }

    /// Remove a cell.
    ///
    /// Variables it wrote that no other cell declares are cleared and dropped
    /// together with their subscribers; cells that read them are rescheduled.
    pub fn remove_cell(&mut self, id: &CellId) -> Result<CellDefinition> {
        let index = self
            .index_of(id)
            .ok_or_else(|| EngineError::UnknownCell(id.clone()))?;
        let cell = self.cells.remove(index);
        self.scheduler.pending_seeds.remove(id);
        self.rebuild_graph();

        for name in cell.writes.names() {
            if self.written_elsewhere(&name, id) {
                continue;
            }
            for reader in self.graph.readers_of(&name) {
                self.scheduler.seed(reader.clone());
            }
            self.store.clear(&name, true);
        }

        tracing::debug!(cell = %id, "cell removed");
        Ok(cell.definition())
    }

    /// Replace a cell's content (script body, expression, template or literal).
    pub fn set_cell_content(&mut self, id: &CellId, content: &str) -> Result<()> {
        let index = self
            .index_of(id)
            .ok_or_else(|| EngineError::UnknownCell(id.clone()))?;
        let cell = &mut self.cells[index];
        if cell.kind.content() == content {
            return Ok(());
        }

        cell.kind.set_content(content);
        cell.content_version += 1;
        cell.reanalyze();
        tracing::debug!(cell = %id, version = cell.content_version, "content edited");

        self.scheduler.seed(id.clone());
        self.rebuild_graph();
        Ok(())
    }

    /// Move a cell to `to_index` (0..len).
    pub fn move_cell(&mut self, id: &CellId, to_index: usize) -> Result<()> {
        let index = self
            .index_of(id)
            .ok_or_else(|| EngineError::UnknownCell(id.clone()))?;
        if to_index >= self.cells.len() {
            return Err(EngineError::IndexOutOfRange {
                index: to_index,
                len: self.cells.len(),
            });
        }
        if index == to_index {
            return Ok(());
        }

        let cell = self.cells.remove(index);
        self.cells.insert(to_index, cell);
        self.scheduler.seed(id.clone());
        self.rebuild_graph();
        Ok(())
    }

    /// Rename the output variable of a formula or input cell.
    ///
    /// The old variable is cleared (subscribers kept) unless another cell
    /// still writes it, and its readers are rescheduled.
    pub fn set_cell_variable(&mut self, id: &CellId, name: &str) -> Result<()> {
        let index = self
            .index_of(id)
            .ok_or_else(|| EngineError::UnknownCell(id.clone()))?;
        if !is_valid_variable_name(name) {
            return Err(EngineError::InvalidVariableName(name.to_string()));
        }

        let cell = &mut self.cells[index];
        let slot = match &mut cell.kind {
            CellKind::Formula { output, .. } | CellKind::Input { output, .. } => output,
            _ => return Err(EngineError::NoOutputVariable(id.clone())),
        };
        if slot.as_str() == name {
            return Ok(());
        }
        let old = std::mem::replace(slot, name.to_string());
        cell.content_version += 1;
        cell.reanalyze();

        self.scheduler.seed(id.clone());
        if !self.written_elsewhere(&old, id) {
            for reader in self.graph.readers_of(&old) {
                self.scheduler.seed(reader.clone());
            }
            self.store.clear(&old, false);
        }
        self.rebuild_graph();
        Ok(())
    }
}
