use super::Document;
use crate::error::Result;
use cellflow_engine::format::format_store_value;
use cellflow_engine::value::parse_literal;
use cellflow_engine::{CellDefinition, CellId, CellKind, PassReport};

impl Document {
    pub fn push_cell(&mut self, def: CellDefinition) -> Result<()> {
        self.engine.push_cell(def)?;
        self.modified = true;
        Ok(())
    }

    pub fn insert_cell(&mut self, def: CellDefinition, at_index: usize) -> Result<()> {
        self.engine.add_cell(def, at_index)?;
        self.modified = true;
        Ok(())
    }

    pub fn remove_cell(&mut self, id: &CellId) -> Result<CellDefinition> {
        let def = self.engine.remove_cell(id)?;
        self.modified = true;
        Ok(def)
    }

    pub fn set_cell_content(&mut self, id: &CellId, content: &str) -> Result<()> {
        self.engine.set_cell_content(id, content)?;
        self.modified = true;
        Ok(())
    }

    pub fn move_cell(&mut self, id: &CellId, to_index: usize) -> Result<()> {
        self.engine.move_cell(id, to_index)?;
        self.modified = true;
        Ok(())
    }

    /// Write a variable from literal text (parsed like an input cell).
    /// Not a document edit, so `modified` is untouched.
    pub fn set_variable(&mut self, name: &str, literal: &str) {
        self.engine.store().set_immediate(name, parse_literal(literal));
    }

    /// Override `name` from the outside: edits the input cell that declares
    /// it, or writes the store directly when no input cell does.
    pub fn override_variable(&mut self, name: &str, literal: &str) -> Result<()> {
        let input = self
            .engine
            .cells()
            .iter()
            .find(|cell| matches!(&cell.kind, CellKind::Input { output, .. } if output == name))
            .map(|cell| cell.id.clone());
        match input {
            Some(id) => self.engine.set_cell_content(&id, literal)?,
            None => self.set_variable(name, literal),
        }
        Ok(())
    }

    /// Evaluate everything and run until quiescent.
    pub fn run(&mut self) -> Vec<PassReport> {
        self.engine.run_all()
    }

    /// Run whatever is pending (edits, variable writes).
    pub fn update(&mut self) -> Vec<PassReport> {
        self.engine.run_until_idle()
    }

    /// `(name, display value)` for every defined variable.
    pub fn variables(&self) -> Vec<(String, String)> {
        let store = self.engine.store();
        store
            .variable_names()
            .into_iter()
            .map(|name| {
                let value = format_store_value(&store.get(&name));
                (name, value)
            })
            .collect()
    }

    pub fn definitions(&self) -> Vec<CellDefinition> {
        self.engine.cells().iter().map(|c| c.definition()).collect()
    }
}
