//! Cell data structures for the notebook.
//!
//! - [`CellId`] - Stable cell identity
//! - [`CellKind`] - The closed set of cell variants and their content
//! - [`WriteSet`] - What a cell writes, and how sure we are about it
//! - [`Cell`] - A cell with derived reads/writes and its last execution state

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::analyzer::{self, AnalysisError};
use crate::error::CellFault;

/// Stable identifier of a cell, unchanged by edits and moves.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellId(String);

impl CellId {
    pub fn new(id: impl Into<String>) -> Self {
        CellId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CellId {
    fn from(id: &str) -> Self {
        CellId(id.to_string())
    }
}

impl From<String> for CellId {
    fn from(id: String) -> Self {
        CellId(id)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The content of a cell, by variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    /// Rhai script; writes whatever it puts on `exports`.
    Script { source: String },
    /// Single expression written to `output`.
    Formula { expression: String, output: String },
    /// Text with `{{ }}` interpolations; writes nothing.
    Markdown { template: String },
    /// Literal value written to `output`.
    Input { literal: String, output: String },
}

impl CellKind {
    /// The editable text of the cell.
    pub fn content(&self) -> &str {
        match self {
            CellKind::Script { source } => source,
            CellKind::Formula { expression, .. } => expression,
            CellKind::Markdown { template } => template,
            CellKind::Input { literal, .. } => literal,
        }
    }

    /// Replace the editable text, keeping the declared output.
    pub fn set_content(&mut self, content: &str) {
        match self {
            CellKind::Script { source } => *source = content.to_string(),
            CellKind::Formula { expression, .. } => *expression = content.to_string(),
            CellKind::Markdown { template } => *template = content.to_string(),
            CellKind::Input { literal, .. } => *literal = content.to_string(),
        }
    }

    /// Declared output variable (Formula and Input only).
    pub fn output(&self) -> Option<&str> {
        match self {
            CellKind::Formula { output, .. } | CellKind::Input { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellKind::Script { .. } => "script",
            CellKind::Formula { .. } => "formula",
            CellKind::Markdown { .. } => "markdown",
            CellKind::Input { .. } => "input",
        }
    }
}

/// A cell as handed to the engine by the document layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDefinition {
    pub id: CellId,
    pub kind: CellKind,
}

impl CellDefinition {
    pub fn script(id: impl Into<CellId>, source: &str) -> Self {
        CellDefinition {
            id: id.into(),
            kind: CellKind::Script {
                source: source.to_string(),
            },
        }
    }

    pub fn formula(id: impl Into<CellId>, output: &str, expression: &str) -> Self {
        CellDefinition {
            id: id.into(),
            kind: CellKind::Formula {
                expression: expression.to_string(),
                output: output.to_string(),
            },
        }
    }

    pub fn markdown(id: impl Into<CellId>, template: &str) -> Self {
        CellDefinition {
            id: id.into(),
            kind: CellKind::Markdown {
                template: template.to_string(),
            },
        }
    }

    pub fn input(id: impl Into<CellId>, output: &str, literal: &str) -> Self {
        CellDefinition {
            id: id.into(),
            kind: CellKind::Input {
                literal: literal.to_string(),
                output: output.to_string(),
            },
        }
    }
}

/// The variables a cell writes.
///
/// Script exports are only known after a run: before that the set is a
/// static estimate (`Provisional`); after a successful run it is exactly
/// what the script exported (`Confirmed`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WriteSet {
    #[default]
    Unanalyzed,
    Provisional(BTreeSet<String>),
    Confirmed(BTreeSet<String>),
}

impl WriteSet {
    pub fn names(&self) -> BTreeSet<String> {
        match self {
            WriteSet::Unanalyzed => BTreeSet::new(),
            WriteSet::Provisional(names) | WriteSet::Confirmed(names) => names.clone(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            WriteSet::Unanalyzed => false,
            WriteSet::Provisional(names) | WriteSet::Confirmed(names) => names.contains(name),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, WriteSet::Confirmed(_))
    }
}

/// Outcome of the most recent execution attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CellStatus {
    #[default]
    Pending,
    Ok,
    Failed(CellFault),
}

impl CellStatus {
    pub fn fault(&self) -> Option<&CellFault> {
        match self {
            CellStatus::Failed(fault) => Some(fault),
            _ => None,
        }
    }
}

/// A cell inside the engine: definition plus derived and runtime state.
#[derive(Clone, Debug)]
pub struct Cell {
    pub id: CellId,
    pub kind: CellKind,
    pub reads: BTreeSet<String>,
    pub writes: WriteSet,
    pub warnings: Vec<AnalysisError>,
    /// Bumped on every content edit; stale async results are detected with it.
    pub content_version: u64,
    pub status: CellStatus,
    /// Rendered text of a markdown cell.
    pub rendered: Option<String>,
    /// Lines printed by the last script run.
    pub logs: Vec<String>,
}

impl Cell {
    pub(crate) fn new(def: CellDefinition) -> Cell {
        let mut cell = Cell {
            id: def.id,
            kind: def.kind,
            reads: BTreeSet::new(),
            writes: WriteSet::Unanalyzed,
            warnings: Vec::new(),
            content_version: 0,
            status: CellStatus::Pending,
            rendered: None,
            logs: Vec::new(),
        };
        cell.reanalyze();
        cell
    }

    /// Recompute reads/writes from the current content.
    ///
    /// A script keeps the names it confirmed last time in its provisional
    /// estimate so dependents stay wired until the next run settles it.
    pub(crate) fn reanalyze(&mut self) {
        let analysis = analyzer::analyze(&self.kind);
        self.reads = analysis.reads;
        self.warnings = analysis.warnings;
        self.writes = match (&self.kind, analysis.writes, &self.writes) {
            (CellKind::Script { .. }, WriteSet::Provisional(mut estimate), previous) => {
                estimate.extend(previous.names());
                WriteSet::Provisional(estimate)
            }
            (_, writes, _) => writes,
        };
    }

    pub fn definition(&self) -> CellDefinition {
        CellDefinition {
            id: self.id.clone(),
            kind: self.kind.clone(),
        }
    }

    pub fn fault(&self) -> Option<&CellFault> {
        self.status.fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_cell_writes_its_output() {
        let cell = Cell::new(CellDefinition::formula("f1", "c", "a + b"));
        assert_eq!(cell.writes, WriteSet::Confirmed(BTreeSet::from(["c".to_string()])));
        assert!(cell.reads.contains("a") && cell.reads.contains("b"));
    }

    #[test]
    fn test_script_cell_starts_provisional() {
        let cell = Cell::new(CellDefinition::script("s1", "exports.x = 10;"));
        assert_eq!(
            cell.writes,
            WriteSet::Provisional(BTreeSet::from(["x".to_string()]))
        );
        assert!(!cell.writes.is_confirmed());
    }

    #[test]
    fn test_script_reanalysis_keeps_confirmed_names_provisionally() {
        let mut cell = Cell::new(CellDefinition::script("s1", "#{ x: 1 }"));
        cell.writes = WriteSet::Confirmed(BTreeSet::from(["x".to_string()]));
        cell.kind.set_content("#{ x: 2, y: 3 }");
        cell.reanalyze();
        assert_eq!(
            cell.writes,
            WriteSet::Provisional(BTreeSet::from(["x".to_string()]))
        );
    }

    #[test]
    fn test_input_content_and_output() {
        let mut kind = CellKind::Input {
            literal: "1".to_string(),
            output: "a".to_string(),
        };
        kind.set_content("2");
        assert_eq!(kind.content(), "2");
        assert_eq!(kind.output(), Some("a"));
        assert_eq!(kind.type_name(), "input");
    }
}
