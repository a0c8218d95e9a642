//! Parser for the JSON notebook format.
//!
//! A notebook is either `{ "cells": [ ... ] }` or a bare array of cell
//! records. Fields other than the ones below are ignored.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CellflowError, Result};
use cellflow_engine::CellDefinition;

/// One persisted cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NotebookFile {
    Wrapped { cells: Vec<CellRecord> },
    Bare(Vec<CellRecord>),
}

/// Parse a notebook file into cell definitions, in order.
pub fn parse_notebook(path: &Path) -> Result<Vec<CellDefinition>> {
    let content = fs::read_to_string(path)?;
    parse_notebook_content(&content)
}

/// Parse notebook JSON from a string.
pub fn parse_notebook_content(content: &str) -> Result<Vec<CellDefinition>> {
    let records = match serde_json::from_str::<NotebookFile>(content)? {
        NotebookFile::Wrapped { cells } => cells,
        NotebookFile::Bare(cells) => cells,
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| record_to_definition(index, record))
        .collect()
}

/// Content fields may hold numbers or booleans (input cells); keep their JSON text.
fn text(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

/// Convert a record at position `index` into a cell definition.
///
/// A record without an id gets `cell-<n>` (1-based).
pub fn record_to_definition(index: usize, record: CellRecord) -> Result<CellDefinition> {
    let id = record
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("cell-{}", index + 1));

    let variable = |record_kind: &str| -> Result<String> {
        record
            .variable_name
            .clone()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CellflowError::Parse {
                index,
                message: format!("{} cell `{}` has no variableName", record_kind, id),
            })
    };

    let def = match record.kind.trim().to_ascii_lowercase().as_str() {
        "script" | "code" => CellDefinition::script(id.as_str(), &text(record.content)),
        "formula" => {
            let output = variable("formula")?;
            let expression = match record.formula {
                Some(formula) => formula,
                None => text(record.content),
            };
            CellDefinition::formula(id.as_str(), &output, &expression)
        }
        "markdown" | "md" => CellDefinition::markdown(id.as_str(), &text(record.content)),
        "input" => {
            let output = variable("input")?;
            CellDefinition::input(id.as_str(), &output, &text(record.content))
        }
        other => {
            return Err(CellflowError::Parse {
                index,
                message: format!("unknown cell type `{}`", other),
            });
        }
    };
    Ok(def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellflow_engine::CellKind;

    #[test]
    fn test_parse_wrapped_document() {
        let json = r#"{
            "title": "ignored",
            "cells": [
                {"type": "input", "id": "i1", "variableName": "a", "content": 2},
                {"type": "formula", "id": "f1", "variableName": "c", "formula": "a + 1"},
                {"type": "markdown", "id": "m1", "content": "c is {{ c }}", "collapsed": true},
                {"type": "script", "id": "s1", "content": "exports.x = 1;"}
            ]
        }"#;
        let defs = parse_notebook_content(json).unwrap();
        assert_eq!(defs.len(), 4);
        assert_eq!(
            defs[0].kind,
            CellKind::Input {
                literal: "2".to_string(),
                output: "a".to_string()
            }
        );
        assert_eq!(defs[1].kind.content(), "a + 1");
        assert_eq!(defs[3].id.as_str(), "s1");
    }

    #[test]
    fn test_parse_bare_array_and_formula_fallback() {
        let json = r#"[{"type": "formula", "variableName": "y", "content": "x * 2"}]"#;
        let defs = parse_notebook_content(json).unwrap();
        assert_eq!(defs[0].id.as_str(), "cell-1");
        assert_eq!(defs[0].kind.content(), "x * 2");
        assert_eq!(defs[0].kind.output(), Some("y"));
    }

    #[test]
    fn test_formula_without_variable_is_rejected() {
        let json = r#"[{"type": "markdown", "content": "hi"}, {"type": "formula", "formula": "1"}]"#;
        let err = parse_notebook_content(json).unwrap_err();
        assert!(matches!(err, CellflowError::Parse { index: 1, .. }));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"[{"type": "chart", "id": "c"}]"#;
        assert!(matches!(
            parse_notebook_content(json),
            Err(CellflowError::Parse { index: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_json_is_reported() {
        assert!(matches!(
            parse_notebook_content("{ not json"),
            Err(CellflowError::Json(_))
        ));
    }
}
