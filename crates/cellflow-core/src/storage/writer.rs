//! Writer for the JSON notebook format.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use super::parser::CellRecord;
use crate::error::Result;
use cellflow_engine::{CellDefinition, CellKind};

#[derive(Serialize)]
struct NotebookOut<'a> {
    cells: &'a [CellRecord],
}

/// Minimal record for a definition.
pub fn definition_to_record(def: &CellDefinition) -> CellRecord {
    let mut record = CellRecord {
        kind: def.kind.type_name().to_string(),
        id: Some(def.id.as_str().to_string()),
        ..CellRecord::default()
    };
    match &def.kind {
        CellKind::Script { source } => record.content = Some(Value::String(source.clone())),
        CellKind::Formula { expression, output } => {
            record.variable_name = Some(output.clone());
            record.formula = Some(expression.clone());
        }
        CellKind::Markdown { template } => record.content = Some(Value::String(template.clone())),
        CellKind::Input { literal, output } => {
            record.variable_name = Some(output.clone());
            record.content = Some(Value::String(literal.clone()));
        }
    }
    record
}

/// Write cell definitions to a notebook file.
pub fn write_notebook(path: &Path, defs: &[CellDefinition]) -> Result<()> {
    let content = write_notebook_content(defs)?;
    fs::write(path, content)?;
    Ok(())
}

/// Serialize cell definitions as notebook JSON.
pub fn write_notebook_content(defs: &[CellDefinition]) -> Result<String> {
    let records: Vec<CellRecord> = defs.iter().map(definition_to_record).collect();
    let mut json = serde_json::to_string_pretty(&NotebookOut { cells: &records })?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::parse_notebook_content;

    #[test]
    fn test_written_notebook_reads_back() {
        let defs = vec![
            CellDefinition::input("i1", "a", "2"),
            CellDefinition::formula("f1", "c", "a * 3"),
            CellDefinition::markdown("m1", "c = {{ c }}"),
            CellDefinition::script("s1", "exports.x = c;"),
        ];
        let json = write_notebook_content(&defs).unwrap();
        assert_eq!(parse_notebook_content(&json).unwrap(), defs);
    }

    #[test]
    fn test_writer_emits_minimal_fields() {
        let json = write_notebook_content(&[CellDefinition::markdown("m1", "hi")]).unwrap();
        assert!(json.contains("\"type\": \"markdown\""));
        assert!(!json.contains("variableName"));
        assert!(!json.contains("formula"));
    }
}
