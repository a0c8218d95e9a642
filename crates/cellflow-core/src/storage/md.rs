//! Markdown export of an evaluated notebook.

use std::fmt::Write as _;
use std::path::Path;

use cellflow_engine::format::format_store_value;
use cellflow_engine::{Cell, CellKind, NotebookEngine};

/// Write the notebook as markdown.
pub fn write_markdown(path: &Path, engine: &NotebookEngine) -> std::io::Result<()> {
    std::fs::write(path, markdown_content(engine))
}

/// Render the notebook as markdown: rendered text for markdown cells,
/// `name = value` lines for formulas and inputs, fenced source plus exports
/// for scripts.
pub fn markdown_content(engine: &NotebookEngine) -> String {
    let mut out = String::new();
    for (i, cell) in engine.cells().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_cell(&mut out, engine, cell);
    }
    out
}

fn write_cell(out: &mut String, engine: &NotebookEngine, cell: &Cell) {
    match &cell.kind {
        CellKind::Markdown { template } => match (cell.fault(), &cell.rendered) {
            (Some(fault), _) => {
                let _ = writeln!(out, "> **Error:** {}", fault);
            }
            (None, Some(text)) => {
                let _ = writeln!(out, "{}", text);
            }
            (None, None) => {
                let _ = writeln!(out, "{}", template);
            }
        },
        CellKind::Formula { output, .. } | CellKind::Input { output, .. } => {
            let value = format_store_value(&engine.get(output));
            let _ = write!(out, "`{}` = {}", output, escape_markdown(&value));
            if let Some(fault) = cell.fault() {
                let _ = write!(out, " ({})", fault);
            }
            out.push('\n');
        }
        CellKind::Script { source } => {
            let _ = writeln!(out, "```rhai");
            let _ = writeln!(out, "{}", source.trim_end());
            let _ = writeln!(out, "```");
            if let Some(fault) = cell.fault() {
                let _ = writeln!(out, "> **Error:** {}", fault);
                return;
            }
            for name in cell.writes.names() {
                let value = format_store_value(&engine.get(&name));
                let _ = writeln!(out, "- `{}` = {}", name, escape_markdown(&value));
            }
        }
    }
}

fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellflow_engine::{CellDefinition, EngineConfig, ManualClock};
    use std::sync::Arc;

    #[test]
    fn test_markdown_export_lists_cells_in_order() {
        let mut engine =
            NotebookEngine::with_clock(EngineConfig::default(), Arc::new(ManualClock::new()));
        engine
            .push_cell(CellDefinition::input("i", "price", "10"))
            .unwrap();
        engine
            .push_cell(CellDefinition::formula("f", "total", "price * 2"))
            .unwrap();
        engine
            .push_cell(CellDefinition::markdown("m", "Total is {{ total }}"))
            .unwrap();
        engine
            .push_cell(CellDefinition::script("s", "exports.half = total / 4;"))
            .unwrap();
        engine.run_until_idle();

        let md = markdown_content(&engine);
        assert_eq!(
            md,
            "`price` = 10\n\n`total` = 20\n\nTotal is 20\n\n```rhai\nexports.half = total / 4;\n```\n- `half` = 5\n"
        );
    }

    #[test]
    fn test_markdown_export_shows_faults() {
        let mut engine =
            NotebookEngine::with_clock(EngineConfig::default(), Arc::new(ManualClock::new()));
        engine
            .push_cell(CellDefinition::formula("f", "bad", "nope()"))
            .unwrap();
        engine.run_until_idle();

        let md = markdown_content(&engine);
        assert!(md.starts_with("`bad` = #ERR! ("));
    }
}
