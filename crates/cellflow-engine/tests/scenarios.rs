//! End-to-end notebook scenarios.

use std::sync::Arc;

use cellflow_engine::{
    CellDefinition, CellFault, CellId, CellOutcome, CellStatus, Dynamic, EngineConfig, ManualClock,
    NotebookEngine, StoreValue,
};

fn engine() -> NotebookEngine {
    NotebookEngine::with_clock(EngineConfig::default(), Arc::new(ManualClock::new()))
}

fn id(s: &str) -> CellId {
    CellId::from(s)
}

#[test]
fn test_formula_sums_store_values() {
    let mut nb = engine();
    nb.store().set("a", Dynamic::from(2_i64));
    nb.store().set("b", Dynamic::from(3_i64));
    nb.flush();
    nb.push_cell(CellDefinition::formula("f1", "c", "a + b"))
        .unwrap();

    let reports = nb.run_until_idle();

    assert_eq!(reports.len(), 1);
    assert_eq!(nb.get("c"), StoreValue::from(5_i64));
    assert_eq!(nb.status(&id("f1")), Some(&CellStatus::Ok));
}

#[test]
fn test_markdown_renders_with_round_filter() {
    let mut nb = engine();
    nb.store().set("a", Dynamic::from(2_i64));
    nb.store().set("b", Dynamic::from(3_i64));
    nb.flush();
    nb.push_cell(CellDefinition::formula("f1", "c", "a + b"))
        .unwrap();
    nb.push_cell(CellDefinition::markdown("m1", "Total: {{c|round,1}}"))
        .unwrap();

    nb.run_until_idle();

    assert_eq!(nb.rendered(&id("m1")), Some("Total: 5.0"));
}

#[test]
fn test_script_edit_propagates_to_formula() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::script("s1", "exports.x = 10;"))
        .unwrap();
    nb.push_cell(CellDefinition::formula("f1", "y", "x * 2"))
        .unwrap();
    nb.run_until_idle();
    assert_eq!(nb.get("y"), StoreValue::from(20_i64));

    nb.set_cell_content(&id("s1"), "exports.x = 20;").unwrap();
    nb.run_until_idle();

    assert_eq!(nb.get("x"), StoreValue::from(20_i64));
    assert_eq!(nb.get("y"), StoreValue::from(40_i64));
}

#[test]
fn test_script_reads_variable_shadowed_by_a_closure_param() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::input("in", "x", "5")).unwrap();
    nb.push_cell(CellDefinition::script(
        "s1",
        "let f = |x| x * 2; exports.z = f.call(1) + x;",
    ))
    .unwrap();

    nb.run_until_idle();
    assert_eq!(nb.get("z"), StoreValue::from(7_i64));

    nb.set_cell_content(&id("in"), "100").unwrap();
    nb.run_until_idle();
    assert_eq!(nb.get("z"), StoreValue::from(102_i64));
    assert_eq!(nb.status(&id("s1")), Some(&CellStatus::Ok));
}

#[test]
fn test_mutual_formulas_form_a_cycle() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::formula("A", "a", "b + 1"))
        .unwrap();
    nb.push_cell(CellDefinition::formula("B", "b", "a + 1"))
        .unwrap();

    let reports = nb.run_until_idle();
    let report = reports.last().unwrap();

    for cell in ["A", "B"] {
        assert_eq!(report.outcome(&id(cell)), Some(&CellOutcome::Skipped));
        let fault = nb.cell(&id(cell)).unwrap().fault().unwrap();
        assert!(fault.is_cycle(), "{} should report a cycle", cell);
    }
    assert!(report.executed().is_empty());
    assert!(nb.get("a").is_error());
    assert!(nb.get("b").is_error());
}

#[test]
fn test_breaking_a_cycle_restores_execution() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::formula("A", "a", "b + 1"))
        .unwrap();
    nb.push_cell(CellDefinition::formula("B", "b", "a + 1"))
        .unwrap();
    nb.run_until_idle();

    nb.set_cell_content(&id("A"), "1").unwrap();
    nb.run_until_idle();

    assert_eq!(nb.get("a"), StoreValue::from(1_i64));
    assert_eq!(nb.get("b"), StoreValue::from(2_i64));
    assert_eq!(nb.status(&id("A")), Some(&CellStatus::Ok));
    assert_eq!(nb.status(&id("B")), Some(&CellStatus::Ok));
}

#[test]
fn test_cycle_broken_by_renaming_output() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::formula("A", "a", "b + 1"))
        .unwrap();
    nb.push_cell(CellDefinition::formula("B", "b", "2"))
        .unwrap();
    nb.set_cell_content(&id("B"), "a + 1").unwrap();
    nb.run_until_idle();
    assert!(nb.cell(&id("B")).unwrap().fault().unwrap().is_cycle());

    nb.set_cell_variable(&id("A"), "a2").unwrap();
    nb.run_until_idle();

    // A now reads b but nothing reads a2 back; B reads a, which no longer exists.
    assert!(!nb.cell(&id("A")).unwrap().fault().is_some_and(|f| f.is_cycle()));
    assert!(!nb.cell(&id("B")).unwrap().fault().is_some_and(|f| f.is_cycle()));
    assert!(nb.get("a").is_undefined());
}

#[test]
fn test_script_failure_is_isolated() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::script("s1", "exports.x = 1; throw \"bad input\";"))
        .unwrap();
    nb.push_cell(CellDefinition::formula("dep", "y", "x + 1"))
        .unwrap();
    nb.push_cell(CellDefinition::formula("free", "z", "2 + 3"))
        .unwrap();

    let reports = nb.run_until_idle();
    let report = reports.last().unwrap();

    let script_fault = nb.cell(&id("s1")).unwrap().fault().cloned().unwrap();
    assert!(matches!(script_fault, CellFault::Execution { .. }));
    assert!(script_fault.to_string().contains("bad input"));

    assert_eq!(
        nb.status(&id("dep")),
        Some(&CellStatus::Failed(CellFault::Upstream {
            variable: "x".to_string(),
            origin: id("s1"),
        }))
    );
    assert!(nb.get("y").is_error());
    assert_eq!(nb.get("z"), StoreValue::from(5_i64));
    assert_eq!(report.outcome(&id("free")), Some(&CellOutcome::Success));
}

#[test]
fn test_upstream_error_reaches_whole_chain() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::formula("f1", "a", "undefined_fn(1)"))
        .unwrap();
    nb.push_cell(CellDefinition::formula("f2", "b", "a * 2"))
        .unwrap();
    nb.push_cell(CellDefinition::markdown("m", "b is {{ b }}"))
        .unwrap();
    nb.run_until_idle();

    for cell in ["f2", "m"] {
        let fault = nb.cell(&id(cell)).unwrap().fault().cloned().unwrap();
        assert_eq!(fault.origin(), &id("f1"));
    }
    assert_eq!(nb.rendered(&id("m")), None);
}

#[test]
fn test_rerun_with_same_inputs_is_idempotent() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::input("in", "price", "19.99"))
        .unwrap();
    nb.push_cell(CellDefinition::formula("tax", "total", "price * 1.2"))
        .unwrap();
    nb.push_cell(CellDefinition::markdown("m", "Pay {{ total | currency,$,2 }}"))
        .unwrap();
    nb.run_all();
    let first = (nb.get("total"), nb.rendered(&id("m")).map(str::to_string));

    nb.run_all();
    let second = (nb.get("total"), nb.rendered(&id("m")).map(str::to_string));

    assert_eq!(first, second);
    assert_eq!(second.1.as_deref(), Some("Pay $23.99"));
}

#[test]
fn test_sigil_formula_reads_same_variable() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::input("in", "rate", "4"))
        .unwrap();
    nb.push_cell(CellDefinition::formula("f1", "out", "$rate + rate"))
        .unwrap();
    nb.run_until_idle();

    assert_eq!(nb.get("out"), StoreValue::from(8_i64));
    assert_eq!(
        nb.cell(&id("f1")).unwrap().reads.iter().collect::<Vec<_>>(),
        vec!["rate"]
    );
}

#[test]
fn test_script_imports_allowlisted_module() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::script("data", "exports.values = [1, 2, 3, 6];"))
        .unwrap();
    nb.push_cell(CellDefinition::script(
        "summary",
        "import \"stats\" as s; exports.m = s::mean(values);",
    ))
    .unwrap();
    nb.run_until_idle();

    assert_eq!(nb.get("m").as_f64(), Some(3.0));
}

#[test]
fn test_storage_writes_do_not_trigger_passes() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::script(
        "s1",
        "storage_set(\"seen\", 1); exports.ok = storage_has(\"seen\");",
    ))
    .unwrap();
    nb.run_until_idle();
    let generation = nb.generation();

    assert_eq!(nb.get("ok"), StoreValue::from(true));
    assert!(nb.storage().has_storage_key("seen"));
    assert!(nb.run_until_idle().is_empty());
    assert_eq!(nb.generation(), generation);
}

#[test]
fn test_script_logs_are_captured() {
    let mut nb = engine();
    nb.push_cell(CellDefinition::script("s1", "print(\"hello\"); exports.v = 1;"))
        .unwrap();
    nb.run_until_idle();

    assert_eq!(nb.cell(&id("s1")).unwrap().logs, vec!["hello"]);
}
