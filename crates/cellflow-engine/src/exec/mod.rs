//! Cell executors, one per cell variant.
//!
//! - [`formula`] - evaluates a single expression against a value snapshot
//! - [`markdown`] - interpolates `{{ }}` placeholders and applies filters
//! - [`script`] - runs a Rhai body in a sandbox and collects its exports
//! - [`modules`] - the capability set registered into the sandbox

pub mod filters;
pub mod formula;
pub mod markdown;
pub mod modules;
pub mod script;

use rhai::Engine;

use crate::config::EngineConfig;

/// Inputs handed to an executor: each read name with its snapshot value.
pub type Inputs = Vec<(String, crate::value::StoreValue)>;

/// Apply the configured resource limits to a Rhai engine.
pub(crate) fn apply_limits(engine: &mut Engine, config: &EngineConfig) {
    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);
    engine.disable_symbol("eval");
}

/// Engine used for formulas and markdown placeholders: expressions only,
/// no storage or module access.
pub fn create_expression_engine(config: &EngineConfig) -> Engine {
    let mut engine = Engine::new();
    apply_limits(&mut engine, config);
    engine.on_print(|_| {});
    engine.on_debug(|_, _, _| {});
    engine
}
