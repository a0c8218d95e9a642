//! Script cell execution.
//!
//! A script runs in a fresh Rhai engine with the sandbox capabilities
//! registered and an `exports` object map in scope. Whatever the script leaves
//! in `exports` (plus the entries of a trailing object-map value) becomes its
//! write set.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rhai::{Dynamic, Engine, Map, Scope};

use super::modules::{module_resolver, register_storage};
use crate::analyzer::is_valid_variable_name;
use crate::cell::CellId;
use crate::config::EngineConfig;
use crate::storage::StorageChannel;
use crate::value::StoreValue;

/// Name of the export surface inside a script.
pub const EXPORTS: &str = "exports";

/// A script run requested by the scheduler.
#[derive(Clone, Debug)]
pub struct ScriptJob {
    pub cell_id: CellId,
    pub content_version: u64,
    pub source: String,
    pub inputs: Vec<(String, StoreValue)>,
}

/// What came back from a script run.
#[derive(Clone, Debug)]
pub struct ScriptOutcome {
    pub cell_id: CellId,
    pub content_version: u64,
    pub result: Result<BTreeMap<String, Dynamic>, String>,
    pub logs: Vec<String>,
}

#[derive(Clone)]
pub struct ScriptSandbox {
    config: Arc<EngineConfig>,
    storage: StorageChannel,
}

impl ScriptSandbox {
    pub fn new(config: Arc<EngineConfig>, storage: StorageChannel) -> Self {
        ScriptSandbox { config, storage }
    }

    fn build_engine(&self, logs: &Arc<Mutex<Vec<String>>>) -> Engine {
        let mut engine = Engine::new();
        super::apply_limits(&mut engine, &self.config);
        engine.set_module_resolver(module_resolver(
            &self.config.modules,
            self.config.max_string_size,
        ));
        register_storage(&mut engine, self.storage.clone());

        let printed = Arc::clone(logs);
        engine.on_print(move |text| printed.lock().push(text.to_string()));
        let debugged = Arc::clone(logs);
        engine.on_debug(move |text, _, pos| {
            debugged.lock().push(format!("[debug {}] {}", pos, text));
        });
        engine
    }

    /// Run a job to completion. Never panics on script errors; they come back
    /// in `ScriptOutcome::result`.
    pub fn run(&self, job: ScriptJob) -> ScriptOutcome {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let engine = self.build_engine(&logs);

        let mut scope = Scope::new();
        for (name, value) in &job.inputs {
            scope.push_dynamic(name.as_str(), value.to_dynamic());
        }
        scope.push(EXPORTS, Map::new());

        let result = engine
            .eval_with_scope::<Dynamic>(&mut scope, &job.source)
            .map_err(|e| e.to_string())
            .map(|last| {
                let mut exports = scope.get_value::<Map>(EXPORTS).unwrap_or_default();
                if let Some(map) = last.try_cast::<Map>() {
                    exports.extend(map);
                }
                collect_exports(&job.cell_id, exports)
            });

        let logs = std::mem::take(&mut *logs.lock());
        ScriptOutcome {
            cell_id: job.cell_id,
            content_version: job.content_version,
            result,
            logs,
        }
    }
}

fn collect_exports(cell: &CellId, exports: Map) -> BTreeMap<String, Dynamic> {
    let mut out = BTreeMap::new();
    for (name, value) in exports {
        if is_valid_variable_name(name.as_str()) {
            out.insert(name.to_string(), value);
        } else {
            tracing::warn!(cell = %cell, name = name.as_str(), "export name is not a valid variable");
        }
    }
    out
}
