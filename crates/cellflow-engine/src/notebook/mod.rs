//! The notebook engine facade.
//!
//! `NotebookEngine` owns the store, the cells, the dependency graph and the
//! scheduler. Everything outside the engine goes through it (cell edits) or
//! through the [`VariableStore`] handle it hands out (get/set/subscribe).
//!
//! The implementation is split like the document layer:
//! - `ops.rs` - cell maintenance (add, remove, edit, move, rename)
//! - `pass.rs` - driving execution passes

mod ops;
mod pass;

use std::sync::Arc;

use rhai::Engine;

use crate::cell::{Cell, CellId};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::exec::create_expression_engine;
use crate::exec::script::ScriptSandbox;
use crate::graph::DependencyGraph;
use crate::scheduler::{Scheduler, SchedulerState};
use crate::storage::StorageChannel;
use crate::store::VariableStore;
use crate::value::StoreValue;

pub struct NotebookEngine {
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
    store: VariableStore,
    storage: StorageChannel,
    cells: Vec<Cell>,
    graph: DependencyGraph,
    scheduler: Scheduler,
    /// Shared by formulas and markdown placeholders.
    expressions: Engine,
    sandbox: ScriptSandbox,
}

impl NotebookEngine {
    /// Create an empty notebook running on wall-clock time.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create an empty notebook on the given time source.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let config = Arc::new(config);
        let storage = StorageChannel::new();
        NotebookEngine {
            expressions: create_expression_engine(&config),
            sandbox: ScriptSandbox::new(Arc::clone(&config), storage.clone()),
            store: VariableStore::new(Arc::clone(&clock)),
            storage,
            cells: Vec::new(),
            graph: DependencyGraph::default(),
            scheduler: Scheduler::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle to the variable store. Clones share state with the engine.
    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn storage(&self) -> &StorageChannel {
        &self.storage
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state
    }

    /// Number of passes started so far.
    pub fn generation(&self) -> u64 {
        self.scheduler.generation
    }

    /// Shorthand for `store().get(name)`.
    pub fn get(&self, name: &str) -> StoreValue {
        self.store.get(name)
    }

    pub(crate) fn index_of(&self, id: &CellId) -> Option<usize> {
        self.cells.iter().position(|cell| &cell.id == id)
    }

    /// Whether a cell other than `except` declares `name` as an output.
    pub(crate) fn written_elsewhere(&self, name: &str, except: &CellId) -> bool {
        self.cells
            .iter()
            .any(|cell| &cell.id != except && cell.writes.contains(name))
    }

    /// Rebuild the graph from the current cells.
    ///
    /// Cells whose cycle membership changed are seeded so their status is
    /// refreshed by the next pass.
    pub(crate) fn rebuild_graph(&mut self) {
        self.graph = DependencyGraph::build(&self.cells);
        for cell in &self.cells {
            let blocked = cell.fault().is_some_and(|f| f.is_cycle());
            let on_cycle = self.graph.cycle_of(&cell.id).is_some();
            if blocked != on_cycle {
                self.scheduler.seed(cell.id.clone());
            }
        }
        if self.graph.has_cycles() {
            tracing::debug!("dependency graph has cycles");
        }
    }
}

impl Default for NotebookEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
