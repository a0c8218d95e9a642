//! Execution scheduler state.
//!
//! The scheduler moves through
//! `Idle -> Collecting -> Ordering -> Executing -> Committing -> (Idle | Collecting)`.
//! The driving logic lives on [`crate::NotebookEngine`] (see `notebook/pass.rs`);
//! this module holds the bookkeeping it works on.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::mpsc::{Receiver, Sender, channel};

use crate::cell::CellId;
use crate::error::CellFault;
use crate::exec::script::ScriptOutcome;
use crate::value::StoreValue;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchedulerState {
    #[default]
    Idle,
    /// Writes are arriving; the burst has not settled yet.
    Collecting,
    Ordering,
    Executing,
    /// Last cell finished; buffered writes decide whether another pass follows.
    Committing,
}

/// What happened to one cell during a pass.
#[derive(Clone, Debug, PartialEq)]
pub enum CellOutcome {
    Success,
    Failed(CellFault),
    /// None of the cell's reads changed, so it was not re-run.
    Unchanged,
    /// The cell sits on a cycle.
    Skipped,
    /// A script result arrived for an outdated version of the cell.
    Discarded,
}

/// Summary of a completed pass.
#[derive(Clone, Debug, Default)]
pub struct PassReport {
    pub generation: u64,
    /// Topological order computed when the pass started.
    pub order: Vec<CellId>,
    /// Outcome per cell, in completion order.
    pub results: Vec<(CellId, CellOutcome)>,
    /// Variables whose committed value changed.
    pub changed: BTreeSet<String>,
    pub stale_discarded: usize,
}

impl PassReport {
    pub fn outcome(&self, id: &CellId) -> Option<&CellOutcome> {
        self.results.iter().find(|(cell, _)| cell == id).map(|(_, o)| o)
    }

    /// Cells that actually executed (successfully or not).
    pub fn executed(&self) -> Vec<&CellId> {
        self.results
            .iter()
            .filter(|(_, o)| matches!(o, CellOutcome::Success | CellOutcome::Failed(_)))
            .map(|(id, _)| id)
            .collect()
    }
}

/// A pass in progress.
#[derive(Debug)]
pub(crate) struct ExecutionPass {
    pub generation: u64,
    pub seeds: BTreeSet<CellId>,
    /// Every cell taking part in the pass (cycle cells excluded).
    pub members: BTreeSet<CellId>,
    pub remaining: VecDeque<CellId>,
    pub completed: HashSet<CellId>,
    /// In-flight scripts whose inputs changed after dispatch; their result
    /// is dropped and they run again.
    pub rerun: HashSet<CellId>,
    /// Committed values at pass start, overlaid with this pass's commits.
    pub snapshot: HashMap<String, StoreValue>,
    pub changed: BTreeSet<String>,
    pub report: PassReport,
}

impl ExecutionPass {
    pub fn new(
        generation: u64,
        seeds: BTreeSet<CellId>,
        snapshot: HashMap<String, StoreValue>,
    ) -> Self {
        ExecutionPass {
            generation,
            seeds,
            members: BTreeSet::new(),
            remaining: VecDeque::new(),
            completed: HashSet::new(),
            rerun: HashSet::new(),
            snapshot,
            changed: BTreeSet::new(),
            report: PassReport {
                generation,
                ..PassReport::default()
            },
        }
    }

    pub fn value(&self, name: &str) -> StoreValue {
        self.snapshot.get(name).cloned().unwrap_or_default()
    }

    /// Record a commit made during this pass.
    pub fn record(&mut self, name: &str, value: StoreValue, changed: bool) {
        self.snapshot.insert(name.to_string(), value);
        if changed {
            self.changed.insert(name.to_string());
        }
    }

    pub fn finish_cell(&mut self, id: CellId, outcome: CellOutcome) {
        self.completed.insert(id.clone());
        self.report.results.push((id, outcome));
    }
}

/// Scheduler bookkeeping owned by the engine.
pub(crate) struct Scheduler {
    pub state: SchedulerState,
    pub generation: u64,
    /// Cells to run unconditionally in the next pass.
    pub pending_seeds: BTreeSet<CellId>,
    pub pass: Option<ExecutionPass>,
    /// Scripts running on worker threads, with the content version dispatched.
    pub in_flight: HashMap<CellId, u64>,
    pub results_tx: Sender<ScriptOutcome>,
    pub results_rx: Receiver<ScriptOutcome>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (results_tx, results_rx) = channel();
        Scheduler {
            state: SchedulerState::Idle,
            generation: 0,
            pending_seeds: BTreeSet::new(),
            pass: None,
            in_flight: HashMap::new(),
            results_tx,
            results_rx,
        }
    }

    pub fn seed(&mut self, id: CellId) {
        self.pending_seeds.insert(id);
    }

    pub fn is_busy(&self) -> bool {
        self.pass.is_some() || !self.pending_seeds.is_empty() || !self.in_flight.is_empty()
    }
}
