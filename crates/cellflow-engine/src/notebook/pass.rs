//! Driving execution passes.
//!
//! A pass is started from the seeded cells (edited cells, readers of settled
//! store writes) and covers their transitive closure in topological order.
//! Seeds always run; any other cell runs only if one of its reads changed
//! during the pass. Script cells are dispatched to worker threads and their
//! results are committed here, on the scheduler side, one at a time.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::TryRecvError;

use super::NotebookEngine;
use crate::cell::{CellId, CellKind, CellStatus, WriteSet};
use crate::error::CellFault;
use crate::exec::formula;
use crate::exec::markdown;
use crate::exec::script::{ScriptJob, ScriptOutcome};
use crate::scheduler::{CellOutcome, ExecutionPass, PassReport, SchedulerState};
use crate::value::{StoreValue, parse_literal};

impl NotebookEngine {
    /// Perform one non-blocking scheduling step.
    ///
    /// Returns the report of a pass when this step completed one.
    pub fn tick(&mut self) -> Option<PassReport> {
        if self.scheduler.pass.is_none() {
            self.collect_writes();
            if self.scheduler.pending_seeds.is_empty() {
                self.scheduler.state = if self.store.has_pending_writes() {
                    SchedulerState::Collecting
                } else {
                    SchedulerState::Idle
                };
                return None;
            }
            self.begin_pass();
        }
        self.advance()
    }

    /// Run passes until no writes, seeds or in-flight scripts remain.
    ///
    /// Unsettled write bursts are waited out on the engine's clock.
    pub fn run_until_idle(&mut self) -> Vec<PassReport> {
        let mut reports = Vec::new();
        loop {
            if let Some(report) = self.tick() {
                reports.push(report);
                continue;
            }
            if self.scheduler.pass.is_some() {
                if !self.scheduler.in_flight.is_empty() {
                    self.wait_for_script();
                }
                continue;
            }
            if !self.store.has_pending_writes() {
                break;
            }
            if let Some(wait) = self.store.queue_wait(self.config.settle_window()) {
                self.clock.sleep(wait);
            }
        }
        self.scheduler.state = SchedulerState::Idle;
        reports
    }

    /// Schedule every cell and run to quiescence.
    pub fn run_all(&mut self) -> Vec<PassReport> {
        for cell in &self.cells {
            self.scheduler.pending_seeds.insert(cell.id.clone());
        }
        self.run_until_idle()
    }

    /// Release the queued write burst without waiting for the settle window.
    pub fn flush(&mut self) {
        self.store.settle_now();
    }

    /// Whether a pass is running or work is waiting to start one.
    pub fn is_busy(&self) -> bool {
        self.scheduler.is_busy() || self.store.has_pending_writes()
    }

    /// Commit a settled burst of store writes and seed the readers of every
    /// variable that changed.
    fn collect_writes(&mut self) {
        let Some(writes) = self.store.take_settled(self.config.settle_window()) else {
            return;
        };
        self.scheduler.state = SchedulerState::Collecting;
        for (name, write) in writes {
            let changed = self
                .store
                .commit(&name, StoreValue::Value(write.value), write.forced);
            if !changed {
                continue;
            }
            for reader in self.graph.readers_of(&name) {
                self.scheduler.pending_seeds.insert(reader.clone());
            }
        }
    }

    fn begin_pass(&mut self) {
        self.scheduler.state = SchedulerState::Ordering;
        self.scheduler.generation += 1;

        let seeds: BTreeSet<CellId> = std::mem::take(&mut self.scheduler.pending_seeds)
            .into_iter()
            .filter(|id| self.graph.contains(id))
            .collect();
        let mut pass = ExecutionPass::new(self.scheduler.generation, seeds, self.store.snapshot());

        let closure = self.graph.closure(&pass.seeds);
        let mut blocked: Vec<CellId> = closure
            .iter()
            .filter(|id| self.graph.cycle_of(id).is_some())
            .cloned()
            .collect();
        blocked.sort_by_key(|id| self.graph.position(id));
        for id in blocked {
            self.block_on_cycle(&mut pass, id);
        }

        pass.members = closure
            .into_iter()
            .filter(|id| !pass.completed.contains(id))
            .collect();
        let order = self.graph.order(&pass.members);
        pass.report.order = order.clone();
        pass.remaining = order.into();

        tracing::debug!(
            generation = pass.generation,
            seeds = pass.seeds.len(),
            cells = pass.remaining.len(),
            "pass started"
        );
        self.scheduler.state = SchedulerState::Executing;
        self.scheduler.pass = Some(pass);
    }

    fn advance(&mut self) -> Option<PassReport> {
        let mut pass = self.scheduler.pass.take()?;
        self.poll_scripts(&mut pass, false);
        self.run_ready(&mut pass);

        if pass.remaining.is_empty() && self.scheduler.in_flight.is_empty() {
            return Some(self.finish(pass));
        }
        self.scheduler.pass = Some(pass);
        None
    }

    fn finish(&mut self, pass: ExecutionPass) -> PassReport {
        self.scheduler.state = SchedulerState::Committing;
        let mut report = pass.report;
        report.changed = pass.changed;
        tracing::debug!(
            generation = report.generation,
            executed = report.executed().len(),
            changed = report.changed.len(),
            stale = report.stale_discarded,
            "pass finished"
        );

        self.scheduler.state =
            if self.scheduler.pending_seeds.is_empty() && !self.store.has_pending_writes() {
                SchedulerState::Idle
            } else {
                SchedulerState::Collecting
            };
        report
    }

    fn is_ready(&self, pass: &ExecutionPass, id: &CellId) -> bool {
        self.graph
            .dependencies(id)
            .all(|dep| !pass.members.contains(dep) || pass.completed.contains(dep))
    }

    /// Start every cell whose upstream cells are done.
    fn run_ready(&mut self, pass: &mut ExecutionPass) {
        let parallel = self.config.parallel_scripts;
        loop {
            if !parallel && !self.scheduler.in_flight.is_empty() {
                return;
            }
            let ready = pass.remaining.iter().position(|id| self.is_ready(pass, id));
            let index = match ready {
                Some(index) => index,
                None if self.scheduler.in_flight.is_empty() && !pass.remaining.is_empty() => {
                    tracing::warn!(
                        cell = %pass.remaining[0],
                        "no cell is ready; running the next cell in order"
                    );
                    0
                }
                None => return,
            };
            let Some(id) = pass.remaining.remove(index) else {
                return;
            };
            self.run_cell(pass, id);
        }
    }

    fn run_cell(&mut self, pass: &mut ExecutionPass, id: CellId) {
        let Some(index) = self.index_of(&id) else {
            pass.finish_cell(id, CellOutcome::Skipped);
            return;
        };

        let cell = &self.cells[index];
        let own_writes = cell.writes.names();
        let triggered = pass.seeds.contains(&id)
            || cell
                .reads
                .iter()
                .any(|name| pass.changed.contains(name) || pass.value(name).is_error());
        if !triggered {
            pass.finish_cell(id, CellOutcome::Unchanged);
            return;
        }

        // A cell's own error marker on a name it reads back is not an upstream failure.
        let inputs: Vec<(String, StoreValue)> = cell
            .reads
            .iter()
            .map(|name| {
                let value = pass.value(name);
                if value.is_error() && own_writes.contains(name) {
                    (name.clone(), StoreValue::Undefined)
                } else {
                    (name.clone(), value)
                }
            })
            .collect();

        if let Some((variable, fault)) = inputs
            .iter()
            .find_map(|(name, value)| value.fault().map(|f| (name.clone(), f.clone())))
        {
            let fault = CellFault::Upstream {
                variable,
                origin: fault.origin().clone(),
            };
            self.fail_cell(pass, index, fault);
            return;
        }

        match self.cells[index].kind.clone() {
            CellKind::Formula { expression, output } => {
                match formula::evaluate(&self.expressions, &expression, &inputs) {
                    Ok(value) => {
                        self.commit_value(pass, &output, StoreValue::Value(value));
                        self.succeed_cell(pass, index);
                    }
                    Err(message) => {
                        let fault = CellFault::Execution {
                            cell: id,
                            message,
                        };
                        self.fail_cell(pass, index, fault);
                    }
                }
            }
            CellKind::Input { literal, output } => {
                self.commit_value(pass, &output, StoreValue::Value(parse_literal(&literal)));
                self.succeed_cell(pass, index);
            }
            CellKind::Markdown { template } => {
                let text = markdown::render(&self.expressions, &template, &inputs);
                self.cells[index].rendered = Some(text);
                self.succeed_cell(pass, index);
            }
            CellKind::Script { source } => {
                let job = ScriptJob {
                    cell_id: id,
                    content_version: self.cells[index].content_version,
                    source,
                    inputs,
                };
                self.dispatch(pass, index, job);
            }
        }
    }

    fn dispatch(&mut self, pass: &mut ExecutionPass, index: usize, job: ScriptJob) {
        let id = job.cell_id.clone();
        let version = job.content_version;
        let sandbox = self.sandbox.clone();
        let results = self.scheduler.results_tx.clone();

        let worker_id = id.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("cellflow-script-{}", id))
            .spawn(move || {
                let run = panic::catch_unwind(AssertUnwindSafe(|| sandbox.run(job)));
                let outcome = run.unwrap_or_else(|payload| ScriptOutcome {
                    cell_id: worker_id,
                    content_version: version,
                    result: Err(format!("Script worker panicked: {}", panic_message(&*payload))),
                    logs: Vec::new(),
                });
                // The engine may have been dropped while the script ran.
                let _ = results.send(outcome);
            });

        match spawned {
            Ok(_) => {
                tracing::debug!(cell = %id, version, "script dispatched");
                self.scheduler.in_flight.insert(id, version);
            }
            Err(e) => {
                let fault = CellFault::Execution {
                    cell: id,
                    message: format!("Failed to start script worker: {}", e),
                };
                self.fail_cell(pass, index, fault);
            }
        }
    }

    /// Block until one in-flight script reports back, then apply it.
    fn wait_for_script(&mut self) {
        if let Some(mut pass) = self.scheduler.pass.take() {
            self.poll_scripts(&mut pass, true);
            self.scheduler.pass = Some(pass);
        }
    }

    fn poll_scripts(&mut self, pass: &mut ExecutionPass, block: bool) {
        if block && !self.scheduler.in_flight.is_empty() {
            match self.scheduler.results_rx.recv() {
                Ok(outcome) => self.apply_script_outcome(pass, outcome),
                Err(_) => return,
            }
        }
        loop {
            match self.scheduler.results_rx.try_recv() {
                Ok(outcome) => self.apply_script_outcome(pass, outcome),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    fn apply_script_outcome(&mut self, pass: &mut ExecutionPass, outcome: ScriptOutcome) {
        let id = outcome.cell_id.clone();
        let dispatched = self.scheduler.in_flight.remove(&id);
        let index = self.index_of(&id).filter(|&index| {
            dispatched == Some(outcome.content_version)
                && self.cells[index].content_version == outcome.content_version
        });

        let rerun = pass.rerun.remove(&id);

        let Some(index) = index else {
            tracing::debug!(cell = %id, version = outcome.content_version, "stale script result discarded");
            pass.report.stale_discarded += 1;
            if pass.members.contains(&id) && !pass.completed.contains(&id) {
                pass.finish_cell(id, CellOutcome::Discarded);
            }
            return;
        };

        if rerun {
            tracing::debug!(cell = %id, "script inputs changed while running; running again");
            pass.report.stale_discarded += 1;
            pass.seeds.insert(id.clone());
            pass.completed.remove(&id);
            let mut pending: BTreeSet<CellId> = pass.remaining.drain(..).collect();
            pending.insert(id);
            pass.remaining = self.graph.order(&pending).into();
            return;
        }

        self.cells[index].logs = outcome.logs;
        match outcome.result {
            Ok(exports) => {
                let previous = self.cells[index].writes.names();
                let current: BTreeSet<String> = exports.keys().cloned().collect();

                for (name, value) in exports {
                    self.commit_value(pass, &name, StoreValue::Value(value));
                }
                for name in previous.difference(&current) {
                    if self.written_elsewhere(name, &id) {
                        continue;
                    }
                    tracing::debug!(cell = %id, variable = name.as_str(), "export dropped");
                    if self.store.clear(name, false) {
                        pass.record(name, StoreValue::Undefined, true);
                    }
                }

                let confirmed_before = self.cells[index].writes.is_confirmed();
                self.cells[index].writes = WriteSet::Confirmed(current.clone());
                self.succeed_cell(pass, index);

                if previous != current || !confirmed_before {
                    self.rebuild_graph();
                    let added: BTreeSet<String> = current.difference(&previous).cloned().collect();
                    self.extend_pass(pass, &id, &added);
                }
            }
            Err(message) => {
                let fault = CellFault::Execution { cell: id, message };
                self.fail_cell(pass, index, fault);
            }
        }
    }

    /// After a graph rebuild mid-pass: pull in readers of the newly exported
    /// `names` (running again any that already ran without them) and re-order
    /// whatever has not run yet.
    fn extend_pass(&mut self, pass: &mut ExecutionPass, source: &CellId, names: &BTreeSet<String>) {
        let readers: Vec<CellId> = names
            .iter()
            .flat_map(|name| self.graph.readers_of(name).iter())
            .filter(|id| *id != source)
            .cloned()
            .collect();
        let closure = self.graph.closure(&readers);
        for id in closure.iter().filter(|id| self.scheduler.in_flight.contains_key(*id)) {
            if id != source {
                pass.members.insert(id.clone());
                pass.rerun.insert(id.clone());
            }
        }
        let fresh: Vec<CellId> = closure
            .into_iter()
            .filter(|id| {
                id != source
                    && !pass.remaining.contains(id)
                    && !self.scheduler.in_flight.contains_key(id)
            })
            .collect();

        let mut pending: BTreeSet<CellId> = pass.remaining.drain(..).collect();
        for id in fresh {
            pass.completed.remove(&id);
            pass.members.insert(id.clone());
            pending.insert(id);
        }

        let blocked: Vec<CellId> = pending
            .iter()
            .filter(|id| self.graph.cycle_of(id).is_some())
            .cloned()
            .collect();
        for id in blocked {
            pending.remove(&id);
            self.block_on_cycle(pass, id);
        }

        pass.remaining = self.graph.order(&pending).into();
    }

    fn block_on_cycle(&mut self, pass: &mut ExecutionPass, id: CellId) {
        let Some(index) = self.index_of(&id) else {
            return;
        };
        let path = self.graph.cycle_of(&id).map(<[CellId]>::to_vec).unwrap_or_default();
        let fault = CellFault::Cycle {
            cell: id.clone(),
            path,
        };
        tracing::warn!(cell = %id, error = %fault, "cell skipped");
        self.mark_failed(pass, index, &fault);
        pass.finish_cell(id, CellOutcome::Skipped);
    }

    fn commit_value(&mut self, pass: &mut ExecutionPass, name: &str, value: StoreValue) {
        let changed = self.store.commit(name, value.clone(), false);
        pass.record(name, value, changed);
    }

    fn succeed_cell(&mut self, pass: &mut ExecutionPass, index: usize) {
        let cell = &mut self.cells[index];
        cell.status = CellStatus::Ok;
        pass.finish_cell(cell.id.clone(), CellOutcome::Success);
    }

    fn fail_cell(&mut self, pass: &mut ExecutionPass, index: usize, fault: CellFault) {
        match &fault {
            CellFault::Upstream { .. } => {
                tracing::debug!(cell = %self.cells[index].id, error = %fault, "cell blocked upstream")
            }
            _ => tracing::warn!(cell = %self.cells[index].id, error = %fault, "cell failed"),
        }
        self.mark_failed(pass, index, &fault);
        let id = self.cells[index].id.clone();
        pass.finish_cell(id, CellOutcome::Failed(fault));
    }

    /// Set the failed status and write an error marker to every output.
    fn mark_failed(&mut self, pass: &mut ExecutionPass, index: usize, fault: &CellFault) {
        let cell = &mut self.cells[index];
        cell.status = CellStatus::Failed(fault.clone());
        if matches!(cell.kind, CellKind::Markdown { .. }) {
            cell.rendered = None;
        }
        for name in cell.writes.names() {
            self.commit_value(pass, &name, StoreValue::Error(fault.clone()));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_reads_str_and_string_payloads() {
        let payload = panic::catch_unwind(|| -> i32 { panic!("boom") }).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom");

        let payload = panic::catch_unwind(|| -> i32 { panic!("cell {}", 7) }).unwrap_err();
        assert_eq!(panic_message(&*payload), "cell 7");

        let payload = panic::catch_unwind(|| -> i32 { std::panic::panic_any(42_u8) }).unwrap_err();
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
