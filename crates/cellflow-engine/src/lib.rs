//! cellflow_engine - reactive notebook engine with Rhai-scripted cells.
//!
//! Cells (script, formula, markdown, input) share one namespace of variables.
//! Editing a cell re-derives everything downstream of it: the analyzer works
//! out what each cell reads and writes, the dependency graph orders cells and
//! flags cycles, and the scheduler re-runs only what is affected.
//!
//! ```no_run
//! use cellflow_engine::{CellDefinition, EngineConfig, NotebookEngine};
//!
//! let mut engine = NotebookEngine::new(EngineConfig::default());
//! engine.push_cell(CellDefinition::input("a", "a", "2")).unwrap();
//! engine.push_cell(CellDefinition::formula("f", "c", "a * 10")).unwrap();
//! engine.run_until_idle();
//! assert_eq!(engine.get("c").as_f64(), Some(20.0));
//! ```

pub mod analyzer;
pub mod cell;
pub mod clock;
pub mod config;
pub mod error;
pub mod exec;
pub mod format;
pub mod graph;
mod notebook;
mod queue;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod value;

pub use cell::{Cell, CellDefinition, CellId, CellKind, CellStatus, WriteSet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{CellFault, EngineError, Result};
pub use notebook::NotebookEngine;
pub use scheduler::{CellOutcome, PassReport, SchedulerState};
pub use storage::StorageChannel;
pub use store::{Subscription, VariableStore};
pub use value::StoreValue;

pub use rhai::Dynamic;
