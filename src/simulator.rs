use std::sync::Arc;

use log::debug;

use crate::config::{SessionSpec, SimulatorConfig};
use crate::data_store::record_store::RecordStore;
use crate::errors::Result;
use crate::isolation::IsolationLevel;
use crate::report::SimulationReport;
use crate::scheduler::Scheduler;
use crate::schedule::Event;

/// Isorace Prelude
pub mod prelude {
    pub use crate::config::*;
    pub use crate::conflict::detection::*;
    pub use crate::conflict::resolution::*;
    pub use crate::data_store::record::*;
    pub use crate::data_store::record_store::*;
    pub use crate::data_store::versioned_value::*;
    pub use crate::errors::*;
    pub use crate::isolation::*;
    pub use crate::report::*;
    pub use crate::schedule::*;
    pub use crate::session::*;
    pub use crate::storage::*;
    pub use crate::*;
}

/// The main entry point: a record store, a set of declared sessions and the
/// settings they run under.
///
/// # Examples
///
/// ```
/// use isorace::prelude::*;
///
/// let mut sim = Simulator::new(RecordStore::seeded([("r50", 1.0)]), SimulatorConfig::default());
/// sim.session("A", IsolationLevel::ReadCommitted)
///     .session("B", IsolationLevel::ReadUncommitted);
///
/// let report = sim
///     .run(vec![
///         Event::write("A", "r50", Update::Add(5.0)),
///         Event::read("B", "r50"),
///         Event::abort("A"),
///         Event::commit("B"),
///     ])
///     .unwrap();
///
/// assert_eq!(report.read_values("B"), vec![6.0]);
/// assert_eq!(report.value("r50"), Some(1.0));
/// ```
pub struct Simulator {
    store: Arc<RecordStore>,
    config: SimulatorConfig,
    sessions: Vec<SessionSpec>,
}

impl Simulator {
    pub fn new(store: RecordStore, config: SimulatorConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
            sessions: Vec::new(),
        }
    }

    /// Declares a session running at `level`.
    pub fn session(&mut self, name: impl Into<String>, level: IsolationLevel) -> &mut Self {
        self.sessions.push(SessionSpec::new(name, level));
        self
    }

    /// Declares a session with full control over its settings.
    pub fn session_with(&mut self, spec: SessionSpec) -> &mut Self {
        self.sessions.push(spec);
        self
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// The shared store, e.g. to inspect it after a run.
    pub fn store(&self) -> Arc<RecordStore> {
        Arc::clone(&self.store)
    }

    /// Runs `events` in order against the declared sessions.
    pub fn run(self, events: Vec<Event>) -> Result<SimulationReport> {
        debug!(
            "running {} event(s) over {} session(s), phantom protection {}",
            events.len(),
            self.sessions.len(),
            self.config.phantom_protection
        );
        Scheduler::new(self.store, &self.config, &self.sessions)?.run(events)
    }
}
