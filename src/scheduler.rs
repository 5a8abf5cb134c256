use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashMap as HashMap;
use log::{debug, trace, warn};

use crate::config::{SessionSpec, SimulatorConfig};
use crate::conflict::detection::{describe_conflicts, detect_peer_conflicts};
use crate::conflict::resolution::LockPolicy;
use crate::data_store::record_store::RecordStore;
use crate::errors::{Result, SimError};
use crate::report::{Observation, SimulationReport, Step, StepResult};
use crate::schedule::{Event, Operation};
use crate::session::Session;

/// Events of a session blocked on a lock, oldest first.
struct Parked {
    key: String,
    queue: VecDeque<(usize, Event)>,
}

/// Drives declared sessions through an explicit interleaving.
///
/// Execution is single threaded and fully deterministic: events run in the
/// order given, except that a session blocked on a lock under
/// [`LockPolicy::Wait`] has its remaining events held back until the lock is
/// released. Released waiters are resumed in the order they started waiting,
/// before the next schedule event runs. A failing event is recorded in the
/// trace and never stops the run.
pub struct Scheduler {
    store: Arc<RecordStore>,
    phantom_protection: bool,
    sessions: Vec<Session>,
    policies: Vec<LockPolicy>,
    index: HashMap<String, usize>,
    parked: HashMap<usize, Parked>,
    wait_order: VecDeque<usize>,
    steps: Vec<Step>,
}

impl Scheduler {
    /// Creates the sessions described by `specs` on top of `store`.
    pub fn new(
        store: Arc<RecordStore>,
        config: &SimulatorConfig,
        specs: &[SessionSpec],
    ) -> Result<Self> {
        let mut sessions = Vec::with_capacity(specs.len());
        let mut policies = Vec::with_capacity(specs.len());
        let mut index = HashMap::new();

        for spec in specs {
            if index.insert(spec.name.clone(), sessions.len()).is_some() {
                return Err(SimError::DuplicateSession(spec.name.clone()));
            }
            let (level, policy) = spec.resolve(config);
            sessions.push(Session::new(
                spec.name.clone(),
                level,
                config.phantom_protection,
                Arc::clone(&store),
            ));
            policies.push(policy);
        }

        Ok(Self {
            store,
            phantom_protection: config.phantom_protection,
            sessions,
            policies,
            index,
            parked: HashMap::new(),
            wait_order: VecDeque::new(),
            steps: Vec::new(),
        })
    }

    /// Runs the schedule to completion and reports what happened.
    ///
    /// Fails upfront with [`SimError::UnknownSession`] if an event names a
    /// session that was not declared; nothing is executed in that case.
    pub fn run(mut self, events: Vec<Event>) -> Result<SimulationReport> {
        let mut resolved = Vec::with_capacity(events.len());
        for event in &events {
            resolved.push(self.session_index(&event.session)?);
        }

        for (seq, (idx, event)) in resolved.into_iter().zip(events).enumerate() {
            if let Some(parked) = self.parked.get_mut(&idx) {
                trace!("holding back {} behind a lock wait", event);
                parked.queue.push_back((seq, event));
                continue;
            }
            self.dispatch(idx, seq, event);
            self.wake_waiters();
        }

        self.stall_waiters();
        Ok(SimulationReport::build(
            self.phantom_protection,
            self.steps,
            &self.sessions,
            &self.store,
        ))
    }

    fn session_index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownSession(name.to_string()))
    }

    /// Executes one event, or parks it. Returns `false` when the event was parked.
    fn dispatch(&mut self, idx: usize, seq: usize, event: Event) -> bool {
        let contended = match event.op.lock_key() {
            Some(key) if self.sessions[idx].is_active() => self
                .store
                .holder(key)
                .filter(|holder| holder != self.sessions[idx].name())
                .map(|holder| (key.to_string(), holder)),
            _ => None,
        };

        if let Some((key, holder)) = &contended {
            if self.policies[idx] == LockPolicy::Wait {
                debug!("{} waits for lock on {} held by {}", event.session, key, holder);
                let result = StepResult::Waiting {
                    key: key.clone(),
                    holder: holder.clone(),
                };
                self.record(seq, event.clone(), result);
                self.parked.insert(
                    idx,
                    Parked {
                        key: key.clone(),
                        queue: VecDeque::from([(seq, event)]),
                    },
                );
                self.wait_order.push_back(idx);
                return false;
            }
        }

        let result = match self.execute(idx, &event.op) {
            Ok(observation) => StepResult::Done { observation },
            Err(error) => StepResult::Failed { error },
        };

        if contended.is_some()
            && self.policies[idx] == LockPolicy::Abort
            && self.sessions[idx].is_active()
        {
            if let Err(e) = self.sessions[idx].abort() {
                warn!("could not abort {} after lock conflict: {}", event.session, e);
            }
        }

        self.record(seq, event, result);
        true
    }

    fn execute(&mut self, idx: usize, op: &Operation) -> Result<Observation> {
        let session = &mut self.sessions[idx];
        match op {
            Operation::Read { key } => session.read(key).map(|seen| Observation::Read { seen }),
            Operation::ReadForUpdate { key } => session
                .read_for_update(key)
                .map(|seen| Observation::Read { seen }),
            Operation::Write { key, update } => session
                .write(key, *update)
                .map(|value| Observation::Wrote { value }),
            Operation::Insert { key, value } => {
                session.insert(key, *value).map(|_| Observation::Inserted)
            }
            Operation::Count { predicate } => session
                .count(*predicate)
                .map(|count| Observation::Counted { count }),
            Operation::Commit => self.commit(idx),
            Operation::Abort => session.abort().map(|_| Observation::Aborted),
            Operation::Sleep => Ok(Observation::Slept),
        }
    }

    /// Commit with the cross-session serializable check in front of it.
    fn commit(&mut self, idx: usize) -> Result<Observation> {
        if self.sessions[idx].is_active() {
            let conflicts = detect_peer_conflicts(
                &self.sessions[idx],
                self.sessions
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != idx)
                    .map(|(_, peer)| peer),
            );
            if !conflicts.is_empty() {
                let reason = describe_conflicts(&conflicts);
                return Err(self.sessions[idx].reject(reason));
            }
        }
        self.sessions[idx]
            .commit()
            .map(|version| Observation::Committed { version })
    }

    /// Resumes parked sessions whose lock has been released, oldest waiter first.
    fn wake_waiters(&mut self) {
        loop {
            let ready = self.wait_order.iter().copied().find(|idx| {
                self.parked.get(idx).is_some_and(|parked| {
                    self.store
                        .holder(&parked.key)
                        .is_none_or(|holder| holder == self.sessions[*idx].name())
                })
            });
            let Some(idx) = ready else {
                break;
            };

            self.wait_order.retain(|waiting| *waiting != idx);
            let Some(mut parked) = self.parked.remove(&idx) else {
                continue;
            };
            debug!(
                "{} resumes after lock on {} was released",
                self.sessions[idx].name(),
                parked.key
            );

            while let Some((seq, event)) = parked.queue.pop_front() {
                if !self.dispatch(idx, seq, event) {
                    if let Some(reparked) = self.parked.get_mut(&idx) {
                        reparked.queue.extend(parked.queue.drain(..));
                    }
                    break;
                }
            }
        }
    }

    /// Records every event still parked when the schedule is exhausted.
    fn stall_waiters(&mut self) {
        while let Some(idx) = self.wait_order.pop_front() {
            let Some(parked) = self.parked.remove(&idx) else {
                continue;
            };
            let holder = self.store.holder(&parked.key);
            warn!(
                "{} never acquired {}: {} event(s) stalled",
                self.sessions[idx].name(),
                parked.key,
                parked.queue.len()
            );
            for (seq, event) in parked.queue {
                let result = StepResult::Stalled {
                    key: parked.key.clone(),
                    holder: holder.clone(),
                };
                self.record(seq, event, result);
            }
        }
    }

    fn record(&mut self, seq: usize, event: Event, result: StepResult) {
        let tick = self.steps.len();
        trace!("#{} {} -> {}", tick, event, result);
        self.steps.push(Step {
            tick,
            seq,
            event,
            result,
        });
    }
}
