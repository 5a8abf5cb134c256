//! Structured results of a simulation run.
//!
//! [`SimulationReport`] is what callers assert on. Its `Display` impl renders
//! the same information as a console trace.

use std::collections::BTreeMap;
use std::fmt;

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};

use crate::data_store::record_store::RecordStore;
use crate::data_store::versioned_value::VersionedValue;
use crate::errors::SimError;
use crate::isolation::{IsolationLevel, ReadSource, VisibleValue};
use crate::schedule::{Event, Operation, Predicate};
use crate::session::{Session, SessionState};

/// What a successfully executed event produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Read { seen: VisibleValue },
    Wrote { value: f64 },
    Inserted,
    Counted { count: usize },
    Committed { version: Option<u64> },
    Aborted,
    Slept,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Read { seen } => {
                write!(f, "{} (v{}", seen.value, seen.version)?;
                match &seen.source {
                    ReadSource::Committed => f.write_str(")"),
                    ReadSource::OwnWrite => f.write_str(", own write)"),
                    ReadSource::Uncommitted { writer } => {
                        write!(f, ", uncommitted by {})", writer)
                    }
                }
            }
            Observation::Wrote { value } => write!(f, "staged {}", value),
            Observation::Inserted => f.write_str("staged"),
            Observation::Counted { count } => write!(f, "{} row(s)", count),
            Observation::Committed { version: Some(v) } => write!(f, "committed at v{}", v),
            Observation::Committed { version: None } => f.write_str("committed (no changes)"),
            Observation::Aborted => f.write_str("rolled back"),
            Observation::Slept => f.write_str("yield"),
        }
    }
}

/// Result recorded for one trace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Done { observation: Observation },
    Failed { error: SimError },
    /// The event blocked on a lock and was parked. It shows up again when it
    /// is replayed.
    Waiting { key: String, holder: String },
    /// The event was still parked when the schedule ran out.
    Stalled { key: String, holder: Option<String> },
}

impl StepResult {
    pub fn observation(&self) -> Option<&Observation> {
        match self {
            StepResult::Done { observation } => Some(observation),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SimError> {
        match self {
            StepResult::Failed { error } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepResult::Done { observation } => write!(f, "{}", observation),
            StepResult::Failed { error } => write!(f, "error: {}", error),
            StepResult::Waiting { key, holder } => {
                write!(f, "waiting for lock on {} held by {}", key, holder)
            }
            StepResult::Stalled { key, holder } => match holder {
                Some(holder) => write!(f, "stalled on {} (held by {})", key, holder),
                None => write!(f, "stalled on {}", key),
            },
        }
    }
}

/// One entry of the execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Logical clock: position in execution order.
    pub tick: usize,
    /// Position of the event in the submitted schedule.
    pub seq: usize,
    pub event: Event,
    pub result: StepResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedRead {
    pub key: String,
    pub value: f64,
    pub version: u64,
    pub source: ReadSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedCount {
    pub predicate: Predicate,
    pub count: usize,
}

/// Per-session summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub name: String,
    pub isolation: IsolationLevel,
    pub outcome: SessionState,
    /// Values returned by reads, in execution order.
    pub reads: Vec<ObservedRead>,
    pub counts: Vec<ObservedCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    DirtyRead,
    NonRepeatableRead,
    PhantomRead,
}

/// A read phenomenon observed during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    DirtyRead {
        reader: String,
        writer: String,
        key: String,
        value: f64,
        /// Final state of the writer.
        writer_outcome: SessionState,
        /// The writer committed exactly this value for `key`.
        durable: bool,
    },
    NonRepeatableRead {
        session: String,
        key: String,
        first: f64,
        second: f64,
    },
    PhantomRead {
        session: String,
        predicate: Predicate,
        first: usize,
        second: usize,
    },
}

impl Anomaly {
    pub fn kind(&self) -> AnomalyKind {
        match self {
            Anomaly::DirtyRead { .. } => AnomalyKind::DirtyRead,
            Anomaly::NonRepeatableRead { .. } => AnomalyKind::NonRepeatableRead,
            Anomaly::PhantomRead { .. } => AnomalyKind::PhantomRead,
        }
    }

    /// True for a dirty read of a value that never became durable: the writer
    /// rolled back, or overwrote the value before committing.
    pub fn saw_uncommitted_value(&self) -> bool {
        matches!(self, Anomaly::DirtyRead { durable: false, .. })
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::DirtyRead {
                reader,
                writer,
                key,
                value,
                writer_outcome,
                ..
            } => {
                write!(
                    f,
                    "dirty read: {} read {} = {} staged by {} ({})",
                    reader, key, value, writer, writer_outcome
                )?;
                if self.saw_uncommitted_value() {
                    f.write_str(", value never committed")?;
                }
                Ok(())
            }
            Anomaly::NonRepeatableRead {
                session,
                key,
                first,
                second,
            } => write!(
                f,
                "non-repeatable read: {} read {} as {} then {}",
                session, key, first, second
            ),
            Anomaly::PhantomRead {
                session,
                predicate,
                first,
                second,
            } => write!(
                f,
                "phantom read: {} counted {} row(s) where {} then {}",
                session, first, predicate, second
            ),
        }
    }
}

/// Everything a simulation run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Whether `REPEATABLE READ` hid rows committed after a snapshot.
    pub phantom_protection: bool,
    pub steps: Vec<Step>,
    /// Sessions in declaration order.
    pub sessions: Vec<SessionReport>,
    /// Latest committed value per key.
    pub final_state: BTreeMap<String, VersionedValue>,
    pub final_version: u64,
    pub anomalies: Vec<Anomaly>,
}

impl SimulationReport {
    pub(crate) fn build(
        phantom_protection: bool,
        steps: Vec<Step>,
        sessions: &[Session],
        store: &RecordStore,
    ) -> Self {
        let mut reports: Vec<SessionReport> = sessions
            .iter()
            .map(|session| SessionReport {
                name: session.name().to_string(),
                isolation: session.isolation_level(),
                outcome: session.state(),
                reads: Vec::new(),
                counts: Vec::new(),
            })
            .collect();

        for step in &steps {
            let Some(report) = reports.iter_mut().find(|r| r.name == step.event.session) else {
                continue;
            };
            match (&step.event.op, step.result.observation()) {
                (
                    Operation::Read { key } | Operation::ReadForUpdate { key },
                    Some(Observation::Read { seen }),
                ) => report.reads.push(ObservedRead {
                    key: key.clone(),
                    value: seen.value,
                    version: seen.version,
                    source: seen.source.clone(),
                }),
                (Operation::Count { predicate }, Some(Observation::Counted { count })) => {
                    report.counts.push(ObservedCount {
                        predicate: *predicate,
                        count: *count,
                    })
                }
                _ => {}
            }
        }

        let anomalies = detect_anomalies(&steps, &reports, store);

        Self {
            phantom_protection,
            steps,
            sessions: reports,
            final_state: store.snapshot(),
            final_version: store.current_version(),
            anomalies,
        }
    }

    pub fn session(&self, name: &str) -> Option<&SessionReport> {
        self.sessions.iter().find(|s| s.name == name)
    }

    pub fn outcome(&self, name: &str) -> Option<SessionState> {
        self.session(name).map(|s| s.outcome)
    }

    /// Final committed value of `key`.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.final_state.get(key).map(|v| v.value())
    }

    /// Values read by `session`, in execution order.
    pub fn read_values(&self, session: &str) -> Vec<f64> {
        self.session(session)
            .map(|s| s.reads.iter().map(|r| r.value).collect())
            .unwrap_or_default()
    }

    pub fn count_values(&self, session: &str) -> Vec<usize> {
        self.session(session)
            .map(|s| s.counts.iter().map(|c| c.count).collect())
            .unwrap_or_default()
    }

    /// Errors returned to `session`'s events, in execution order.
    pub fn errors(&self, session: &str) -> Vec<&SimError> {
        self.steps
            .iter()
            .filter(|step| step.event.session == session)
            .filter_map(|step| step.result.error())
            .collect()
    }

    pub fn stalled(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|step| matches!(step.result, StepResult::Stalled { .. }))
    }

    pub fn anomalies_of(&self, kind: AnomalyKind) -> Vec<&Anomaly> {
        self.anomalies.iter().filter(|a| a.kind() == kind).collect()
    }
}

/// Walks the trace in execution order and flags read phenomena per session.
///
/// Only consistent reads form the repeatable-read baseline; locking reads are
/// current reads and may legitimately differ. A session's own write to a key
/// resets the baseline for that key; any own write or insert resets its count
/// baselines.
fn detect_anomalies(
    steps: &[Step],
    sessions: &[SessionReport],
    store: &RecordStore,
) -> Vec<Anomaly> {
    let outcome_of = |name: &str| {
        sessions
            .iter()
            .find(|s| s.name == name)
            .map_or(SessionState::Active, |s| s.outcome)
    };
    let commit_versions: HashMap<&str, u64> = steps
        .iter()
        .filter_map(|step| match step.result.observation() {
            Some(Observation::Committed { version: Some(v) }) => {
                Some((step.event.session.as_str(), *v))
            }
            _ => None,
        })
        .collect();
    // Whether `writer` committed `value` for `key`.
    let committed_value = |writer: &str, key: &str, value: f64| {
        let Some(version) = commit_versions.get(writer) else {
            return false;
        };
        store.record(key).is_some_and(|record| {
            record
                .history()
                .iter()
                .any(|v| v.version() == *version && v.value() == value)
        })
    };

    let mut anomalies = Vec::new();
    let mut last_read: HashMap<(String, String), f64> = HashMap::new();
    let mut last_count: HashMap<String, Vec<(Predicate, usize)>> = HashMap::new();

    for step in steps {
        let session = &step.event.session;
        let Some(observation) = step.result.observation() else {
            continue;
        };
        match (&step.event.op, observation) {
            (
                Operation::Read { key } | Operation::ReadForUpdate { key },
                Observation::Read { seen },
            ) => {
                if let ReadSource::Uncommitted { writer } = &seen.source {
                    anomalies.push(Anomaly::DirtyRead {
                        reader: session.clone(),
                        writer: writer.clone(),
                        key: key.clone(),
                        value: seen.value,
                        writer_outcome: outcome_of(writer),
                        durable: committed_value(writer, key, seen.value),
                    });
                }
                if seen.source == ReadSource::OwnWrite
                    || !matches!(step.event.op, Operation::Read { .. })
                {
                    continue;
                }
                let slot = (session.clone(), key.clone());
                if let Some(first) = last_read.insert(slot, seen.value) {
                    if first != seen.value {
                        anomalies.push(Anomaly::NonRepeatableRead {
                            session: session.clone(),
                            key: key.clone(),
                            first,
                            second: seen.value,
                        });
                    }
                }
            }
            (Operation::Write { key, .. } | Operation::Insert { key, .. }, _) => {
                last_read.remove(&(session.clone(), key.clone()));
                last_count.remove(session);
            }
            (Operation::Count { predicate }, Observation::Counted { count }) => {
                let seen = last_count.entry(session.clone()).or_default();
                match seen.iter_mut().find(|(p, _)| p == predicate) {
                    Some((_, first)) => {
                        if *first != *count {
                            anomalies.push(Anomaly::PhantomRead {
                                session: session.clone(),
                                predicate: *predicate,
                                first: *first,
                                second: *count,
                            });
                        }
                        *first = *count;
                    }
                    None => seen.push((*predicate, *count)),
                }
            }
            _ => {}
        }
    }

    anomalies
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.phantom_protection {
            writeln!(
                f,
                "phantom protection: on (REPEATABLE READ hides rows committed after its snapshot)"
            )?;
        } else {
            writeln!(
                f,
                "phantom protection: off (REPEATABLE READ sees rows committed after its snapshot)"
            )?;
        }
        for session in &self.sessions {
            writeln!(f, "session {}: {}", session.name, session.isolation)?;
        }
        for step in &self.steps {
            writeln!(f, "#{:<3} {} -> {}", step.tick, step.event, step.result)?;
        }
        writeln!(f, "final state (v{}):", self.final_version)?;
        for (key, value) in &self.final_state {
            writeln!(f, "  {} = {} (v{})", key, value.value(), value.version())?;
        }
        for session in &self.sessions {
            writeln!(f, "[{}] {}", session.name, session.outcome)?;
        }
        for anomaly in &self.anomalies {
            writeln!(f, "{}", anomaly)?;
        }
        Ok(())
    }
}
