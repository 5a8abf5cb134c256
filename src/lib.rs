//! Deterministic simulator for concurrent transactions racing on shared records.
//!
//! Sessions run under one of the four SQL isolation levels against an
//! in-memory [`RecordStore`]. A [`Simulator`] drives them through an explicit
//! interleaving of [`Event`]s and returns a [`SimulationReport`] describing
//! every value observed, every failure, the final committed state and the read
//! phenomena (dirty, non-repeatable, phantom) that showed up along the way.

pub mod config;
pub mod conflict;
pub mod data_store;
pub mod errors;
pub mod isolation;
pub mod report;
pub mod scenarios;
pub mod schedule;
pub mod scheduler;
pub mod session;
pub mod simulator;
pub mod storage;

// Re-export key types and structs for easier access
pub use config::{SessionSpec, SimulatorConfig};
pub use conflict::resolution::LockPolicy;
pub use data_store::record_store::RecordStore;
pub use data_store::versioned_value::VersionedValue;
pub use errors::{Result, SimError};
pub use isolation::IsolationLevel;
pub use report::{Anomaly, AnomalyKind, SimulationReport, StepResult};
pub use schedule::{Event, Operation, Predicate, Update};
pub use session::{Session, SessionState};
pub use simulator::{prelude, Simulator};
pub use storage::{Storage, StorageMutation};
