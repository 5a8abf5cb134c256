//! Events making up an interleaving.
//!
//! A schedule is a plain `Vec<Event>`. Each event names the session it belongs
//! to and one operation. The scheduler consumes events strictly in order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// New value for a write, computed from the value the writer currently sees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Update {
    /// `SET col = value`
    Set(f64),
    /// `SET col = col + delta`
    Add(f64),
}

impl Update {
    pub fn apply(self, current: f64) -> f64 {
        match self {
            Update::Set(value) => value,
            Update::Add(delta) => current + delta,
        }
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Set(value) => write!(f, "= {}", value),
            Update::Add(delta) if *delta < 0.0 => write!(f, "- {}", -delta),
            Update::Add(delta) => write!(f, "+ {}", delta),
        }
    }
}

/// Row filter used by `Count`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    All,
    GreaterThan(f64),
    LessThan(f64),
    /// Inclusive on both ends.
    Between(f64, f64),
}

impl Predicate {
    pub fn matches(&self, value: f64) -> bool {
        match *self {
            Predicate::All => true,
            Predicate::GreaterThan(bound) => value > bound,
            Predicate::LessThan(bound) => value < bound,
            Predicate::Between(low, high) => value >= low && value <= high,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::All => f.write_str("*"),
            Predicate::GreaterThan(bound) => write!(f, "> {}", bound),
            Predicate::LessThan(bound) => write!(f, "< {}", bound),
            Predicate::Between(low, high) => write!(f, "BETWEEN {} AND {}", low, high),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Consistent (non-locking) read.
    Read { key: String },
    /// `SELECT ... FOR UPDATE`: takes the write lock, then reads the latest
    /// committed value.
    ReadForUpdate { key: String },
    Write { key: String, update: Update },
    Insert { key: String, value: f64 },
    /// `SELECT COUNT(*) ... WHERE predicate`
    Count { predicate: Predicate },
    Commit,
    Abort,
    /// Yields to the next event. Advances only the logical clock.
    Sleep,
}

impl Operation {
    /// Key whose write lock this operation needs, if any.
    pub fn lock_key(&self) -> Option<&str> {
        match self {
            Operation::ReadForUpdate { key } | Operation::Write { key, .. } => Some(key.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read { key } => write!(f, "READ {}", key),
            Operation::ReadForUpdate { key } => write!(f, "READ {} FOR UPDATE", key),
            Operation::Write { key, update } => write!(f, "UPDATE {} {}", key, update),
            Operation::Insert { key, value } => write!(f, "INSERT {} = {}", key, value),
            Operation::Count { predicate } => write!(f, "COUNT {}", predicate),
            Operation::Commit => f.write_str("COMMIT"),
            Operation::Abort => f.write_str("ROLLBACK"),
            Operation::Sleep => f.write_str("SLEEP"),
        }
    }
}

/// One step of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub session: String,
    #[serde(flatten)]
    pub op: Operation,
}

impl Event {
    pub fn new(session: impl Into<String>, op: Operation) -> Self {
        Self {
            session: session.into(),
            op,
        }
    }

    pub fn read(session: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(session, Operation::Read { key: key.into() })
    }

    pub fn read_for_update(session: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(session, Operation::ReadForUpdate { key: key.into() })
    }

    pub fn write(session: impl Into<String>, key: impl Into<String>, update: Update) -> Self {
        Self::new(
            session,
            Operation::Write {
                key: key.into(),
                update,
            },
        )
    }

    pub fn insert(session: impl Into<String>, key: impl Into<String>, value: f64) -> Self {
        Self::new(
            session,
            Operation::Insert {
                key: key.into(),
                value,
            },
        )
    }

    pub fn count(session: impl Into<String>, predicate: Predicate) -> Self {
        Self::new(session, Operation::Count { predicate })
    }

    pub fn commit(session: impl Into<String>) -> Self {
        Self::new(session, Operation::Commit)
    }

    pub fn abort(session: impl Into<String>) -> Self {
        Self::new(session, Operation::Abort)
    }

    pub fn sleep(session: impl Into<String>) -> Self {
        Self::new(session, Operation::Sleep)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.session, self.op)
    }
}
