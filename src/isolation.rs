use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data_store::record::Record;

/// Defines the SQL isolation levels a simulated session can run under.
///
/// The level decides which version of a record a plain (non-locking) read
/// returns. Locking reads and writes always operate on the latest committed
/// value, whatever the level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    /// **Read Uncommitted:**
    ///
    /// Reads return the staged value of whichever session holds the record's
    /// write lock. Dirty reads, non-repeatable reads and phantom reads are all
    /// possible.
    ReadUncommitted,
    /// **Read Committed:**
    ///
    /// Every read returns the latest committed value at the moment it runs.
    /// Dirty reads are prevented; a second read of the same key may observe a
    /// change committed in between.
    ReadCommitted,
    /// **Repeatable Read:**
    ///
    /// The first consistent read pins a snapshot version and every later read
    /// is served from it, so repeated reads of a key are stable. Whether rows
    /// inserted and committed after the snapshot show up is decided by the
    /// simulator's `phantom_protection` flag: MySQL's next-key locking hides
    /// them, the SQL standard allows them. MySQL's default.
    #[default]
    RepeatableRead,
    /// **Serializable:**
    ///
    /// Reads behave like `RepeatableRead` with phantom protection always on.
    /// In addition, the read set and counted predicates of an active
    /// serializable session act as shared locks: a concurrent commit that
    /// would invalidate them is rejected with a conflict.
    Serializable,
}

impl IsolationLevel {
    pub const ALL: [IsolationLevel; 4] = [
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ];

    /// True when reads may observe another session's staged value.
    pub fn sees_uncommitted(self) -> bool {
        self == IsolationLevel::ReadUncommitted
    }

    /// True when reads are served from a snapshot pinned at the first read.
    pub fn uses_snapshot(self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }

    /// SQL spelling, as in `SET SESSION TRANSACTION ISOLATION LEVEL ...`.
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Where a read value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
    /// A committed version.
    Committed,
    /// A value staged by another, still uncommitted, session.
    Uncommitted { writer: String },
    /// The reading session's own pending write.
    OwnWrite,
}

/// The value a session is allowed to see for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleValue {
    pub value: f64,
    /// Committed version observed. For a staged value this is the version of
    /// the committed value underneath, 0 for a pending insert.
    pub version: u64,
    pub source: ReadSource,
}

/// Everything the isolation policy needs to know about the reader.
#[derive(Debug, Clone, Copy)]
pub struct ReadView<'a> {
    pub level: IsolationLevel,
    pub reader: &'a str,
    /// Snapshot version, set for snapshot levels once the first read ran.
    pub snapshot: Option<u64>,
    pub phantom_protection: bool,
}

/// Decides which value of `record` the reader described by `view` sees.
///
/// Returns `None` when the record is invisible to the reader: a pending insert
/// of another session below `ReadUncommitted`, or a row committed after the
/// reader's snapshot while phantoms are blocked.
pub fn visible_value(view: &ReadView<'_>, record: &Record) -> Option<VisibleValue> {
    let committed_version = record.latest().map_or(0, |v| v.version());

    if let Some((writer, value)) = record.staged() {
        if writer == view.reader {
            return Some(VisibleValue {
                value,
                version: committed_version,
                source: ReadSource::OwnWrite,
            });
        }
        if view.level.sees_uncommitted() {
            return Some(VisibleValue {
                value,
                version: committed_version,
                source: ReadSource::Uncommitted {
                    writer: writer.to_string(),
                },
            });
        }
    }

    let committed = match (view.level, view.snapshot) {
        (IsolationLevel::ReadUncommitted | IsolationLevel::ReadCommitted, _) => record.latest(),
        (_, None) => record.latest(),
        (IsolationLevel::RepeatableRead, Some(snapshot)) => match record.as_of(snapshot) {
            Some(v) => Some(v),
            None if !view.phantom_protection => record.latest(),
            None => None,
        },
        (IsolationLevel::Serializable, Some(snapshot)) => record.as_of(snapshot),
    }?;

    Some(VisibleValue {
        value: committed.value(),
        version: committed.version(),
        source: ReadSource::Committed,
    })
}

/// Current read used by locking reads and writes: own staged value, otherwise
/// the latest committed value.
pub fn current_value(reader: &str, record: &Record) -> Option<VisibleValue> {
    let committed = record.latest();
    if let Some((writer, value)) = record.staged() {
        if writer == reader {
            return Some(VisibleValue {
                value,
                version: committed.map_or(0, |v| v.version()),
                source: ReadSource::OwnWrite,
            });
        }
    }
    committed.map(|v| VisibleValue {
        value: v.value(),
        version: v.version(),
        source: ReadSource::Committed,
    })
}
