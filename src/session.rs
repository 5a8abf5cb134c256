use ahash::AHashMap as HashMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::conflict::detection::{describe_conflicts, detect_stale_reads};
use crate::data_store::record_store::RecordStore;
use crate::errors::{Result, SimError};
use crate::data_store::record::Record;
use crate::isolation::{
    current_value, visible_value, IsolationLevel, ReadSource, ReadView, VisibleValue,
};
use crate::schedule::{Predicate, Update};

/// Lifecycle state of a session. `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Committed,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Active => "active",
            SessionState::Committed => "committed",
            SessionState::Aborted => "aborted",
        })
    }
}

/// A value staged by the session and not yet committed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingWrite {
    pub value: f64,
    /// The key did not exist before this session created it.
    pub inserted: bool,
}

/// Represents a single simulated database session running one transaction.
///
/// A session reads through the isolation policy of its level, stages writes
/// in the shared [`RecordStore`] under the record's write lock, and keeps the
/// read set, write set and counted predicates needed for conflict detection.
/// Sessions are created by the simulator; once committed or aborted every
/// further operation fails with [`SimError::SessionClosed`].
pub struct Session {
    name: String,
    isolation_level: IsolationLevel,
    phantom_protection: bool,
    state: SessionState,
    store: Arc<RecordStore>,
    /// Commit version pinned at the first consistent read (snapshot levels only).
    snapshot: Option<u64>,
    /// First value and version observed per key.
    read_set: HashMap<String, VisibleValue>,
    write_set: HashMap<String, PendingWrite>,
    predicates: Vec<Predicate>,
    /// Version first seen for rows committed after the snapshot.
    pinned: HashMap<String, u64>,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        isolation_level: IsolationLevel,
        phantom_protection: bool,
        store: Arc<RecordStore>,
    ) -> Self {
        Self {
            name: name.into(),
            isolation_level,
            phantom_protection,
            state: SessionState::Active,
            store,
            snapshot: None,
            read_set: HashMap::new(),
            write_set: HashMap::new(),
            predicates: Vec::new(),
            pinned: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn snapshot(&self) -> Option<u64> {
        self.snapshot
    }

    pub fn read_set(&self) -> &HashMap<String, VisibleValue> {
        &self.read_set
    }

    pub fn write_set(&self) -> &HashMap<String, PendingWrite> {
        &self.write_set
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Consistent read of `key` through the isolation policy.
    ///
    /// For `RepeatableRead` and `Serializable` the first read pins the
    /// session's snapshot.
    pub fn read(&mut self, key: &str) -> Result<VisibleValue> {
        self.ensure_active()?;
        self.pin_snapshot();
        let record = self
            .store
            .record(key)
            .ok_or_else(|| SimError::NotFound(key.to_string()))?;
        let seen = self
            .consistent_value(key, &record)
            .ok_or_else(|| SimError::NotFound(key.to_string()))?;
        debug!(
            "{} ({}) read {} = {} (v{}, {:?})",
            self.name, self.isolation_level, key, seen.value, seen.version, seen.source
        );
        self.record_read(key, &seen);
        Ok(seen)
    }

    /// `SELECT ... FOR UPDATE`: takes the write lock, then reads the latest
    /// committed value (or the session's own staged value).
    pub fn read_for_update(&mut self, key: &str) -> Result<VisibleValue> {
        self.ensure_active()?;
        self.acquire(key)?;
        let seen = self.current(key)?;
        debug!("{} locked and read {} = {} (v{})", self.name, key, seen.value, seen.version);
        self.record_read(key, &seen);
        Ok(seen)
    }

    /// Locks `key`, applies `update` to its current value and stages the result.
    ///
    /// Fails with [`SimError::Conflict`] when another session holds the lock.
    /// Returns the staged value.
    pub fn write(&mut self, key: &str, update: Update) -> Result<f64> {
        self.ensure_active()?;
        self.acquire(key)?;
        let current = self.current(key)?;
        let value = update.apply(current.value);
        self.store.write_uncommitted(key, &self.name, value)?;
        let inserted = self.write_set.get(key).is_some_and(|w| w.inserted);
        self.write_set
            .insert(key.to_string(), PendingWrite { value, inserted });
        debug!("{} staged {} = {} ({} {})", self.name, key, value, current.value, update);
        Ok(value)
    }

    /// Stages a new record. Fails with a conflict when the key already exists.
    pub fn insert(&mut self, key: &str, value: f64) -> Result<()> {
        self.ensure_active()?;
        self.store.stage_insert(key, &self.name, value)?;
        self.write_set.insert(
            key.to_string(),
            PendingWrite {
                value,
                inserted: true,
            },
        );
        debug!("{} staged insert {} = {}", self.name, key, value);
        Ok(())
    }

    /// Counts the records visible to this session that match `predicate`.
    pub fn count(&mut self, predicate: Predicate) -> Result<usize> {
        self.ensure_active()?;
        self.pin_snapshot();
        let mut matched = Vec::new();
        for (key, record) in self.store.records() {
            if let Some(seen) = self.consistent_value(&key, &record) {
                if predicate.matches(seen.value) {
                    matched.push((key, seen));
                }
            }
        }
        let count = matched.len();
        if self.isolation_level == IsolationLevel::Serializable {
            for (key, seen) in &matched {
                self.record_read(key, seen);
            }
        }
        self.predicates.push(predicate);
        debug!("{} counted {} row(s) where {}", self.name, count, predicate);
        Ok(count)
    }

    /// Commits the session's staged writes.
    ///
    /// A serializable session whose read set went stale is rejected with
    /// [`SimError::Conflict`] and aborted. Returns the commit version, `None`
    /// when nothing was written.
    pub fn commit(&mut self) -> Result<Option<u64>> {
        self.ensure_active()?;
        if self.isolation_level == IsolationLevel::Serializable {
            let conflicts = detect_stale_reads(self, &self.store);
            if !conflicts.is_empty() {
                return Err(self.reject(describe_conflicts(&conflicts)));
            }
        }
        let version = self.store.commit(&self.name)?;
        self.state = SessionState::Committed;
        debug!("{} committed at {:?}", self.name, version);
        Ok(version)
    }

    /// Rolls back the session's staged writes and releases its locks.
    pub fn abort(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.store.abort(&self.name);
        self.state = SessionState::Aborted;
        debug!("{} rolled back", self.name);
        Ok(())
    }

    /// Aborts the session because its commit was refused.
    pub(crate) fn reject(&mut self, reason: String) -> SimError {
        self.store.abort(&self.name);
        self.state = SessionState::Aborted;
        debug!("{} commit rejected: {}", self.name, reason);
        SimError::Conflict(reason)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(SimError::SessionClosed(self.name.clone()))
        }
    }

    fn view(&self) -> ReadView<'_> {
        ReadView {
            level: self.isolation_level,
            reader: &self.name,
            snapshot: self.snapshot,
            phantom_protection: self.phantom_protection,
        }
    }

    /// Consistent read of one record. A row that only became visible after
    /// the snapshot (phantom protection off) keeps the version seen first.
    fn consistent_value(&mut self, key: &str, record: &Record) -> Option<VisibleValue> {
        let seen = visible_value(&self.view(), record)?;
        let Some(snapshot) = self.snapshot else {
            return Some(seen);
        };
        if seen.source != ReadSource::Committed || seen.version <= snapshot {
            return Some(seen);
        }
        match self.pinned.get(key) {
            Some(&version) => record.as_of(version).map(|pinned| VisibleValue {
                value: pinned.value(),
                version: pinned.version(),
                source: ReadSource::Committed,
            }),
            None => {
                self.pinned.insert(key.to_string(), seen.version);
                Some(seen)
            }
        }
    }

    fn pin_snapshot(&mut self) {
        if self.isolation_level.uses_snapshot() && self.snapshot.is_none() {
            self.snapshot = Some(self.store.current_version());
        }
    }

    fn acquire(&self, key: &str) -> Result<()> {
        if self.store.lock(key, &self.name)? {
            return Ok(());
        }
        let holder = self.store.holder(key).unwrap_or_default();
        Err(SimError::Conflict(format!("{} is locked by {}", key, holder)))
    }

    fn current(&self, key: &str) -> Result<VisibleValue> {
        self.store
            .record(key)
            .and_then(|record| current_value(&self.name, &record))
            .ok_or_else(|| SimError::NotFound(key.to_string()))
    }

    fn record_read(&mut self, key: &str, seen: &VisibleValue) {
        if seen.source != ReadSource::OwnWrite {
            self.read_set
                .entry(key.to_string())
                .or_insert_with(|| seen.clone());
        }
    }
}
