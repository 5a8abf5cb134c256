use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::RwLock;

use crate::data_store::record::Record;
use crate::data_store::versioned_value::VersionedValue;
use crate::errors::{Result, SimError};
use crate::storage::{Storage, StorageMutation};

/// The key type for records in the store.
type DataKey = String;

/// A read served from the dirty view of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct DirtyValue {
    pub value: f64,
    /// Version of the latest committed value underneath, 0 for a pending insert.
    pub version: u64,
    /// Owner of the staged value, `None` when the committed value was returned.
    pub writer: Option<String>,
}

struct StoreState {
    records: BTreeMap<DataKey, Record>,
    /// Logical commit clock. Seeded data lives at version 0.
    clock: u64,
}

/// In-memory store of versioned records, standing in for the database engine.
///
/// The store is shared between sessions behind an `Arc`. Every method takes
/// the internal lock once, so each call, `commit` in particular, is a single
/// atomic step from the scheduler's point of view.
pub struct RecordStore {
    state: RwLock<StoreState>,
    storage: Option<Arc<dyn Storage>>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                records: BTreeMap::new(),
                clock: 0,
            }),
            storage: None,
        }
    }

    /// Creates a store pre-seeded with committed `(key, value)` pairs at version 0.
    ///
    /// # Examples
    ///
    /// ```
    /// use isorace::prelude::*;
    ///
    /// let store = RecordStore::seeded([("ASCC_105", 27.3689)]);
    /// let value = store.read("ASCC_105", None).unwrap();
    /// assert_eq!(value.value(), 27.3689);
    /// assert_eq!(value.version(), 0);
    /// ```
    pub fn seeded<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let records = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), Record::committed(value, 0)))
            .collect();
        Self {
            state: RwLock::new(StoreState { records, clock: 0 }),
            storage: None,
        }
    }

    /// Attaches a storage backend that receives every committed batch.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Current value of the logical commit clock.
    pub fn current_version(&self) -> u64 {
        self.state.read().clock
    }

    /// Reads the latest committed value, or the newest one at or below `as_of`.
    pub fn read(&self, key: &str, as_of: Option<u64>) -> Result<VersionedValue> {
        let state = self.state.read();
        let record = state
            .records
            .get(key)
            .ok_or_else(|| SimError::NotFound(key.to_string()))?;
        let found = match as_of {
            Some(version) => record.as_of(version),
            None => record.latest(),
        };
        found.ok_or_else(|| SimError::NotFound(key.to_string()))
    }

    /// Reads the staged value of whichever session holds the lock, falling back
    /// to the latest committed value.
    pub fn read_uncommitted(&self, key: &str) -> Result<DirtyValue> {
        let state = self.state.read();
        let record = state
            .records
            .get(key)
            .ok_or_else(|| SimError::NotFound(key.to_string()))?;
        let version = record.latest().map_or(0, |v| v.version());
        if let Some((writer, value)) = record.staged() {
            return Ok(DirtyValue {
                value,
                version,
                writer: Some(writer.to_string()),
            });
        }
        record
            .latest()
            .map(|v| DirtyValue {
                value: v.value(),
                version,
                writer: None,
            })
            .ok_or_else(|| SimError::NotFound(key.to_string()))
    }

    /// Returns a copy of the record stored under `key`.
    pub fn record(&self, key: &str) -> Option<Record> {
        self.state.read().records.get(key).cloned()
    }

    /// Returns a copy of every record in key order.
    pub fn records(&self) -> Vec<(String, Record)> {
        self.state
            .read()
            .records
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    /// Session holding the write lock on `key`.
    pub fn holder(&self, key: &str) -> Option<String> {
        self.state
            .read()
            .records
            .get(key)
            .and_then(|record| record.lock_holder().map(str::to_string))
    }

    /// Attempts to take the write lock on `key` for `session`.
    ///
    /// Never blocks: returns `Ok(false)` when another session holds the lock.
    /// Taking a lock the session already holds succeeds.
    pub fn lock(&self, key: &str, session: &str) -> Result<bool> {
        let mut state = self.state.write();
        let record = state
            .records
            .get_mut(key)
            .ok_or_else(|| SimError::NotFound(key.to_string()))?;
        match record.lock_holder() {
            Some(holder) if holder != session => {
                trace!("{} denied lock on {} held by {}", session, key, holder);
                Ok(false)
            }
            _ => {
                record.set_lock(session);
                Ok(true)
            }
        }
    }

    /// Creates `key` as an uncommitted record owned and locked by `session`.
    pub fn stage_insert(&self, key: &str, session: &str, value: f64) -> Result<()> {
        let mut state = self.state.write();
        if let Some(existing) = state.records.get(key) {
            let owner = existing.lock_holder().unwrap_or("a committed row");
            return Err(SimError::Conflict(format!(
                "duplicate key {} (held by {})",
                key, owner
            )));
        }
        state
            .records
            .insert(key.to_string(), Record::staged_insert(session, value));
        Ok(())
    }

    /// Stages `value` on `key` under the lock held by `session`.
    pub fn write_uncommitted(&self, key: &str, session: &str, value: f64) -> Result<()> {
        let mut state = self.state.write();
        let record = state
            .records
            .get_mut(key)
            .ok_or_else(|| SimError::NotFound(key.to_string()))?;
        if record.lock_holder() != Some(session) {
            return Err(SimError::LockNotHeld {
                key: key.to_string(),
                session: session.to_string(),
            });
        }
        record.stage(value);
        Ok(())
    }

    /// Makes every value staged by `session` the new committed value and
    /// releases all of its locks.
    ///
    /// All keys of one commit share a single new version. Returns `None` when
    /// the session had nothing staged, in which case the clock does not move.
    pub fn commit(&self, session: &str) -> Result<Option<u64>> {
        let mut state = self.state.write();
        let version = state.clock + 1;

        let mut mutations = Vec::new();
        for (key, record) in state.records.iter() {
            if let Some((holder, value)) = record.staged() {
                if holder == session {
                    let committed = VersionedValue::new(value, version);
                    mutations.push(if record.is_pending_insert() {
                        StorageMutation::Insert(key.clone(), committed)
                    } else {
                        StorageMutation::Update(key.clone(), committed)
                    });
                }
            }
        }

        if !mutations.is_empty() {
            if let Some(storage) = &self.storage {
                storage.apply_mutations(mutations.clone())?;
            }
        }

        for record in state.records.values_mut() {
            if record.lock_holder() == Some(session) {
                record.promote(version);
            }
        }

        if mutations.is_empty() {
            debug!("{} committed without changes", session);
            return Ok(None);
        }
        state.clock = version;
        debug!(
            "{} committed {} record(s) at version {}",
            session,
            mutations.len(),
            version
        );
        Ok(Some(version))
    }

    /// Discards everything staged by `session` and releases its locks.
    ///
    /// Returns the number of records released.
    pub fn abort(&self, session: &str) -> usize {
        let mut state = self.state.write();
        let mut released = 0;
        state.records.retain(|_, record| {
            if record.lock_holder() != Some(session) {
                return true;
            }
            released += 1;
            if record.is_pending_insert() {
                return false;
            }
            record.release();
            true
        });
        debug!("{} aborted, released {} lock(s)", session, released);
        released
    }

    /// Latest committed value of every record, in key order.
    pub fn snapshot(&self) -> BTreeMap<String, VersionedValue> {
        self.state
            .read()
            .records
            .iter()
            .filter_map(|(key, record)| record.latest().map(|v| (key.clone(), v)))
            .collect()
    }
}
