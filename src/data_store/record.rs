use crate::data_store::versioned_value::VersionedValue;

/// A single row in the record store.
///
/// A record keeps its full committed history so that snapshot readers can be
/// served the value that was current when their snapshot was taken. On top of
/// the history sits at most one staged value, owned by the session holding the
/// record's write lock. A record created by an uncommitted insert has an empty
/// history until its owner commits.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Committed values in ascending version order.
    history: Vec<VersionedValue>,
    /// Session currently holding the write lock, if any.
    lock_holder: Option<String>,
    /// Value written by `lock_holder` and not yet committed.
    staged: Option<f64>,
}

impl Record {
    /// Creates a committed record at the given version.
    pub fn committed(value: f64, version: u64) -> Self {
        Self {
            history: vec![VersionedValue::new(value, version)],
            lock_holder: None,
            staged: None,
        }
    }

    /// Creates a record that only exists as an uncommitted insert by `session`.
    pub fn staged_insert(session: &str, value: f64) -> Self {
        Self {
            history: Vec::new(),
            lock_holder: Some(session.to_string()),
            staged: Some(value),
        }
    }

    /// Latest committed value, `None` for a pending insert.
    pub fn latest(&self) -> Option<VersionedValue> {
        self.history.last().copied()
    }

    /// Newest committed value whose version is `<= version`.
    pub fn as_of(&self, version: u64) -> Option<VersionedValue> {
        self.history
            .iter()
            .rev()
            .find(|v| v.version() <= version)
            .copied()
    }

    pub fn history(&self) -> &[VersionedValue] {
        &self.history
    }

    pub fn lock_holder(&self) -> Option<&str> {
        self.lock_holder.as_deref()
    }

    /// Staged value together with its owner.
    pub fn staged(&self) -> Option<(&str, f64)> {
        match (&self.lock_holder, self.staged) {
            (Some(holder), Some(value)) => Some((holder.as_str(), value)),
            _ => None,
        }
    }

    /// True when the record has never been committed.
    pub fn is_pending_insert(&self) -> bool {
        self.history.is_empty()
    }

    pub(crate) fn set_lock(&mut self, session: &str) {
        self.lock_holder = Some(session.to_string());
    }

    pub(crate) fn stage(&mut self, value: f64) {
        self.staged = Some(value);
    }

    /// Promotes the staged value (if any) to a committed version and releases the lock.
    pub(crate) fn promote(&mut self, version: u64) -> Option<VersionedValue> {
        self.lock_holder = None;
        self.staged.take().map(|value| {
            let committed = VersionedValue::new(value, version);
            self.history.push(committed);
            committed
        })
    }

    /// Drops the staged value and releases the lock.
    pub(crate) fn release(&mut self) {
        self.lock_holder = None;
        self.staged = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_of_picks_newest_visible_version() {
        let mut record = Record::committed(1.0, 0);
        record.set_lock("A");
        record.stage(2.0);
        record.promote(3);
        record.set_lock("B");
        record.stage(5.0);
        record.promote(7);

        assert_eq!(record.as_of(0).map(|v| v.value()), Some(1.0));
        assert_eq!(record.as_of(6).map(|v| v.value()), Some(2.0));
        assert_eq!(record.as_of(7).map(|v| v.value()), Some(5.0));
        assert_eq!(record.latest().map(|v| v.version()), Some(7));
        assert_eq!(record.history()[0].version(), 0);
    }

    #[test]
    fn promote_without_staged_value_only_releases_lock() {
        let mut record = Record::committed(1.0, 0);
        record.set_lock("A");
        assert!(record.promote(1).is_none());
        assert!(record.lock_holder().is_none());
        assert_eq!(record.history().len(), 1);
    }

    #[test]
    fn pending_insert_has_no_committed_history() {
        let record = Record::staged_insert("A", 12.0);
        assert!(record.is_pending_insert());
        assert!(record.latest().is_none());
        assert_eq!(record.staged(), Some(("A", 12.0)));
    }
}
