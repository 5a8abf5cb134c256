use crate::data_store::versioned_value::VersionedValue;
use crate::errors::Result;

/// The key type for records in the store.
type DataKey = String;

/// Represents a single committed change forwarded to the storage layer.
///
/// The record store emits one `StorageMutation` per key a session commits.
/// Aborted sessions never produce mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageMutation {
    /// A record that did not exist before this commit.
    Insert(DataKey, VersionedValue),
    /// A new version of an existing record.
    Update(DataKey, VersionedValue),
}

/// Trait for a backend receiving the committed state of the simulation.
///
/// The simulator only ever calls `apply_mutations` from inside a commit, with
/// every mutation of that commit in a single batch. A backend that returns an
/// error vetoes the commit: the record store leaves its committed state
/// untouched and the session's staged writes stay in place until it aborts.
///
/// Implementations must be `Send` and `Sync` so a store can be shared.
///
/// # Examples
///
/// ```
/// use isorace::prelude::*;
/// use parking_lot::Mutex;
///
/// #[derive(Default)]
/// struct CommitLog {
///     batches: Mutex<Vec<Vec<StorageMutation>>>,
/// }
///
/// impl Storage for CommitLog {
///     fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()> {
///         self.batches.lock().push(mutations);
///         Ok(())
///     }
/// }
/// ```
pub trait Storage: Send + Sync {
    /// Atomically applies the mutations of one commit.
    fn apply_mutations(&self, mutations: Vec<StorageMutation>) -> Result<()>;
}
