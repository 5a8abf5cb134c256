use serde::{Deserialize, Serialize};

/// Represents a committed value with an associated version.
///
/// Every committed write in the record store is wrapped in `VersionedValue`
/// to track the logical commit version at which the value became visible.
/// Snapshot reads pick the newest `VersionedValue` whose version does not
/// exceed the reader's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    /// The committed value.
    value: f64,
    /// The commit version that produced this value. Seeded values are at version 0.
    version: u64,
}

impl VersionedValue {
    /// Creates a new `VersionedValue`.
    ///
    /// # Examples
    ///
    /// ```
    /// use isorace::prelude::*;
    ///
    /// let versioned_value = VersionedValue::new(27.3689, 0);
    /// assert_eq!(versioned_value.version(), 0);
    /// ```
    pub fn new(value: f64, version: u64) -> Self {
        Self { value, version }
    }

    /// Returns the committed value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the version of the value.
    pub fn version(&self) -> u64 {
        self.version
    }
}
