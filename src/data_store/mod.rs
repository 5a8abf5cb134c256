/// A single versioned row with its lock and staged value.
pub mod record;
/// The shared in-memory record store.
pub mod record_store;
/// Committed value plus the version that produced it.
pub mod versioned_value;
