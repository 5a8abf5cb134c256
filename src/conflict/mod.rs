/// This module contains the commit-time checks for serializable sessions.
pub mod detection;
/// This module contains the lock contention policies.
pub mod resolution;
