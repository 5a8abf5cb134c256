use serde::{Deserialize, Serialize};

/// Defines what happens when a session asks for a write lock another session holds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Block until the holder commits or aborts. The blocked event and every
    /// later event of the session are parked and replayed once the lock frees up.
    #[default]
    Wait,
    /// Fail the event with a conflict. The session stays active and may retry.
    Fail,
    /// Fail the event with a conflict and abort the session.
    Abort,
}
