use ahash::AHashMap as HashMap;
use std::fmt;

use crate::data_store::record_store::RecordStore;
use crate::isolation::IsolationLevel;
use crate::session::Session;

/// Represents the type of conflict detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// The committer writes a key an active serializable session has read.
    ReadWrite,
    /// The committer writes a row matching a predicate an active serializable
    /// session has counted.
    Phantom,
    /// A key the committer read was committed by another session since.
    StaleRead,
}

/// One detected conflict, keyed by record in the maps below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictType,
    /// The other session involved, when known.
    pub with: Option<String>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ConflictType::ReadWrite => "read by",
            ConflictType::Phantom => "matches a range read by",
            ConflictType::StaleRead => "changed since read",
        };
        match &self.with {
            Some(session) => write!(f, "{} {}", what, session),
            None => f.write_str(what),
        }
    }
}

/// Checks a commit against the shared locks of active serializable sessions.
///
/// A serializable session's read set and counted predicates behave like
/// shared locks for as long as it is active. Any write of `committer` that
/// touches one of them is a conflict. Peers that are not serializable, not
/// active, or the committer itself are ignored.
pub fn detect_peer_conflicts<'a>(
    committer: &Session,
    peers: impl IntoIterator<Item = &'a Session>,
) -> HashMap<String, Conflict> {
    let mut conflicts: HashMap<String, Conflict> = HashMap::new();

    for peer in peers {
        if peer.name() == committer.name()
            || !peer.is_active()
            || peer.isolation_level() != IsolationLevel::Serializable
        {
            continue;
        }
        for (key, write) in committer.write_set() {
            if conflicts.contains_key(key) {
                continue;
            }
            let kind = if peer.read_set().contains_key(key) {
                ConflictType::ReadWrite
            } else if peer.predicates().iter().any(|p| p.matches(write.value)) {
                ConflictType::Phantom
            } else {
                continue;
            };
            conflicts.insert(
                key.clone(),
                Conflict {
                    kind,
                    with: Some(peer.name().to_string()),
                },
            );
        }
    }

    conflicts
}

/// Backward validation: keys in the session's read set whose latest committed
/// version is newer than the one the session observed.
pub fn detect_stale_reads(session: &Session, store: &RecordStore) -> HashMap<String, Conflict> {
    let mut conflicts: HashMap<String, Conflict> = HashMap::new();

    for (key, seen) in session.read_set() {
        if let Ok(latest) = store.read(key, None) {
            if latest.version() > seen.version {
                conflicts.insert(
                    key.clone(),
                    Conflict {
                        kind: ConflictType::StaleRead,
                        with: None,
                    },
                );
            }
        }
    }

    conflicts
}

/// Renders a conflict map as a stable, key-ordered message.
pub fn describe_conflicts(conflicts: &HashMap<String, Conflict>) -> String {
    let mut keys: Vec<&String> = conflicts.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| format!("{} {}", key, conflicts[key]))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{Predicate, Update};
    use std::sync::Arc;

    fn store() -> Arc<RecordStore> {
        Arc::new(RecordStore::seeded([("a", 1.0), ("b", 20.0)]))
    }

    #[test]
    fn write_to_key_read_by_serializable_peer_conflicts() {
        let store = store();
        let mut reader = Session::new("A", IsolationLevel::Serializable, true, store.clone());
        let mut writer = Session::new("B", IsolationLevel::ReadCommitted, true, store);
        reader.read("a").unwrap();
        writer.write("a", Update::Add(1.0)).unwrap();
        writer.write("b", Update::Add(1.0)).unwrap();

        let conflicts = detect_peer_conflicts(&writer, [&reader]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts["a"].kind, ConflictType::ReadWrite);
        assert_eq!(describe_conflicts(&conflicts), "a read by A");
    }

    #[test]
    fn insert_matching_counted_predicate_is_a_phantom() {
        let store = store();
        let mut reader = Session::new("A", IsolationLevel::Serializable, true, store.clone());
        let mut writer = Session::new("B", IsolationLevel::RepeatableRead, true, store);
        reader.count(Predicate::GreaterThan(10.0)).unwrap();
        writer.insert("c", 12.0).unwrap();
        writer.insert("d", 2.0).unwrap();

        let conflicts = detect_peer_conflicts(&writer, [&reader]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts["c"].kind, ConflictType::Phantom);
    }

    #[test]
    fn non_serializable_or_closed_peers_hold_no_shared_locks() {
        let store = store();
        let mut rr = Session::new("A", IsolationLevel::RepeatableRead, true, store.clone());
        let mut done = Session::new("C", IsolationLevel::Serializable, true, store.clone());
        let mut writer = Session::new("B", IsolationLevel::ReadCommitted, true, store);
        rr.read("a").unwrap();
        done.read("a").unwrap();
        done.commit().unwrap();
        writer.write("a", Update::Set(0.0)).unwrap();

        assert!(detect_peer_conflicts(&writer, [&rr, &done]).is_empty());
    }
}
