//! Registry of background work keyed by the user it was started for.
//!
//! Every task takes a [`TaskTicket`] when it starts and checks it before
//! applying its result. A ticket goes stale when the task is invalidated
//! or the registry is cleared (identity change, sign-out, unmount).

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ProfileFetch,
    RoleReconcile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTicket {
    user_id: String,
    kind: TaskKind,
    id: u64,
}

impl TaskTicket {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    live: HashMap<(String, TaskKind), u64>,
}

#[derive(Default)]
pub struct InFlightRegistry {
    entries: Mutex<Entries>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Returns `None` when the same kind of work for the
    /// same user is already running.
    pub fn begin(&self, user_id: &str, kind: TaskKind) -> Option<TaskTicket> {
        let mut entries = self.entries.lock();
        let key = (user_id.to_string(), kind);
        if entries.live.contains_key(&key) {
            return None;
        }
        entries.next_id += 1;
        let id = entries.next_id;
        entries.live.insert(key, id);
        Some(TaskTicket {
            user_id: user_id.to_string(),
            kind,
            id,
        })
    }

    pub fn is_current(&self, ticket: &TaskTicket) -> bool {
        self.entries
            .lock()
            .live
            .get(&(ticket.user_id.clone(), ticket.kind))
            == Some(&ticket.id)
    }

    /// Release a ticket. Returns whether it was still current.
    pub fn finish(&self, ticket: &TaskTicket) -> bool {
        let mut entries = self.entries.lock();
        let key = (ticket.user_id.clone(), ticket.kind);
        if entries.live.get(&key) == Some(&ticket.id) {
            entries.live.remove(&key);
            true
        } else {
            false
        }
    }

    /// Make the running task of `kind` for `user_id` stale.
    pub fn invalidate(&self, user_id: &str, kind: TaskKind) {
        self.entries.lock().live.remove(&(user_id.to_string(), kind));
    }

    /// Make every running task stale.
    pub fn discard_all(&self) {
        self.entries.lock().live.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_deduplicates_per_user_and_kind() {
        let registry = InFlightRegistry::new();

        let first = registry.begin("u1", TaskKind::ProfileFetch).unwrap();
        assert!(registry.begin("u1", TaskKind::ProfileFetch).is_none());
        assert!(registry.begin("u1", TaskKind::RoleReconcile).is_some());
        assert!(registry.begin("u2", TaskKind::ProfileFetch).is_some());

        assert!(registry.finish(&first));
        assert!(registry.begin("u1", TaskKind::ProfileFetch).is_some());
    }

    #[test]
    fn test_discard_all_makes_tickets_stale() {
        let registry = InFlightRegistry::new();
        let ticket = registry.begin("u1", TaskKind::ProfileFetch).unwrap();

        registry.discard_all();

        assert!(!registry.is_current(&ticket));
        assert!(!registry.finish(&ticket));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_ticket_cannot_release_newer_task() {
        let registry = InFlightRegistry::new();
        let old = registry.begin("u1", TaskKind::ProfileFetch).unwrap();
        registry.invalidate("u1", TaskKind::ProfileFetch);
        let new = registry.begin("u1", TaskKind::ProfileFetch).unwrap();

        assert!(!registry.finish(&old));
        assert!(registry.is_current(&new));
        assert_eq!(new.user_id(), "u1");
        assert_eq!(new.kind(), TaskKind::ProfileFetch);
    }
}
