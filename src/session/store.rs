use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::AgentSession;

/// Handle to a session shared between the store and running tasks
pub type SharedSession = Arc<Mutex<AgentSession>>;

/// In-memory session map with idle eviction.
///
/// Sessions are created lazily on first reference. Locks are never held
/// across an await point.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, SharedSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the session for `id`, creating it against `working_dir` if absent.
    ///
    /// Repeated calls return the same handle.
    pub fn get_or_create(&self, id: &str, working_dir: &Path) -> SharedSession {
        let mut sessions = self.map();
        if let Some(existing) = sessions.get(id) {
            return Arc::clone(existing);
        }

        debug!(session_id = %id, working_dir = %working_dir.display(), "creating session");
        let session = Arc::new(Mutex::new(AgentSession::new(id, working_dir)));
        sessions.insert(id.to_string(), Arc::clone(&session));
        session
    }

    /// Look up an existing session without creating one
    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.map().get(id).cloned()
    }

    /// Put `session` back under `id` unless that id is already taken.
    /// Returns true when the session was re-inserted.
    pub fn reinstate(&self, id: &str, session: &SharedSession) -> bool {
        let mut sessions = self.map();
        if sessions.contains_key(id) {
            return false;
        }
        debug!(session_id = %id, "reinstating evicted session");
        sessions.insert(id.to_string(), Arc::clone(session));
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map().contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<SharedSession> {
        self.map().remove(id)
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Sorted ids of all live sessions
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.map().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Evict sessions idle for longer than `max_age`. Returns how many were removed.
    pub fn evict_idle(&self, max_age: Duration) -> usize {
        self.evict_idle_at(Utc::now(), max_age)
    }

    /// Same as [`evict_idle`](Self::evict_idle) with an explicit clock reading
    pub fn evict_idle_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let mut sessions = self.map();
        let before = sessions.len();

        sessions.retain(|id, session| {
            let idle = lock(session).is_idle(now, max_age);
            if idle {
                debug!(session_id = %id, "evicting idle session");
            }
            !idle
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "session cleanup");
        }
        evicted
    }
}

/// Lock a session, recovering the data from a poisoned lock
pub fn lock(session: &SharedSession) -> MutexGuard<'_, AgentSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
