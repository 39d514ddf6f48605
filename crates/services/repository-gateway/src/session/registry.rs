//! Connection id to session mapping

use super::worker::SessionHandle;
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Registry of live sessions
///
/// Backed by a sharded map so unrelated connections never contend on one
/// lock. Holds at most one session per connection and at most `max_sessions`
/// sessions overall; a slot is reserved before the session is built so the
/// limit also covers sessions still being set up.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    slots: AtomicUsize,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            slots: AtomicUsize::new(0),
            max_sessions,
        }
    }

    /// Build and register a session for `connection_id`
    ///
    /// Fails with [`Error::SessionExists`] if the connection already has one,
    /// or [`Error::ResourceExhausted`] when the session limit is reached. No
    /// map lock is held while `build` runs.
    pub async fn create<F, Fut>(&self, connection_id: &str, build: F) -> Result<SessionHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionHandle>>,
    {
        if self.sessions.contains_key(connection_id) {
            return Err(Error::SessionExists(connection_id.to_string()));
        }

        let reserved = self
            .slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_sessions).then_some(n + 1)
            });
        if reserved.is_err() {
            warn!(session_id = %connection_id, max_sessions = self.max_sessions, "Session limit reached");
            return Err(Error::ResourceExhausted(format!(
                "session limit of {} reached",
                self.max_sessions
            )));
        }

        let handle = match build().await {
            Ok(handle) => handle,
            Err(e) => {
                self.slots.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        let inserted = match self.sessions.entry(connection_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(handle.clone());
                true
            }
        };

        if !inserted {
            // Lost a race with another create for the same connection
            self.slots.fetch_sub(1, Ordering::SeqCst);
            handle.close().await;
            return Err(Error::SessionExists(connection_id.to_string()));
        }

        info!(session_id = %connection_id, sessions = self.len(), "Session registered");
        Ok(handle)
    }

    pub fn get(&self, connection_id: &str) -> Option<SessionHandle> {
        self.sessions.get(connection_id).map(|entry| entry.value().clone())
    }

    /// Unregister a session; a second call for the same id returns `None`
    pub fn remove(&self, connection_id: &str) -> Option<SessionHandle> {
        let (_, handle) = self.sessions.remove(connection_id)?;
        self.slots.fetch_sub(1, Ordering::SeqCst);
        Some(handle)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.sessions.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Remove and close every session
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some(handle) = self.remove(&id) {
                handle.close().await;
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(100)
    }
}
