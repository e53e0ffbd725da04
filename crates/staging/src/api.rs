//! Remote collaborators
//!
//! The orchestrator and the session commands talk to the cluster-facing
//! service only through these traits, so they can be exercised against
//! in-memory fakes.

use crate::session::{Session, SessionSummary};
use crate::types::{GroupApplyResponse, HpaId, HpaValues, NodePoolOperation, NodePoolTarget, NodePoolValues};
use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Resource apply API
///
/// Single-item calls send the complete value set, never a partial patch.
/// Implementations are expected to enforce their own deadline; the
/// orchestrator waits for every call to return.
pub trait ResourceApi: Send + Sync {
    /// Apply the full value set of one HPA
    fn apply_hpa(&self, id: &HpaId, values: &HpaValues) -> Result<()>;

    /// Apply the full value set of one node pool
    fn apply_node_pool(&self, target: &NodePoolTarget, values: &NodePoolValues) -> Result<()>;

    /// Apply an ordered group of node pools in a single call
    ///
    /// A transport failure is an `Err`; a remote failure is a response with
    /// `success == false`.
    fn apply_node_pool_group(
        &self,
        cluster: &str,
        operations: &[NodePoolOperation],
    ) -> Result<GroupApplyResponse>;
}

/// Persisted session store
pub trait SessionStore {
    /// List stored sessions
    fn list(&self) -> Result<Vec<SessionSummary>>;

    /// Fetch a session by name
    fn get(&self, name: &str) -> Result<Session>;

    /// Store a new session
    fn create(&self, session: &Session) -> Result<()>;

    /// Replace an existing session
    fn update(&self, name: &str, session: &Session) -> Result<()>;

    /// Delete a session
    fn delete(&self, name: &str) -> Result<()>;

    /// Rename a session
    fn rename(&self, name: &str, new_name: &str) -> Result<()>;
}

/// In-memory session store for tests and dry runs
///
/// Clones share the same sessions.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<BTreeMap<String, Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with sessions
    pub fn with_sessions(sessions: impl IntoIterator<Item = Session>) -> Self {
        let store = Self::new();
        {
            let mut map = store.lock();
            for session in sessions {
                map.insert(session.name.clone(), session);
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Session>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn list(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.lock().values().map(Session::summary).collect())
    }

    fn get(&self, name: &str) -> Result<Session> {
        match self.lock().get(name) {
            Some(session) => Ok(session.clone()),
            None => bail!("session '{name}' not found"),
        }
    }

    fn create(&self, session: &Session) -> Result<()> {
        let mut map = self.lock();
        if map.contains_key(&session.name) {
            bail!("session '{}' already exists", session.name);
        }
        map.insert(session.name.clone(), session.clone());
        Ok(())
    }

    fn update(&self, name: &str, session: &Session) -> Result<()> {
        let mut map = self.lock();
        let Some(slot) = map.get_mut(name) else {
            bail!("session '{name}' not found");
        };
        *slot = session.clone();
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        match self.lock().remove(name) {
            Some(_) => Ok(()),
            None => bail!("session '{name}' not found"),
        }
    }

    fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        let mut map = self.lock();
        if map.contains_key(new_name) {
            bail!("session '{new_name}' already exists");
        }
        let Some(mut session) = map.remove(name) else {
            bail!("session '{name}' not found");
        };
        session.name = new_name.to_string();
        map.insert(new_name.to_string(), session);
        Ok(())
    }
}
