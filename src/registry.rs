use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::error::RegistryError;
use crate::session::{Session, SessionId};

/// The set of currently connected sessions.
///
/// The lock is only held for map operations and never across an `.await`,
/// so a plain `std` mutex is enough and unregistering works from `Drop`.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        // A panic elsewhere cannot leave the map half-updated.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a session so it receives broadcasts.
    ///
    /// # Arguments
    /// - `session`: The session to add; its id must not be registered yet.
    ///
    /// # Returns
    /// `Ok(())` once added, or `RegistryError::DuplicateSession` if the id is
    /// already present, in which case the registry is unchanged.
    pub fn register(&self, session: Session) -> Result<(), RegistryError> {
        let mut sessions = self.lock();
        let id = session.id();
        if sessions.contains_key(&id) {
            return Err(RegistryError::DuplicateSession(id));
        }
        info!("{} connects as {} ({})", session.peer(), session.name(), id);
        sessions.insert(id, session);
        Ok(())
    }

    /// Removes a session; later broadcasts no longer reach it.
    ///
    /// # Arguments
    /// - `id`: The id of the session to remove.
    ///
    /// # Returns
    /// The removed `Session`, or `RegistryError::NotFound` if no session has
    /// that id.
    pub fn unregister(&self, id: SessionId) -> Result<Session, RegistryError> {
        let session = self.lock().remove(&id).ok_or(RegistryError::NotFound(id))?;
        info!("{} disconnects ({})", session.peer(), id);
        Ok(session)
    }

    /// Point-in-time copy of the registered sessions.
    ///
    /// # Returns
    /// Clones of every registered `Session`, in no particular order. Later
    /// register/unregister calls do not affect the returned list.
    pub fn snapshot(&self) -> Vec<Session> {
        self.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().values().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Keeps a session registered for as long as it lives.
///
/// Dropping it unregisters exactly once, whichever way the handler exits.
pub struct Registration {
    registry: Arc<ClientRegistry>,
    id: SessionId,
}

impl Registration {
    pub fn new(registry: Arc<ClientRegistry>, session: Session) -> Result<Self, RegistryError> {
        let id = session.id();
        registry.register(session)?;
        Ok(Registration { registry, id })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Err(e) = self.registry.unregister(self.id) {
            debug!("unregister on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn session(name: &str) -> Session {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        Session::new(name, peer).0
    }

    #[test]
    fn register_twice_is_duplicate() {
        let registry = ClientRegistry::new();
        let s = session("alice");
        registry.register(s.clone()).unwrap();
        assert_eq!(
            registry.register(s.clone()),
            Err(RegistryError::DuplicateSession(s.id()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_missing_is_not_found() {
        let registry = ClientRegistry::new();
        let s = session("bob");
        assert_eq!(
            registry.unregister(s.id()).unwrap_err(),
            RegistryError::NotFound(s.id())
        );
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let registry = ClientRegistry::new();
        let a = session("a");
        let b = session("b");
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();

        let snapshot = registry.snapshot();
        registry.unregister(a.id()).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(a.id()));
        assert!(registry.contains(b.id()));
    }

    #[test]
    fn registration_guard_unregisters_once() {
        let registry = Arc::new(ClientRegistry::new());
        let s = session("carol");
        let guard = Registration::new(registry.clone(), s.clone()).unwrap();
        assert!(registry.contains(guard.id()));
        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn registration_guard_unregisters_on_panic() {
        let registry = Arc::new(ClientRegistry::new());
        let s = session("dave");
        let r = registry.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = Registration::new(r, s).unwrap();
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_churn_leaves_no_entries() {
        let registry = Arc::new(ClientRegistry::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let s = session(&format!("user{i}"));
                let guard = Registration::new(registry.clone(), s).unwrap();
                tokio::task::yield_now().await;
                let _ = registry.snapshot();
                drop(guard);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
