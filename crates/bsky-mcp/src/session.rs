//! In-memory registry binding MCP sessions to authenticated client handles.
//!
//! [`SessionRegistry`] maps a [`SessionKey`] to at most one [`ClientHandle`].
//! Handles are only inserted after their login has completed, so a lookup
//! never observes a half-built session.
//!
//! # Thread safety
//!
//! The map sits behind a [`std::sync::RwLock`] that is held only for the map
//! operation itself. Remote teardown of replaced or removed handles runs after
//! the lock is released, so no guard is ever held across an `.await`.
//!
//! # Examples
//!
//! ```
//! use bsky_mcp::session::{SessionKey, SessionRegistry};
//!
//! let registry = SessionRegistry::new();
//! let key = SessionKey::generate();
//! assert!(!registry.is_authenticated(&key));
//! assert!(registry.get(&key).is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use crate::client::ClientHandle;

/// Opaque identifier for one caller connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Fresh random key (`mcp:<uuid>`).
    pub fn generate() -> Self {
        Self(format!("mcp:{}", Uuid::new_v4()))
    }

    /// Key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session → client handle map shared by all connections.
#[derive(Default)]
pub struct SessionRegistry {
    handles: RwLock<HashMap<SessionKey, ClientHandle>>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `key`, if authenticated.
    pub fn get(&self, key: &SessionKey) -> Option<ClientHandle> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// `true` when `key` has a handle.
    pub fn is_authenticated(&self, key: &SessionKey) -> bool {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Bind `handle` to `key`, tearing down any handle it replaces.
    pub async fn put(&self, key: &SessionKey, handle: ClientHandle) {
        let previous = self
            .handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), handle);
        if let Some(old) = previous {
            tracing::debug!(session = %key, handle = %old.identity().handle, "replacing session handle");
            old.close().await;
        }
    }

    /// Bind `handle` to `key` only if `key` has none. Returns `true` on insert.
    ///
    /// On `false` the caller still owns `handle` and should close it.
    pub fn insert_if_absent(&self, key: &SessionKey, handle: ClientHandle) -> bool {
        let mut map = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(key) {
            return false;
        }
        map.insert(key.clone(), handle);
        true
    }

    /// Remove and tear down the handle for `key`. Returns `true` if one existed.
    pub async fn remove(&self, key: &SessionKey) -> bool {
        let removed = self
            .handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match removed {
            Some(handle) => {
                handle.close().await;
                true
            }
            None => false,
        }
    }

    /// Drop the handle for `key` only if it is still `handle`.
    ///
    /// Used after an upstream call reports the session dead; a newer handle
    /// installed meanwhile by `login` is left alone. No remote teardown is
    /// attempted since the service has already rejected the session.
    pub fn remove_if_same(&self, key: &SessionKey, handle: &ClientHandle) -> bool {
        let mut map = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        match map.get(key) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                map.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Number of authenticated sessions.
    pub fn len(&self) -> usize {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` when no session is authenticated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;

    fn handle(name: &str) -> (Arc<MockClient>, ClientHandle) {
        let client = Arc::new(MockClient::new(name));
        let handle: ClientHandle = client.clone();
        (client, handle)
    }

    #[test]
    fn generated_keys_are_unique() {
        let a = SessionKey::generate();
        let b = SessionKey::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("mcp:"));
    }

    #[tokio::test]
    async fn put_then_get() {
        let registry = SessionRegistry::new();
        let key = SessionKey::from("a");
        let (_, h) = handle("alice.test");
        registry.put(&key, h.clone()).await;
        assert!(registry.is_authenticated(&key));
        assert!(Arc::ptr_eq(&registry.get(&key).unwrap(), &h));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let registry = SessionRegistry::new();
        let (_, h) = handle("alice.test");
        registry.put(&SessionKey::from("a"), h).await;
        assert!(!registry.is_authenticated(&SessionKey::from("b")));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn put_closes_replaced_handle() {
        let registry = SessionRegistry::new();
        let key = SessionKey::from("a");
        let (first, h1) = handle("alice.test");
        let (second, h2) = handle("alice.test");
        registry.put(&key, h1).await;
        registry.put(&key, h2.clone()).await;
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert!(Arc::ptr_eq(&registry.get(&key).unwrap(), &h2));
    }

    #[tokio::test]
    async fn insert_if_absent_never_overwrites() {
        let registry = SessionRegistry::new();
        let key = SessionKey::from("a");
        let (_, h1) = handle("first");
        let (_, h2) = handle("second");
        assert!(registry.insert_if_absent(&key, h1.clone()));
        assert!(!registry.insert_if_absent(&key, h2));
        assert!(Arc::ptr_eq(&registry.get(&key).unwrap(), &h1));
    }

    #[tokio::test]
    async fn remove_reports_presence_and_closes() {
        let registry = SessionRegistry::new();
        let key = SessionKey::from("a");
        assert!(!registry.remove(&key).await);

        let (client, h) = handle("alice.test");
        registry.put(&key, h).await;
        assert!(registry.remove(&key).await);
        assert!(client.is_closed());
        assert!(!registry.is_authenticated(&key));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn remove_if_same_spares_newer_handle() {
        let registry = SessionRegistry::new();
        let key = SessionKey::from("a");
        let (_, stale) = handle("old");
        let (_, fresh) = handle("new");
        registry.put(&key, fresh.clone()).await;
        assert!(!registry.remove_if_same(&key, &stale));
        assert!(registry.is_authenticated(&key));
        assert!(registry.remove_if_same(&key, &fresh));
        assert!(!registry.is_authenticated(&key));
    }
}
