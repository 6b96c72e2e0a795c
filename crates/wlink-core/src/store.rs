//! Storage abstraction for channel and client state.
//!
//! This module defines the `KeyValueStorage` trait, an in-memory
//! implementation for tests and ephemeral use, and `ScopedStorage`, which
//! namespaces every key by (wallet identity, component name) so that two
//! wallets' channels never collide in one backing store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ============================================================================
// Storage Trait
// ============================================================================

/// Flat string key/value storage.
///
/// Absence of a key is `Ok(None)`, never an error. Removing a missing key
/// succeeds.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete the value stored under `key`.
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: KeyValueStorage + ?Sized> KeyValueStorage for Arc<T> {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove_item(key).await
    }
}

// ============================================================================
// In-Memory Storage Implementation
// ============================================================================

/// Thread-safe in-memory storage.
///
/// Clones share the same underlying map, so a clone handed to a channel
/// manager can be inspected from a test.
#[derive(Default, Clone, Debug)]
pub struct InMemoryStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStorage for InMemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// Scoped Storage
// ============================================================================

/// A view of a backing store restricted to one (wallet, component) scope.
///
/// Keys are stored as `wlink:<wallet>:<component>:<key>`.
#[derive(Clone, Debug)]
pub struct ScopedStorage<S> {
    inner: S,
    prefix: String,
}

impl<S: KeyValueStorage> ScopedStorage<S> {
    /// Scope `inner` to the given wallet identity and component name.
    pub fn new(inner: S, wallet: &str, component: &str) -> Self {
        Self {
            inner,
            prefix: format!("wlink:{}:{}:", wallet, component),
        }
    }

    /// The full key used in the backing store for `key`.
    pub fn scoped_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Borrow the backing store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_item(&self.scoped_key(key)).await
    }

    pub async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_item(&self.scoped_key(key), value).await
    }

    pub async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove_item(&self.scoped_key(key)).await
    }

    /// Read and deserialize a JSON value.
    pub async fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.get_item(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value.
    pub async fn store_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e)))?;
        self.set_item(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryStorage::new();
        assert_eq!(store.get_item("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = InMemoryStorage::new();
        store.set_item("k", "v1").await.unwrap();
        store.set_item("k", "v2").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v2"));

        store.remove_item("k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);
        // Removing again is fine
        store.remove_item("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_scopes_do_not_collide() {
        let backing = InMemoryStorage::new();
        let a = ScopedStorage::new(backing.clone(), "wallet-a", "keys");
        let b = ScopedStorage::new(backing.clone(), "wallet-b", "keys");

        a.set_item("ownPublicKey", "aa").await.unwrap();
        b.set_item("ownPublicKey", "bb").await.unwrap();

        assert_eq!(a.get_item("ownPublicKey").await.unwrap().as_deref(), Some("aa"));
        assert_eq!(b.get_item("ownPublicKey").await.unwrap().as_deref(), Some("bb"));
        assert_eq!(
            backing.keys().await,
            vec![
                "wlink:wallet-a:keys:ownPublicKey".to_string(),
                "wlink:wallet-b:keys:ownPublicKey".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let scoped = ScopedStorage::new(InMemoryStorage::new(), "w", "client");
        scoped
            .store_json("accounts", &vec!["0xabc".to_string()])
            .await
            .unwrap();
        let loaded: Option<Vec<String>> = scoped.load_json("accounts").await.unwrap();
        assert_eq!(loaded, Some(vec!["0xabc".to_string()]));

        scoped.set_item("accounts", "{not json").await.unwrap();
        let bad: Result<Option<Vec<String>>, _> = scoped.load_json("accounts").await;
        assert!(matches!(bad, Err(StoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_shared_arc_storage() {
        let shared = InMemoryStorage::new_shared();
        let scoped = ScopedStorage::new(shared.clone(), "w", "c");
        scoped.set_item("x", "1").await.unwrap();
        assert_eq!(shared.len().await, 1);
    }
}
