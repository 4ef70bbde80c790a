//! Capability store: keyed storage of registry entries.
//!
//! The store is the single source of truth for registered capabilities. It
//! does not enforce id uniqueness; the registry checks for conflicts before
//! calling [`CapabilityStore::put`] while holding its write gate.
//!
//! Category and provider lookups are linear scans over [`CapabilityStore::all`],
//! which is fine for an application's pluggable-feature registry (hundreds to
//! low thousands of entries). A persisted backend can override them with
//! indexed lookups without changing callers.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::entry::CapabilityRegistryEntry;
use crate::error::StoreError;

/// Storage backend for registry entries, keyed by capability id.
///
/// All methods are async so a backend may suspend on I/O. "Not found" is
/// reported as `None` / `false` / an empty list, never as an error.
#[async_trait]
pub trait CapabilityStore: Send + Sync + std::fmt::Debug {
    /// Insert or replace the entry under its capability id.
    async fn put(&self, entry: CapabilityRegistryEntry) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<CapabilityRegistryEntry>, StoreError>;

    /// Remove an entry. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn all(&self) -> Result<Vec<CapabilityRegistryEntry>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.all().await?.len())
    }

    async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.is_some())
    }

    async fn by_category(
        &self,
        category_id: &str,
    ) -> Result<Vec<CapabilityRegistryEntry>, StoreError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|e| e.capability.category_id() == Some(category_id))
            .collect())
    }

    async fn by_provider(&self, module_id: &str) -> Result<Vec<CapabilityRegistryEntry>, StoreError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|e| e.provider.module_id == module_id)
            .collect())
    }
}

/// Process-local store backed by a `HashMap`.
///
/// `all()` returns entries sorted by id so scans are deterministic.
#[derive(Debug, Default)]
pub struct InMemoryCapabilityStore {
    entries: RwLock<HashMap<String, CapabilityRegistryEntry>>,
}

impl InMemoryCapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CapabilityStore for InMemoryCapabilityStore {
    async fn put(&self, entry: CapabilityRegistryEntry) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(entry.capability.id.clone(), entry);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CapabilityRegistryEntry>, StoreError> {
        Ok(self.entries.read().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(id).is_some())
    }

    async fn all(&self) -> Result<Vec<CapabilityRegistryEntry>, StoreError> {
        let mut entries: Vec<_> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.capability.id.cmp(&b.capability.id));
        Ok(entries)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().len())
    }

    async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.entries.read().contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::capability::{Capability, Provider};
    use chrono::Utc;

    fn entry(id: &str, category: &str, module: &str) -> CapabilityRegistryEntry {
        CapabilityRegistryEntry::new(
            Capability::new(id, id, "1.0.0").with_category(category, category),
            Provider::new(module, "1.0.0"),
            vec![],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryCapabilityStore::new();
        store.put(entry("a", "docs", "docgen")).await.unwrap();

        assert!(store.contains("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap().unwrap().id(), "a");
        assert!(store.get("missing").await.unwrap().is_none());

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = InMemoryCapabilityStore::new();
        store.put(entry("a", "docs", "docgen")).await.unwrap();
        store.put(entry("a", "billing", "stripe")).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(
            store.get("a").await.unwrap().unwrap().provider.module_id,
            "stripe"
        );
    }

    #[tokio::test]
    async fn test_scans() {
        let store = InMemoryCapabilityStore::new();
        store.put(entry("c", "docs", "docgen")).await.unwrap();
        store.put(entry("a", "docs", "docgen")).await.unwrap();
        store.put(entry("b", "billing", "stripe")).await.unwrap();

        let ids: Vec<_> = store
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.capability.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        assert_eq!(store.by_category("docs").await.unwrap().len(), 2);
        assert_eq!(store.by_category("none").await.unwrap().len(), 0);
        assert_eq!(store.by_provider("stripe").await.unwrap().len(), 1);
    }
}
