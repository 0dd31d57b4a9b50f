//! In-memory key-value store.

use std::sync::Arc;

use async_trait::async_trait;
use la_core::error::Result;
use la_core::store::{KeyValueStore, StoreItems};
use tokio::sync::RwLock;

/// A process-local [`KeyValueStore`].
///
/// Clones share state, so handing one clone to each context models a single
/// store seen by all of them.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: Arc<RwLock<StoreItems>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `items`.
    pub fn with_items(items: StoreItems) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    /// A copy of everything currently stored.
    pub async fn snapshot(&self) -> StoreItems {
        self.items.read().await.clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreItems> {
        let items = self.items.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| items.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: StoreItems) -> Result<()> {
        self.items.write().await.extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut items = self.items.write().await;
        for key in keys {
            items.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use la_core::store::single_item;
    use serde_json::json;

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set(single_item("k", json!("v"))).await.unwrap();

        let items = other.get(&["k", "absent"]).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items["k"], "v");

        other.remove(&["k", "absent"]).await.unwrap();
        assert!(store.snapshot().await.is_empty());
    }
}
