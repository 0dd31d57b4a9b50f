//! Durable key-value store trait.
//!
//! Every context sees the same store but no context may treat its own read as
//! ground truth: writes are atomic per key and only eventually visible to
//! readers in other contexts.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// A partial key/value mapping, as read from or written to a store.
pub type StoreItems = Map<String, Value>;

/// Asynchronous key-value persistence shared by all contexts.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the given keys. Absent keys are simply missing from the result.
    async fn get(&self, keys: &[&str]) -> Result<StoreItems>;

    /// Writes every entry of `items`. Each key is written atomically; there is
    /// no transaction across keys.
    async fn set(&self, items: StoreItems) -> Result<()>;

    /// Deletes the given keys. Removing an absent key is not an error.
    async fn remove(&self, keys: &[&str]) -> Result<()>;
}

/// Builds a single-entry [`StoreItems`].
pub fn single_item(key: &str, value: Value) -> StoreItems {
    let mut items = StoreItems::new();
    items.insert(key.to_string(), value);
    items
}
