//! Typed access to the persisted session slot.

use std::sync::Arc;

use serde_json::Value;

use super::model::Session;
use crate::error::Result;
use crate::store::{KeyValueStore, single_item};

/// Store key holding the persisted [`Session`].
pub const SESSION_KEY: &str = "la_session";

/// What a read of the session slot found.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredSession {
    /// Nothing persisted (or an explicit `null`).
    Empty,
    /// A record that deserializes as a session. It may still be invalid.
    Present(Session),
    /// Something is stored but it is not session-shaped at all.
    Malformed(Value),
}

impl StoredSession {
    /// The session, only if it satisfies the validity predicate.
    pub fn into_valid(self) -> Option<Session> {
        match self {
            Self::Present(session) if session.is_valid() => Some(session),
            _ => None,
        }
    }

    /// Whether the slot holds anything that fails the validity predicate.
    pub fn needs_sweep(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Present(session) => !session.is_valid(),
            Self::Malformed(_) => true,
        }
    }
}

/// Session-slot helper over any [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The underlying store, for configuration keys.
    pub fn inner(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub async fn load(&self) -> Result<StoredSession> {
        let mut items = self.store.get(&[SESSION_KEY]).await?;
        let stored = match items.remove(SESSION_KEY) {
            None | Some(Value::Null) => StoredSession::Empty,
            Some(value) => match serde_json::from_value::<Session>(value.clone()) {
                Ok(session) => StoredSession::Present(session),
                Err(err) => {
                    tracing::debug!("[SessionStore] Stored session is malformed: {}", err);
                    StoredSession::Malformed(value)
                }
            },
        };
        Ok(stored)
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        let value = serde_json::to_value(session)?;
        self.store.set(single_item(SESSION_KEY, value)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(&[SESSION_KEY]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StatusInfo;
    use crate::session::SessionUser;
    use crate::store::StoreItems;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        items: Mutex<StoreItems>,
    }

    #[async_trait]
    impl KeyValueStore for MapStore {
        async fn get(&self, keys: &[&str]) -> Result<StoreItems> {
            let items = self.items.lock().unwrap();
            Ok(keys
                .iter()
                .filter_map(|k| items.get(*k).map(|v| (k.to_string(), v.clone())))
                .collect())
        }

        async fn set(&self, items: StoreItems) -> Result<()> {
            self.items.lock().unwrap().extend(items);
            Ok(())
        }

        async fn remove(&self, keys: &[&str]) -> Result<()> {
            let mut items = self.items.lock().unwrap();
            for key in keys {
                items.remove(*key);
            }
            Ok(())
        }
    }

    fn store() -> (Arc<MapStore>, SessionStore) {
        let raw = Arc::new(MapStore::default());
        (raw.clone(), SessionStore::new(raw))
    }

    #[tokio::test]
    async fn test_empty_slot() {
        let (_, sessions) = store();
        let stored = sessions.load().await.unwrap();
        assert_eq!(stored, StoredSession::Empty);
        assert!(!stored.needs_sweep());
        assert!(stored.into_valid().is_none());
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let (_, sessions) = store();
        let mut session = Session::unvalidated(SessionUser::default(), "tok");
        sessions.save(&session).await.unwrap();

        let stored = sessions.load().await.unwrap();
        assert!(stored.needs_sweep());
        assert!(stored.into_valid().is_none());

        session.apply_status(&StatusInfo::default());
        sessions.save(&session).await.unwrap();
        let stored = sessions.load().await.unwrap();
        assert!(!stored.needs_sweep());
        assert_eq!(stored.into_valid(), Some(session));

        sessions.clear().await.unwrap();
        assert_eq!(sessions.load().await.unwrap(), StoredSession::Empty);
    }

    #[tokio::test]
    async fn test_malformed_slot_needs_sweep() {
        let (raw, sessions) = store();
        raw.set(single_item(SESSION_KEY, json!("not a session")))
            .await
            .unwrap();
        let stored = sessions.load().await.unwrap();
        assert!(matches!(stored, StoredSession::Malformed(_)));
        assert!(stored.needs_sweep());
    }
}
