use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::SessionStore;
use crate::error::{SessionError, SessionResult};

type Slots = HashMap<String, Value>;

/// Process-scoped session store.
///
/// Sessions are created on first write and live until [`SessionStore::end_session`]
/// or process exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Slots>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently holding at least one slot.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, session_id: &str, key: &str) -> SessionResult<Value> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|slots| slots.get(key))
            .cloned()
            .ok_or_else(|| SessionError::MissingKey {
                key: key.to_string(),
            })
    }

    async fn set(&self, session_id: &str, key: &str, value: Value) -> SessionResult<()> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn has(&self, session_id: &str, key: &str) -> SessionResult<bool> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .is_some_and(|slots| slots.contains_key(key)))
    }

    async fn set_many(
        &self,
        session_id: &str,
        entries: Vec<(String, Value)>,
    ) -> SessionResult<()> {
        // One write guard for the whole batch: readers see all entries or none.
        let mut sessions = self.sessions.write().await;
        let slots = sessions.entry(session_id.to_string()).or_default();
        slots.extend(entries);
        Ok(())
    }

    async fn remove(&self, session_id: &str, key: &str) -> SessionResult<()> {
        if let Some(slots) = self.sessions.write().await.get_mut(session_id) {
            slots.remove(key);
        }
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> SessionResult<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_missing_key() {
        let store = MemoryStore::new();
        let err = tokio_test::block_on(store.get("s", "topics")).unwrap_err();
        assert!(matches!(err, SessionError::MissingKey { .. }));
    }

    #[test]
    fn test_set_then_get() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            store.set("s", "topics", json!("Sets")).await.unwrap();
            assert_eq!(store.get("s", "topics").await.unwrap(), json!("Sets"));
            assert!(store.has("s", "topics").await.unwrap());
            assert!(!store.has("other", "topics").await.unwrap());
        });
    }

    #[tokio::test]
    async fn test_set_many_and_remove() {
        let store = MemoryStore::new();
        store
            .set_many(
                "s",
                vec![
                    ("a".to_string(), json!(1)),
                    ("b".to_string(), json!(2)),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.get("s", "b").await.unwrap(), json!(2));

        store.remove("s", "a").await.unwrap();
        assert!(!store.has("s", "a").await.unwrap());
        store.remove("missing", "a").await.unwrap();
    }

    #[tokio::test]
    async fn test_end_session() {
        let store = MemoryStore::new();
        store.set("s1", "a", json!(true)).await.unwrap();
        store.set("s2", "a", json!(true)).await.unwrap();
        assert_eq!(store.session_count().await, 2);

        store.end_session("s1").await.unwrap();
        assert_eq!(store.session_count().await, 1);
        assert!(store.get("s1", "a").await.is_err());
    }
}
