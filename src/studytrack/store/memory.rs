use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{compare_field, merge_documents, DocumentStore, OrderDirection};
use crate::error::{Result, TrackerError};

/// In-memory document store for tests.
///
/// Documents live in a flat path-keyed map behind a `Mutex`. Two test knobs
/// mirror how the store is exercised: `fail_writes_containing` makes writes
/// to matching paths fail, and `with_latency` inserts an await point into
/// every operation so concurrent callers genuinely interleave.
#[derive(Default)]
pub struct InMemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    fail_writes: Mutex<Option<String>>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Fail subsequent `set` calls whose path contains `fragment`. An empty
    /// fragment fails every write.
    pub fn fail_writes_containing(&self, fragment: &str) {
        *self.fail_writes.lock().unwrap() = Some(fragment.to_string());
    }

    pub fn clear_write_failures(&self) {
        *self.fail_writes.lock().unwrap() = None;
    }

    fn should_fail(&self, path: &str) -> bool {
        self.fail_writes
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|fragment| path.contains(fragment))
    }

    /// Number of documents directly under a collection path.
    pub fn collection_len(&self, collection: &str) -> usize {
        let prefix = format!("{}/", collection);
        self.documents
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('/')))
            .count()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.simulate_latency().await;
        Ok(self.documents.lock().unwrap().get(path).cloned())
    }

    async fn set(&self, path: &str, value: Value, merge: bool) -> Result<()> {
        self.simulate_latency().await;
        if self.should_fail(path) {
            return Err(TrackerError::Store("simulated write error".to_string()));
        }

        let mut documents = self.documents.lock().unwrap();
        let next = match (merge, documents.remove(path)) {
            (true, Some(existing)) => merge_documents(existing, value),
            _ => value,
        };
        documents.insert(path.to_string(), next);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.simulate_latency().await;
        self.documents.lock().unwrap().remove(path);
        Ok(())
    }

    async fn list_ordered(
        &self,
        collection: &str,
        order_by: &str,
        direction: OrderDirection,
        limit: usize,
    ) -> Result<Vec<Value>> {
        self.simulate_latency().await;
        let prefix = format!("{}/", collection);
        let mut docs: Vec<Value> = self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('/'))
            })
            .map(|(_, doc)| doc.clone())
            .collect();

        docs.sort_by(|a, b| {
            let ordering = compare_field(a.get(order_by), b.get(order_by));
            match direction {
                OrderDirection::Ascending => ordering,
                OrderDirection::Descending => ordering.reverse(),
            }
        });
        docs.truncate(limit);
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_returns_none_for_missing_document() {
        let store = InMemoryStore::new();
        assert!(store.get("userData/nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_and_get_roundtrip() {
        let store = InMemoryStore::new();
        store
            .set("userData/u", json!({"subjects": []}), false)
            .await
            .unwrap();
        let doc = store.get("userData/u").await.unwrap().unwrap();
        assert_eq!(doc, json!({"subjects": []}));
    }

    #[tokio::test]
    async fn merge_preserves_untouched_keys() {
        let store = InMemoryStore::new();
        store
            .set("userData/u", json!({"a": 1, "b": 2}), false)
            .await
            .unwrap();
        store.set("userData/u", json!({"b": 3}), true).await.unwrap();
        let doc = store.get("userData/u").await.unwrap().unwrap();
        assert_eq!(doc, json!({"a": 1, "b": 3}));
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let store = InMemoryStore::new();
        store.delete("userData/ghost").await.unwrap();
    }

    #[tokio::test]
    async fn list_ordered_sorts_and_limits() {
        let store = InMemoryStore::new();
        for (id, ts) in [("a", "2025-01-03"), ("b", "2025-01-01"), ("c", "2025-01-02")] {
            store
                .set(
                    &format!("userData/u/backups/{}", id),
                    json!({"id": id, "timestamp": ts}),
                    false,
                )
                .await
                .unwrap();
        }
        // A nested document must not leak into the listing.
        store
            .set(
                "userData/u/backups/a/extra",
                json!({"timestamp": "2025-01-09"}),
                false,
            )
            .await
            .unwrap();

        let docs = store
            .list_ordered("userData/u/backups", "timestamp", OrderDirection::Descending, 2)
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["id"], "a");
        assert_eq!(docs[1]["id"], "c");
    }

    #[tokio::test]
    async fn write_error_injection() {
        let store = InMemoryStore::new();
        store.fail_writes_containing("");
        let err = store.set("userData/u", json!({}), false).await.unwrap_err();
        assert!(matches!(err, TrackerError::Store(_)));

        store.clear_write_failures();
        store.set("userData/u", json!({}), false).await.unwrap();
    }

    #[tokio::test]
    async fn write_errors_scoped_by_path_fragment() {
        let store = InMemoryStore::new();
        store.fail_writes_containing("/backups/");

        store.set("userData/u", json!({}), false).await.unwrap();
        let err = store
            .set("userData/u/backups/b", json!({}), false)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Store(_)));
    }
}
