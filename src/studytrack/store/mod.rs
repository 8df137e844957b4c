//! # Storage Layer
//!
//! The tracker persists into an opaque document store: a tree of JSON
//! documents addressed by slash-separated paths, with ordered listing over a
//! collection of sibling documents. [`DocumentStore`] is the seam; the rest
//! of the crate never sees what is behind it.
//!
//! ## Document Layout
//!
//! ```text
//! userData/<user>                      # the live dataset
//!   { subjects: [...], dismissedRevisions: [...], lastUpdated: ... }
//! userData/<user>/backups/<backupId>   # one immutable document per snapshot
//! ```
//!
//! ## Implementations
//!
//! - [`fs::FileStore`]: documents as JSON files under a root directory.
//!   Writes are atomic (tmp file then rename).
//! - [`memory::InMemoryStore`]: for tests; supports write-error injection
//!   and artificial latency.
//!
//! ## Semantics
//!
//! - `set` with `merge = true` merges top-level object keys into an existing
//!   document instead of replacing it wholesale.
//! - `delete` of a missing document is a no-op.
//! - `list_ordered` returns direct children of a collection path only, sorted
//!   by a named field. Field values are compared as strings when both sides
//!   are strings, as numbers when both are numbers; documents missing the
//!   field sort last.
//!
//! All operations are async; callers must tolerate latency and transient
//! failure. Nothing here is cancellable once issued.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub mod fs;
pub mod memory;

/// Sort direction for [`DocumentStore::list_ordered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// Abstract interface to the document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, or `None` if it does not exist.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Write a document. With `merge`, top-level keys of `value` are laid
    /// over the existing document; otherwise the document is replaced.
    async fn set(&self, path: &str, value: Value, merge: bool) -> Result<()>;

    /// Remove a document. Removing a missing document succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    /// List up to `limit` direct children of `collection`, ordered by the
    /// value of `order_by` in each document.
    async fn list_ordered(
        &self,
        collection: &str,
        order_by: &str,
        direction: OrderDirection,
        limit: usize,
    ) -> Result<Vec<Value>>;
}

pub fn user_doc_path(user_id: &str) -> String {
    format!("userData/{}", user_id)
}

pub fn backups_collection_path(user_id: &str) -> String {
    format!("userData/{}/backups", user_id)
}

pub fn backup_doc_path(user_id: &str, backup_id: &str) -> String {
    format!("userData/{}/backups/{}", user_id, backup_id)
}

/// Field comparison used by both store implementations when ordering a
/// collection. Mixed or missing types compare as equal so the sort stays
/// stable rather than failing.
pub(crate) fn compare_field(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Shallow top-level merge of `incoming` into `existing`.
pub(crate) fn merge_documents(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        // A non-object on either side degenerates to replacement.
        (_, incoming) => incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths_follow_document_layout() {
        assert_eq!(user_doc_path("default-user"), "userData/default-user");
        assert_eq!(
            backup_doc_path("default-user", "backup_1700000000000"),
            "userData/default-user/backups/backup_1700000000000"
        );
    }

    #[test]
    fn merge_overlays_top_level_keys() {
        let existing = json!({"subjects": [1, 2], "dismissedRevisions": ["a"]});
        let incoming = json!({"subjects": [3]});
        let merged = merge_documents(existing, incoming);
        assert_eq!(merged["subjects"], json!([3]));
        assert_eq!(merged["dismissedRevisions"], json!(["a"]));
    }

    #[test]
    fn merge_with_non_object_replaces() {
        let merged = merge_documents(json!("old"), json!({"k": 1}));
        assert_eq!(merged, json!({"k": 1}));
    }

    #[test]
    fn compare_field_orders_strings_and_numbers() {
        use std::cmp::Ordering;

        let a = json!("2025-01-01T00:00:00.000Z");
        let b = json!("2025-01-02T00:00:00.000Z");
        assert_eq!(compare_field(Some(&a), Some(&b)), Ordering::Less);

        let x = json!(10);
        let y = json!(2);
        assert_eq!(compare_field(Some(&x), Some(&y)), Ordering::Greater);

        assert_eq!(compare_field(Some(&a), None), Ordering::Less);
    }
}
