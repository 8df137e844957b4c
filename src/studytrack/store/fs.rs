use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{compare_field, merge_documents, DocumentStore, OrderDirection};
use crate::error::Result;

/// File-backed document store.
///
/// Each document path maps to `<root>/<path>.json`; a collection maps to the
/// directory `<root>/<path>/`. A document and a collection may share a stem
/// (`userData/u.json` next to `userData/u/backups/`), matching the layout the
/// tracker uses.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn doc_file(&self, path: &str) -> PathBuf {
        self.root.join(format!("{}.json", path))
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    /// Write via a temp file in the same directory, then rename over the
    /// target, so readers never observe a partially written document.
    async fn write_atomic(&self, target: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = target.with_extension("json.tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, target).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let file = self.doc_file(path);
        match fs::read_to_string(&file).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, path: &str, value: Value, merge: bool) -> Result<()> {
        let next = if merge {
            match self.get(path).await? {
                Some(existing) => merge_documents(existing, value),
                None => value,
            }
        } else {
            value
        };
        let contents = serde_json::to_string_pretty(&next)?;
        self.write_atomic(&self.doc_file(path), &contents).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match fs::remove_file(self.doc_file(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ordered(
        &self,
        collection: &str,
        order_by: &str,
        direction: OrderDirection,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let dir = self.collection_dir(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path).await?;
            docs.push(serde_json::from_str::<Value>(&contents)?);
        }

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
