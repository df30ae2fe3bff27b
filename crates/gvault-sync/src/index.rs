//! Metadata index: the JSON document mapping file names to stored paths.
//!
//! The index lives at a single well-known path and is shared by every client
//! of the repository. All writes go through a read-modify-write loop guarded
//! by the object's revision token:
//!
//! 1. load the current document and its revision
//! 2. apply the change (skipped if it is already present)
//! 3. put with `Matches(revision)`, or `CreateNew` if there was no document
//! 4. on conflict, go back to 1, at most `max_attempts` times
//!
//! Step 2 is keyed by stored path, so a write that landed remotely but whose
//! response was lost is recognised on the next pass instead of duplicated.

use std::sync::Arc;

use gvault_core::{GvaultConfig, MetadataRecord, VaultError, VaultResult};
use gvault_storage::{retry_transient, ObjectStore, RetryPolicy, WriteCondition};
use tracing::{debug, info, warn};

const INDEX_COMMIT_MESSAGE: &str = "Update metadata";
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// The index as loaded, plus the revision it was loaded at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub records: Vec<MetadataRecord>,
    /// `None` when no index exists yet
    pub revision: Option<String>,
}

impl IndexSnapshot {
    pub fn find(&self, stored_path: &str) -> Option<&MetadataRecord> {
        self.records.iter().find(|r| r.stored_path == stored_path)
    }

    pub fn contains(&self, stored_path: &str) -> bool {
        self.find(stored_path).is_some()
    }
}

pub struct MetadataIndex {
    store: Arc<dyn ObjectStore>,
    path: String,
    max_attempts: u32,
    retry: RetryPolicy,
}

impl std::fmt::Debug for MetadataIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataIndex")
            .field("path", &self.path)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

fn parse_index(path: &str, bytes: &[u8]) -> VaultResult<Vec<MetadataRecord>> {
    // A zero-byte document is what a fresh repository sometimes holds
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes)
        .map_err(|e| VaultError::Format(format!("{path}: corrupt metadata index: {e}")))
}

fn encode_index(records: &[MetadataRecord]) -> VaultResult<Vec<u8>> {
    serde_json::to_vec_pretty(records)
        .map_err(|e| VaultError::Other(anyhow::anyhow!("serializing metadata index: {e}")))
}

impl MetadataIndex {
    pub fn new(store: Arc<dyn ObjectStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &GvaultConfig) -> Self {
        Self::new(store, config.storage.index_path.clone())
            .with_max_attempts(config.transfer.index_max_attempts)
            .with_retry(RetryPolicy::from_config(&config.transfer))
    }

    /// Upper bound on reload-and-reapply rounds (at least 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current document and revision. A missing index is an empty snapshot.
    pub async fn load(&self) -> VaultResult<IndexSnapshot> {
        let object = retry_transient(&self.retry, "load index", || self.store.get(&self.path)).await?;
        match object {
            None => {
                debug!(path = %self.path, "no metadata index yet");
                Ok(IndexSnapshot::default())
            }
            Some(obj) => {
                let records = parse_index(&self.path, &obj.content)?;
                debug!(path = %self.path, records = records.len(), revision = %obj.revision, "index loaded");
                Ok(IndexSnapshot {
                    records,
                    revision: Some(obj.revision),
                })
            }
        }
    }

    /// Just the records.
    pub async fn records(&self) -> VaultResult<Vec<MetadataRecord>> {
        Ok(self.load().await?.records)
    }

    /// Add `record` unless a record with the same stored path is already there.
    pub async fn append(&self, record: MetadataRecord) -> VaultResult<Vec<MetadataRecord>> {
        let stored_path = record.stored_path.clone();
        self.update(&stored_path, move |records| {
            if records.iter().any(|r| r.stored_path == record.stored_path) {
                false
            } else {
                records.push(record.clone());
                true
            }
        })
        .await
    }

    /// Drop every record pointing at `stored_path`. Absent paths are a no-op.
    pub async fn remove_by_path(&self, stored_path: &str) -> VaultResult<Vec<MetadataRecord>> {
        self.update(stored_path, |records| {
            let before = records.len();
            records.retain(|r| r.stored_path != stored_path);
            records.len() != before
        })
        .await
    }

    /// Bounded read-modify-write. `apply` returns false when there is nothing
    /// to write.
    async fn update<F>(&self, key: &str, mut apply: F) -> VaultResult<Vec<MetadataRecord>>
    where
        F: FnMut(&mut Vec<MetadataRecord>) -> bool,
    {
        for attempt in 1..=self.max_attempts {
            let snapshot = self.load().await?;
            let mut records = snapshot.records;
            if !apply(&mut records) {
                debug!(path = %self.path, key, "index already up to date");
                return Ok(records);
            }

            let body = encode_index(&records)?;
            let condition = match &snapshot.revision {
                Some(rev) => WriteCondition::Matches(rev.clone()),
                None => WriteCondition::CreateNew,
            };

            let written = retry_transient(&self.retry, "write index", || {
                self.store
                    .put(&self.path, body.clone(), INDEX_COMMIT_MESSAGE, condition.clone())
            })
            .await;

            match written {
                Ok(obj) => {
                    info!(
                        path = %self.path,
                        key,
                        records = records.len(),
                        revision = %obj.revision,
                        attempt,
                        "index updated"
                    );
                    return Ok(records);
                }
                Err(VaultError::Conflict { detail, .. }) => {
                    warn!(path = %self.path, key, attempt, %detail, "index changed underneath us, reloading");
                }
                // The index was deleted between our read and our write
                Err(VaultError::NotFound(_)) if snapshot.revision.is_some() => {
                    warn!(path = %self.path, key, attempt, "index vanished, reloading");
                }
                Err(e) => return Err(e),
            }
        }

        Err(VaultError::conflict(
            &self.path,
            format!(
                "gave up updating for {key} after {} attempts",
                self.max_attempts
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvault_storage::MemoryStore;

    fn record(path: &str) -> MetadataRecord {
        MetadataRecord {
            file_name: gvault_core::file_name_of(path).to_string(),
            file_type: "text/plain".into(),
            file_size_bytes: 5,
            upload_timestamp: 1_700_000_000_000,
            stored_path: path.into(),
            encrypted: false,
            password_hint: None,
            uploaded_by: None,
            sha: None,
        }
    }

    fn index(store: Arc<MemoryStore>) -> MetadataIndex {
        MetadataIndex::new(store, "metadata.json").with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_missing_index_loads_empty() {
        let idx = index(Arc::new(MemoryStore::new()));
        let snap = idx.load().await.unwrap();
        assert!(snap.records.is_empty());
        assert!(snap.revision.is_none());
    }

    #[tokio::test]
    async fn test_first_append_creates_document() {
        let store = Arc::new(MemoryStore::new());
        let idx = index(store.clone());
        let records = idx.append(record("files/1_a.txt")).await.unwrap();
        assert_eq!(records.len(), 1);

        let raw = store.get("metadata.json").await.unwrap().unwrap();
        let text = String::from_utf8(raw.content).unwrap();
        assert!(text.contains("\"path\": \"files/1_a.txt\""));
        assert!(text.contains("\"fileName\""));
    }

    #[tokio::test]
    async fn test_append_is_idempotent_by_path() {
        let store = Arc::new(MemoryStore::new());
        let idx = index(store.clone());
        idx.append(record("files/1_a.txt")).await.unwrap();
        let writes = store.write_count();
        let records = idx.append(record("files/1_a.txt")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(store.write_count(), writes, "no-op append must not write");
    }

    #[tokio::test]
    async fn test_remove_by_path() {
        let idx = index(Arc::new(MemoryStore::new()));
        idx.append(record("files/1_a.txt")).await.unwrap();
        idx.append(record("files/2_b.txt")).await.unwrap();
        let records = idx.remove_by_path("files/1_a.txt").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stored_path, "files/2_b.txt");
        assert_eq!(idx.remove_by_path("files/zzz").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_index_is_format_error_and_not_overwritten() {
        let store = Arc::new(MemoryStore::new());
        store
            .put("metadata.json", b"{not json".to_vec(), "m", WriteCondition::Overwrite)
            .await
            .unwrap();
        let idx = index(store.clone());

        assert!(matches!(idx.load().await, Err(VaultError::Format(_))));
        assert!(matches!(
            idx.append(record("files/1_a.txt")).await,
            Err(VaultError::Format(_))
        ));
        let raw = store.get("metadata.json").await.unwrap().unwrap();
        assert_eq!(raw.content, b"{not json");
    }

    #[tokio::test]
    async fn test_unknown_keys_and_blank_document_tolerated() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                "metadata.json",
                br#"[{"fileName":"a.txt","fileType":"text/plain","fileSize":3,"timestamp":1,"path":"files/1_a.txt","encrypted":false,"color":"blue"}]"#.to_vec(),
                "m",
                WriteCondition::Overwrite,
            )
            .await
            .unwrap();
        let records = index(store.clone()).records().await.unwrap();
        assert_eq!(records[0].file_size_bytes, 3);

        store
            .put("metadata.json", b"\n".to_vec(), "m", WriteCondition::Overwrite)
            .await
            .unwrap();
        assert!(index(store).records().await.unwrap().is_empty());
    }
}
