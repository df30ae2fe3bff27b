//! In-process [`ObjectStore`] with the same revision and conflict semantics
//! as the content API. Used by tests and offline dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use gvault_core::{file_name_of, EntryKind, ObjectSummary, RemoteObject, VaultError, VaultResult};
use tracing::debug;

use crate::store::{check_size, normalize_path, ObjectStore, WriteCondition};

const DEFAULT_MAX_OBJECT_BYTES: u64 = gvault_core::config::MAX_OBJECT_BYTES;

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, Vec<u8>>,
    writes: u64,
}

#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    max_object_bytes: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Git-style blob id: equal content always yields an equal token, and any
/// change to the bytes changes it.
pub fn revision_of(content: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_object_bytes(DEFAULT_MAX_OBJECT_BYTES)
    }

    pub fn with_max_object_bytes(max_object_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_object_bytes,
        }
    }

    fn lock(&self) -> VaultResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| VaultError::Other(anyhow::anyhow!("memory store lock poisoned")))
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock()
            .map(|inner| inner.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of successful writes and deletes so far.
    pub fn write_count(&self) -> u64 {
        self.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_directory(objects: &BTreeMap<String, Vec<u8>>, path: &str) -> bool {
    let prefix = format!("{path}/");
    objects
        .range(prefix.clone()..)
        .next()
        .is_some_and(|(k, _)| k.starts_with(&prefix))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, path: &str) -> VaultResult<Option<RemoteObject>> {
        let path = normalize_path(path);
        let inner = self.lock()?;
        match inner.objects.get(path) {
            Some(content) => Ok(Some(RemoteObject::new(
                path,
                revision_of(content),
                content.clone(),
            ))),
            None if path.is_empty() || is_directory(&inner.objects, path) => {
                Err(VaultError::Format(format!("{path} is a directory")))
            }
            None => Ok(None),
        }
    }

    async fn revision(&self, path: &str) -> VaultResult<Option<String>> {
        let path = normalize_path(path);
        let inner = self.lock()?;
        Ok(inner.objects.get(path).map(|content| revision_of(content)))
    }

    async fn put(
        &self,
        path: &str,
        content: Vec<u8>,
        message: &str,
        condition: WriteCondition,
    ) -> VaultResult<RemoteObject> {
        let path = normalize_path(path);
        check_size(path, content.len() as u64, self.max_object_bytes)?;

        let mut inner = self.lock()?;
        if path.is_empty() || is_directory(&inner.objects, path) {
            return Err(VaultError::Format(format!("{path} is a directory")));
        }
        let current = inner.objects.get(path).map(|c| revision_of(c));

        match (&condition, current.as_deref()) {
            (WriteCondition::Overwrite, _) => {}
            (WriteCondition::CreateNew, None) => {}
            (WriteCondition::CreateNew, Some(_)) => {
                return Err(VaultError::conflict(path, "object already exists"));
            }
            (WriteCondition::Matches(_), None) => {
                return Err(VaultError::NotFound(path.to_string()));
            }
            (WriteCondition::Matches(expected), Some(actual)) if expected != actual => {
                return Err(VaultError::conflict(
                    path,
                    format!("expected revision {expected}, found {actual}"),
                ));
            }
            (WriteCondition::Matches(_), Some(_)) => {}
        }

        let revision = revision_of(&content);
        inner.objects.insert(path.to_string(), content.clone());
        inner.writes += 1;
        debug!(path, %revision, message, "memory put");
        Ok(RemoteObject::new(path, revision, content))
    }

    async fn delete(&self, path: &str, message: &str, expected_revision: &str) -> VaultResult<()> {
        let path = normalize_path(path);
        let mut inner = self.lock()?;
        let actual = match inner.objects.get(path) {
            Some(content) => revision_of(content),
            None => return Err(VaultError::NotFound(path.to_string())),
        };
        if actual != expected_revision {
            return Err(VaultError::conflict(
                path,
                format!("expected revision {expected_revision}, found {actual}"),
            ));
        }
        inner.objects.remove(path);
        inner.writes += 1;
        debug!(path, message, "memory delete");
        Ok(())
    }

    async fn list(&self, dir: &str) -> VaultResult<Vec<ObjectSummary>> {
        let dir = normalize_path(dir);
        let inner = self.lock()?;
        if !dir.is_empty() && inner.objects.contains_key(dir) {
            return Err(VaultError::Format(format!("{dir} is a file, not a directory")));
        }

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };

        let mut files = Vec::new();
        let mut dirs = BTreeSet::new();
        for (path, content) in inner.objects.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((child_dir, _)) => {
                    dirs.insert(child_dir.to_string());
                }
                None => files.push(ObjectSummary {
                    name: file_name_of(path).to_string(),
                    path: path.clone(),
                    size: content.len() as u64,
                    revision: revision_of(content),
                    kind: EntryKind::File,
                }),
            }
        }

        let mut out: Vec<ObjectSummary> = dirs
            .into_iter()
            .map(|name| ObjectSummary {
                path: format!("{prefix}{name}"),
                revision: revision_of(name.as_bytes()),
                name,
                size: 0,
                kind: EntryKind::Dir,
            })
            .collect();
        out.extend(files);
        Ok(out)
    }

    fn max_object_bytes(&self) -> u64 {
        self.max_object_bytes
    }
}
