//! The object store seam: everything above this trait is host-agnostic.

use async_trait::async_trait;
use gvault_core::{ObjectSummary, RemoteObject, VaultError, VaultResult};

/// Precondition attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Blind overwrite: replace whatever is there (or create).
    ///
    /// Only safe for paths no other writer can know about yet.
    Overwrite,
    /// Create only; an existing object is a conflict.
    CreateNew,
    /// Optimistic lock: the object must currently carry this revision.
    Matches(String),
}

impl WriteCondition {
    /// `None` → blind overwrite, `Some(token)` → optimistic lock.
    pub fn from_expected(expected: Option<&str>) -> Self {
        match expected {
            Some(token) => WriteCondition::Matches(token.to_string()),
            None => WriteCondition::Overwrite,
        }
    }
}

/// Key-value-with-versioning view of the blob host, scoped to one branch.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object and its revision. `Ok(None)` when it does not exist.
    async fn get(&self, path: &str) -> VaultResult<Option<RemoteObject>>;

    /// Current revision of `path` without transferring its content.
    async fn revision(&self, path: &str) -> VaultResult<Option<String>> {
        Ok(self.get(path).await?.map(|obj| obj.revision))
    }

    /// Create or overwrite `path`, committing with `message`.
    ///
    /// A stale [`WriteCondition::Matches`] token fails with
    /// [`VaultError::Conflict`]; content above the size ceiling fails with
    /// [`VaultError::TooLarge`] before anything is sent.
    async fn put(
        &self,
        path: &str,
        content: Vec<u8>,
        message: &str,
        condition: WriteCondition,
    ) -> VaultResult<RemoteObject>;

    /// Delete `path`, which must currently carry `expected_revision`.
    async fn delete(&self, path: &str, message: &str, expected_revision: &str) -> VaultResult<()>;

    /// Immediate children of `dir`. A missing directory lists as empty.
    async fn list(&self, dir: &str) -> VaultResult<Vec<ObjectSummary>>;

    /// Largest object `put` accepts.
    fn max_object_bytes(&self) -> u64;
}

/// Reject content above `limit` without touching the network.
pub fn check_size(path: &str, size: u64, limit: u64) -> VaultResult<()> {
    if size > limit {
        return Err(VaultError::TooLarge {
            path: path.to_string(),
            size,
            limit,
        });
    }
    Ok(())
}

/// Strip leading/trailing slashes so `"/files/"` and `"files"` address the same directory.
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_token_maps_to_condition() {
        assert_eq!(WriteCondition::from_expected(None), WriteCondition::Overwrite);
        assert_eq!(
            WriteCondition::from_expected(Some("abc")),
            WriteCondition::Matches("abc".into())
        );
    }

    #[test]
    fn test_size_ceiling() {
        assert!(check_size("a", 10, 10).is_ok());
        let err = check_size("a", 11, 10).unwrap_err();
        assert!(matches!(err, VaultError::TooLarge { size: 11, limit: 10, .. }));
    }

    #[test]
    fn test_paths_are_normalized() {
        assert_eq!(normalize_path("/files/"), "files");
        assert_eq!(normalize_path("files/a.txt"), "files/a.txt");
        assert_eq!(normalize_path("/"), "");
    }
}
