//! Recursive directory walk over an [`ObjectStore`]

use std::future::Future;
use std::pin::Pin;

use gvault_core::{EntryKind, VaultError, VaultResult};
use tracing::warn;

use crate::store::{normalize_path, ObjectStore};

/// Directories nested deeper than this are returned without children.
pub const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Empty for files
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Files at or below this node.
    pub fn file_count(&self) -> usize {
        match self.kind {
            EntryKind::File => 1,
            EntryKind::Dir => self.children.iter().map(TreeNode::file_count).sum(),
        }
    }

    /// Total size of files at or below this node.
    pub fn total_bytes(&self) -> u64 {
        match self.kind {
            EntryKind::File => self.size,
            EntryKind::Dir => self.children.iter().map(TreeNode::total_bytes).sum(),
        }
    }
}

type WalkFuture<'a> = Pin<Box<dyn Future<Output = VaultResult<Vec<TreeNode>>> + Send + 'a>>;

/// List `dir` and every directory below it.
///
/// A directory that does not exist (or vanishes mid-walk) contributes no
/// entries; every other error aborts the walk.
pub async fn walk(store: &dyn ObjectStore, dir: &str) -> VaultResult<Vec<TreeNode>> {
    walk_level(store, normalize_path(dir).to_string(), 0).await
}

fn walk_level(store: &dyn ObjectStore, dir: String, depth: usize) -> WalkFuture<'_> {
    Box::pin(async move {
        let entries = match store.list(&dir).await {
            Ok(entries) => entries,
            Err(VaultError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut nodes = Vec::with_capacity(entries.len());
        for entry in entries {
            let children = if entry.kind == EntryKind::Dir {
                if depth + 1 >= MAX_DEPTH {
                    warn!(path = %entry.path, depth, "tree depth limit reached; not descending");
                    Vec::new()
                } else {
                    walk_level(store, entry.path.clone(), depth + 1).await?
                }
            } else {
                Vec::new()
            };
            nodes.push(TreeNode {
                name: entry.name,
                path: entry.path,
                kind: entry.kind,
                size: entry.size,
                children,
            });
        }
        Ok(nodes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, WriteCondition};

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (p, body) in [
            ("files/1_a.txt", "aaa"),
            ("files/nested/deeper/2_b.bin", "bb"),
            ("files/nested/3_c.txt", "c"),
            ("metadata.json", "[]"),
        ] {
            store
                .put(p, body.as_bytes().to_vec(), "seed", WriteCondition::Overwrite)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_walk_builds_hierarchy() {
        let store = seeded().await;
        let tree = walk(&store, "files").await.unwrap();

        assert_eq!(tree.len(), 2);
        let nested = tree.iter().find(|n| n.name == "nested").unwrap();
        assert_eq!(nested.kind, EntryKind::Dir);
        assert_eq!(nested.file_count(), 2);
        assert_eq!(nested.total_bytes(), 3);
        let deeper = nested.children.iter().find(|n| n.name == "deeper").unwrap();
        assert_eq!(deeper.children[0].path, "files/nested/deeper/2_b.bin");
    }

    #[tokio::test]
    async fn test_walk_root_includes_everything() {
        let store = seeded().await;
        let tree = walk(&store, "/").await.unwrap();
        let total: usize = tree.iter().map(TreeNode::file_count).sum();
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn test_walk_missing_dir_is_empty() {
        let store = MemoryStore::new();
        assert!(walk(&store, "nowhere").await.unwrap().is_empty());
    }
}
