//! gvault-storage: object store abstraction + blob host content API client

pub mod client;
pub mod contents;
pub mod health;
pub mod memory;
pub mod retry;
pub mod store;
pub mod tree;

pub use client::build_client;
pub use contents::{ClientSettings, ContentsClient, RepoInfo};
pub use health::{is_reachable, verify_repository};
pub use memory::{revision_of, MemoryStore};
pub use retry::{retry_transient, RetryPolicy};
pub use store::{check_size, normalize_path, ObjectStore, WriteCondition};
pub use tree::{walk, TreeNode};
