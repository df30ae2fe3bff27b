use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Lowest PBKDF2 iteration count accepted for new sealed blobs.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Hard ceiling for a single object: the host refuses larger contents writes.
pub const MAX_OBJECT_BYTES: u64 = 50 * 1024 * 1024;

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GvaultConfig {
    pub repo: RepoConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub transfer: TransferConfig,
    pub log: LogConfig,
}

/// Which repository/branch on the blob host holds the vault
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Repository owner (user or organisation)
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Branch every read and commit is scoped to
    pub branch: String,
    /// Content API base URL
    pub api_url: String,
    /// Refuse plaintext HTTP API endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding uploaded objects
    pub files_dir: String,
    /// Well-known path of the metadata index document
    pub index_path: String,
    /// Largest object accepted for a single request (default: 50 MiB)
    pub max_object_bytes: u64,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// User-Agent header sent to the host
    pub user_agent: String,
}

/// Client-side encryption parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA256 iteration count for newly sealed blobs
    pub pbkdf2_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Retries per network step for transient failures
    pub max_retries: u32,
    /// First backoff delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub retry_max_delay_ms: u64,
    /// Reload-and-reapply attempts for index writes that hit a conflict
    pub index_max_attempts: u32,
    /// Record unencrypted uploads in the metadata index too
    pub index_plaintext: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            name: String::new(),
            branch: "main".into(),
            api_url: "https://api.github.com".into(),
            enforce_tls: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            files_dir: "files".into(),
            index_path: "metadata.json".into(),
            max_object_bytes: MAX_OBJECT_BYTES,
            request_timeout_secs: 30,
            user_agent: concat!("gvault/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 4000,
            index_max_attempts: 5,
            index_plaintext: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl GvaultConfig {
    /// Parse a TOML document; missing sections and keys take defaults.
    pub fn from_toml(s: &str) -> VaultResult<Self> {
        let config: GvaultConfig =
            toml::from_str(s).map_err(|e| VaultError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.crypto.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(VaultError::Config(format!(
                "crypto.pbkdf2_iterations = {} is below the minimum of {MIN_PBKDF2_ITERATIONS}",
                self.crypto.pbkdf2_iterations
            )));
        }
        if self.transfer.index_max_attempts == 0 {
            return Err(VaultError::Config(
                "transfer.index_max_attempts must be at least 1".into(),
            ));
        }
        if self.storage.max_object_bytes == 0 || self.storage.max_object_bytes > MAX_OBJECT_BYTES {
            return Err(VaultError::Config(format!(
                "storage.max_object_bytes = {} must be between 1 and {MAX_OBJECT_BYTES}",
                self.storage.max_object_bytes
            )));
        }
        let files_dir = &self.storage.files_dir;
        if files_dir.starts_with('/') || files_dir.split('/').any(|seg| seg == "..") {
            return Err(VaultError::Config(format!(
                "storage.files_dir = {files_dir:?} must be a relative path inside the repository"
            )));
        }
        if self.storage.request_timeout_secs == 0 {
            return Err(VaultError::Config(
                "storage.request_timeout_secs must be positive".into(),
            ));
        }
        if self.storage.index_path.trim_matches('/').is_empty() {
            return Err(VaultError::Config("storage.index_path is empty".into()));
        }
        Ok(())
    }
}
