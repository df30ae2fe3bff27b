use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Authentication tag mismatch: wrong passphrase or corrupted ciphertext.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Malformed sealed-blob framing or index document.
    #[error("format error: {0}")]
    Format(String),

    /// The revision token supplied with a write or delete is stale.
    #[error("revision conflict on {path}: {detail}")]
    Conflict { path: String, detail: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// Bad or expired credential. Fatal for the current session.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Network failure, timeout, or 5xx from the host. The only retryable kind.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("object too large: {path} is {size} bytes (limit {limit} bytes)")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("config error: {0}")]
    Config(String),

    /// Any other non-success response from the host.
    #[error("remote error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Copyable discriminant of [`VaultError`], for matching and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Integrity,
    Format,
    Conflict,
    NotFound,
    Authorization,
    Transient,
    TooLarge,
    Config,
    Remote,
    Io,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Integrity => "integrity",
            ErrorKind::Format => "format",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Transient => "transient",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::Config => "config",
            ErrorKind::Remote => "remote",
            ErrorKind::Io => "io",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Integrity(_) => ErrorKind::Integrity,
            VaultError::Format(_) => ErrorKind::Format,
            VaultError::Conflict { .. } => ErrorKind::Conflict,
            VaultError::NotFound(_) => ErrorKind::NotFound,
            VaultError::Authorization(_) => ErrorKind::Authorization,
            VaultError::Transient(_) => ErrorKind::Transient,
            VaultError::TooLarge { .. } => ErrorKind::TooLarge,
            VaultError::Config(_) => ErrorKind::Config,
            VaultError::Remote { .. } => ErrorKind::Remote,
            VaultError::Io(_) => ErrorKind::Io,
            VaultError::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether a caller may retry the failed operation with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, VaultError::Transient(_))
    }

    pub fn conflict(path: impl Into<String>, detail: impl Into<String>) -> Self {
        VaultError::Conflict {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
