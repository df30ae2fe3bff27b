//! Transfer orchestrator: sequential upload/download batches
//!
//! Per-file state machine:
//! ```text
//! upload:   Queued → [Encrypting] → Uploading → [Indexing] → Done
//! download: Queued → Downloading → [Decrypting] → Done
//! ```
//! Any step may end in `Failed(reason)`; the batch carries on with the next
//! file. Transient store errors are retried with backoff at each network
//! step before a file is given up on.

use std::sync::Arc;

use gvault_core::{
    file_name_of, guess_mime_type, now_millis, ErrorKind, GvaultConfig, MetadataRecord, Session,
    VaultError, VaultResult, ENCRYPTED_SUFFIX,
};
use gvault_crypto::{seal, unseal, KdfParams, PlainFile};
use gvault_storage::{check_size, normalize_path, retry_transient, ObjectStore, RetryPolicy, WriteCondition};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::catalog::split_stored_name;
use crate::index::MetadataIndex;

/// Progress callback, invoked on every state change
pub type ProgressFn = Box<dyn Fn(&Progress) + Send + Sync>;

const DELETE_COMMIT_MESSAGE: &str = "Delete file";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Queued,
    Encrypting,
    Uploading,
    Indexing,
    Downloading,
    Decrypting,
    Done,
    Failed(String),
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Done | TransferState::Failed(_))
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferState::Queued => f.write_str("queued"),
            TransferState::Encrypting => f.write_str("encrypting"),
            TransferState::Uploading => f.write_str("uploading"),
            TransferState::Indexing => f.write_str("indexing"),
            TransferState::Downloading => f.write_str("downloading"),
            TransferState::Decrypting => f.write_str("decrypting"),
            TransferState::Done => f.write_str("done"),
            TransferState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// One progress event.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Zero-based position in the batch
    pub index: usize,
    pub total: usize,
    pub name: String,
    pub state: TransferState,
    /// 0..=100, never decreases for a given file
    pub file_percent: f64,
    /// 0..=100 across the whole batch
    pub batch_percent: f64,
}

#[derive(Debug)]
pub struct UploadRequest {
    pub name: String,
    /// Guessed from the name when absent
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
    /// Seal before upload when set
    pub passphrase: Option<SecretString>,
    pub password_hint: Option<String>,
}

impl UploadRequest {
    pub fn plain(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            bytes,
            passphrase: None,
            password_hint: None,
        }
    }

    pub fn encrypted(name: impl Into<String>, bytes: Vec<u8>, passphrase: SecretString) -> Self {
        Self {
            passphrase: Some(passphrase),
            ..Self::plain(name, bytes)
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.password_hint = Some(hint.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub name: String,
    pub stored_path: String,
    pub revision: String,
    /// Bytes written to the store (sealed size when encrypted)
    pub stored_bytes: u64,
    pub encrypted: bool,
    pub indexed: bool,
}

#[derive(Debug)]
pub struct DownloadRequest {
    pub stored_path: String,
    /// Unseal after download when set
    pub passphrase: Option<SecretString>,
}

impl DownloadRequest {
    pub fn raw(stored_path: impl Into<String>) -> Self {
        Self {
            stored_path: stored_path.into(),
            passphrase: None,
        }
    }

    pub fn decrypt(stored_path: impl Into<String>, passphrase: SecretString) -> Self {
        Self {
            stored_path: stored_path.into(),
            passphrase: Some(passphrase),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub stored_path: String,
    /// Original name for decrypted files, otherwise derived from the path
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub decrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTransfer {
    pub file: String,
    pub reason: String,
    pub kind: ErrorKind,
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<FailedTransfer>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Directory new uploads are written under
    pub files_dir: String,
    /// Record unencrypted uploads in the index too
    pub index_plaintext: bool,
    /// Stored as `uploadedBy` in index records
    pub uploaded_by: Option<String>,
    pub kdf: KdfParams,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            files_dir: "files".into(),
            index_plaintext: true,
            uploaded_by: None,
            kdf: KdfParams::default(),
        }
    }
}

impl TransferOptions {
    pub fn from_config(config: &GvaultConfig, session: Option<&Session>) -> Self {
        Self {
            files_dir: config.storage.files_dir.clone(),
            index_plaintext: config.transfer.index_plaintext,
            uploaded_by: session.map(|s| s.user_type.clone()),
            kdf: KdfParams::new(config.crypto.pbkdf2_iterations),
        }
    }
}

// ── Progress bookkeeping ──────────────────────────────────────────────────────

struct Tracker<'a> {
    sink: Option<&'a ProgressFn>,
    total: usize,
    completed: usize,
    index: usize,
    name: String,
    file_percent: f64,
}

impl<'a> Tracker<'a> {
    fn new(sink: Option<&'a ProgressFn>, total: usize) -> Self {
        Self {
            sink,
            total,
            completed: 0,
            index: 0,
            name: String::new(),
            file_percent: 0.0,
        }
    }

    fn start(&mut self, index: usize, name: &str) {
        self.index = index;
        self.name = name.to_string();
        self.file_percent = 0.0;
        self.emit(TransferState::Queued);
    }

    fn step(&mut self, state: TransferState, percent: f64) {
        self.file_percent = self.file_percent.max(percent.clamp(0.0, 100.0));
        self.emit(state);
    }

    fn finish(&mut self, state: TransferState) {
        if state == TransferState::Done {
            self.file_percent = 100.0;
        }
        self.completed += 1;
        let batch = self.completed as f64 / self.total.max(1) as f64 * 100.0;
        self.send(state, batch);
    }

    fn emit(&self, state: TransferState) {
        let batch = (self.completed as f64 + self.file_percent / 100.0) / self.total.max(1) as f64
            * 100.0;
        self.send(state, batch);
    }

    fn send(&self, state: TransferState, batch_percent: f64) {
        if let Some(sink) = self.sink {
            sink(&Progress {
                index: self.index,
                total: self.total,
                name: self.name.clone(),
                state,
                file_percent: self.file_percent,
                batch_percent: batch_percent.min(100.0),
            });
        }
    }
}

// ── Naming ────────────────────────────────────────────────────────────────────

/// Make a user-supplied file name safe to use as a single path segment.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = file_name_of(name.trim_end_matches(['/', '\\']))
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `{files_dir}/{timestamp}_{name}[.encrypted]`
pub fn stored_path_for(files_dir: &str, name: &str, timestamp_ms: u64, encrypted: bool) -> String {
    let dir = normalize_path(files_dir);
    let suffix = if encrypted { ENCRYPTED_SUFFIX } else { "" };
    let object = format!("{timestamp_ms}_{}{suffix}", sanitize_name(name));
    if dir.is_empty() {
        object
    } else {
        format!("{dir}/{object}")
    }
}

fn raw_download_name(stored_path: &str) -> String {
    let object_name = file_name_of(stored_path);
    let (_, base) = split_stored_name(object_name);
    if object_name.ends_with(ENCRYPTED_SUFFIX) {
        format!("{base}{ENCRYPTED_SUFFIX}")
    } else {
        base.to_string()
    }
}

fn task_error(what: &str, e: tokio::task::JoinError) -> VaultError {
    VaultError::Other(anyhow::anyhow!("{what} task failed: {e}"))
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct TransferOrchestrator {
    store: Arc<dyn ObjectStore>,
    index: MetadataIndex,
    options: TransferOptions,
    retry: RetryPolicy,
}

impl TransferOrchestrator {
    pub fn new(store: Arc<dyn ObjectStore>, index: MetadataIndex, options: TransferOptions) -> Self {
        Self {
            store,
            index,
            options,
            retry: RetryPolicy::default(),
        }
    }

    /// Wire store, index, and options from config.
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &GvaultConfig, session: &Session) -> Self {
        let index = MetadataIndex::from_config(store.clone(), config);
        Self::new(store, index, TransferOptions::from_config(config, Some(session)))
            .with_retry(RetryPolicy::from_config(&config.transfer))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Upload every request in order. One file failing does not stop the rest.
    pub async fn upload_batch(
        &self,
        requests: Vec<UploadRequest>,
        progress: Option<&ProgressFn>,
    ) -> BatchReport<UploadOutcome> {
        let mut tracker = Tracker::new(progress, requests.len());
        let mut report = BatchReport::default();

        for (i, request) in requests.into_iter().enumerate() {
            let name = request.name.clone();
            tracker.start(i, &name);
            match self.upload_one(request, &mut tracker).await {
                Ok(outcome) => {
                    tracker.finish(TransferState::Done);
                    report.succeeded.push(outcome);
                }
                Err(e) => {
                    warn!(file = %name, kind = %e.kind(), "upload failed: {e}");
                    tracker.finish(TransferState::Failed(e.to_string()));
                    report.failed.push(FailedTransfer {
                        file: name,
                        reason: e.to_string(),
                        kind: e.kind(),
                    });
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "upload batch finished"
        );
        report
    }

    /// Download every request in order. One file failing does not stop the rest.
    pub async fn download_batch(
        &self,
        requests: Vec<DownloadRequest>,
        progress: Option<&ProgressFn>,
    ) -> BatchReport<DownloadedFile> {
        let mut tracker = Tracker::new(progress, requests.len());
        let mut report = BatchReport::default();

        for (i, request) in requests.into_iter().enumerate() {
            let path = request.stored_path.clone();
            tracker.start(i, file_name_of(&path));
            match self.download_one(request, &mut tracker).await {
                Ok(file) => {
                    tracker.finish(TransferState::Done);
                    report.succeeded.push(file);
                }
                Err(e) => {
                    warn!(path = %path, kind = %e.kind(), "download failed: {e}");
                    tracker.finish(TransferState::Failed(e.to_string()));
                    report.failed.push(FailedTransfer {
                        file: path,
                        reason: e.to_string(),
                        kind: e.kind(),
                    });
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "download batch finished"
        );
        report
    }

    /// Single upload without progress reporting.
    pub async fn upload(&self, request: UploadRequest) -> VaultResult<UploadOutcome> {
        let mut tracker = Tracker::new(None, 1);
        self.upload_one(request, &mut tracker).await
    }

    /// Single download without progress reporting.
    pub async fn download(&self, request: DownloadRequest) -> VaultResult<DownloadedFile> {
        let mut tracker = Tracker::new(None, 1);
        self.download_one(request, &mut tracker).await
    }

    async fn upload_one(
        &self,
        request: UploadRequest,
        tracker: &mut Tracker<'_>,
    ) -> VaultResult<UploadOutcome> {
        let UploadRequest {
            name,
            mime_type,
            bytes,
            passphrase,
            password_hint,
        } = request;

        let limit = self.store.max_object_bytes();
        let plain_size = bytes.len() as u64;
        check_size(&name, plain_size, limit)?;

        let mime_type = mime_type.unwrap_or_else(|| guess_mime_type(&name).to_string());
        let timestamp = now_millis();
        let encrypted = passphrase.is_some();
        let stored_path = stored_path_for(&self.options.files_dir, &name, timestamp, encrypted);

        let content = match passphrase {
            Some(passphrase) => {
                tracker.step(TransferState::Encrypting, 5.0);
                let plain = PlainFile::new(name.clone(), mime_type.clone(), bytes);
                let kdf = self.options.kdf.clone();
                let sealed = tokio::task::spawn_blocking(move || seal(&plain, &passphrase, &kdf))
                    .await
                    .map_err(|e| task_error("seal", e))??;
                debug!(file = %name, plain = plain_size, sealed = sealed.len(), "sealed");
                sealed
            }
            None => bytes,
        };
        let stored_bytes = content.len() as u64;

        tracker.step(TransferState::Uploading, if encrypted { 40.0 } else { 20.0 });
        let message = if encrypted {
            format!("Upload encrypted: {name}")
        } else {
            format!("Upload: {name}")
        };
        let written = self.put_fresh(&stored_path, content, &message).await?;
        info!(file = %name, path = %written.path, bytes = stored_bytes, encrypted, "uploaded");

        let indexed = encrypted || self.options.index_plaintext;
        if indexed {
            tracker.step(TransferState::Indexing, 90.0);
            let record = MetadataRecord {
                file_name: name.clone(),
                file_type: mime_type,
                file_size_bytes: plain_size,
                upload_timestamp: timestamp,
                stored_path: written.path.clone(),
                encrypted,
                password_hint,
                uploaded_by: self.options.uploaded_by.clone(),
                sha: Some(written.revision.clone()),
            };
            self.index.append(record).await.inspect_err(|e| {
                warn!(path = %written.path, "object stored but not indexed: {e}");
            })?;
        }

        Ok(UploadOutcome {
            name,
            stored_path: written.path,
            revision: written.revision,
            stored_bytes,
            encrypted,
            indexed,
        })
    }

    /// Create-only write of a fresh path. If a retried request finds the
    /// object already there with our exact bytes, the earlier attempt landed.
    async fn put_fresh(
        &self,
        path: &str,
        content: Vec<u8>,
        message: &str,
    ) -> VaultResult<gvault_core::RemoteObject> {
        let attempt = retry_transient(&self.retry, "upload", || {
            self.store
                .put(path, content.clone(), message, WriteCondition::CreateNew)
        })
        .await;

        match attempt {
            Err(VaultError::Conflict { path: p, detail }) => {
                let existing =
                    retry_transient(&self.retry, "verify upload", || self.store.get(path)).await?;
                match existing {
                    Some(obj) if obj.content == content => {
                        debug!(path, "earlier upload attempt already landed");
                        Ok(obj)
                    }
                    _ => Err(VaultError::Conflict { path: p, detail }),
                }
            }
            other => other,
        }
    }

    async fn download_one(
        &self,
        request: DownloadRequest,
        tracker: &mut Tracker<'_>,
    ) -> VaultResult<DownloadedFile> {
        let DownloadRequest {
            stored_path,
            passphrase,
        } = request;

        tracker.step(TransferState::Downloading, 10.0);
        let object = retry_transient(&self.retry, "download", || self.store.get(&stored_path))
            .await?
            .ok_or_else(|| VaultError::NotFound(stored_path.clone()))?;
        debug!(path = %object.path, bytes = object.size, "downloaded");

        match passphrase {
            Some(passphrase) => {
                tracker.step(TransferState::Decrypting, 60.0);
                let content = object.content;
                let plain = tokio::task::spawn_blocking(move || unseal(&content, &passphrase))
                    .await
                    .map_err(|e| task_error("unseal", e))??;
                info!(path = %object.path, name = %plain.name, bytes = plain.size(), "decrypted");
                Ok(DownloadedFile {
                    stored_path: object.path,
                    name: plain.name,
                    mime_type: plain.mime_type,
                    bytes: plain.bytes,
                    decrypted: true,
                })
            }
            None => {
                let name = raw_download_name(&object.path);
                let mime_type = if name.ends_with(ENCRYPTED_SUFFIX) {
                    "application/octet-stream".to_string()
                } else {
                    guess_mime_type(&name).to_string()
                };
                Ok(DownloadedFile {
                    stored_path: object.path,
                    name,
                    mime_type,
                    bytes: object.content,
                    decrypted: false,
                })
            }
        }
    }

    /// Delete an object under its current revision, then drop its index record.
    ///
    /// If the object is already gone but the index still points at it, the
    /// record is removed and the call succeeds. A delete whose response was
    /// lost and whose retry finds nothing left counts as done.
    pub async fn delete(&self, stored_path: &str) -> VaultResult<()> {
        let stored_path = normalize_path(stored_path);
        let current =
            retry_transient(&self.retry, "delete lookup", || self.store.revision(stored_path))
                .await?;

        let Some(revision) = current else {
            let before = self.index.load().await?;
            if !before.contains(stored_path) {
                return Err(VaultError::NotFound(stored_path.to_string()));
            }
            self.index.remove_by_path(stored_path).await?;
            info!(path = stored_path, "removed dangling index record");
            return Ok(());
        };

        let mut attempts = 0u32;
        let deleted = retry_transient(&self.retry, "delete", || {
            attempts += 1;
            self.store
                .delete(stored_path, DELETE_COMMIT_MESSAGE, &revision)
        })
        .await;

        match deleted {
            Ok(()) => info!(path = stored_path, "object deleted"),
            Err(VaultError::NotFound(_)) if attempts > 1 => {
                debug!(path = stored_path, "earlier delete attempt already landed");
            }
            Err(e) => return Err(e),
        }
        self.index.remove_by_path(stored_path).await?;
        Ok(())
    }
}
