//! gvault-sync: metadata index, catalog, and transfer orchestrator

pub mod catalog;
pub mod index;
pub mod transfer;

pub use catalog::{Catalog, CatalogEntry, StorageStats};
pub use index::{IndexSnapshot, MetadataIndex};
pub use transfer::{
    BatchReport, DownloadRequest, DownloadedFile, FailedTransfer, Progress, ProgressFn,
    TransferOptions, TransferOrchestrator, TransferState, UploadOutcome, UploadRequest,
};
