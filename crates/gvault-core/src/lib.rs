pub mod config;
pub mod error;
pub mod types;

pub use config::GvaultConfig;
pub use error::{ErrorKind, VaultError, VaultResult};
pub use types::{
    file_name_of, format_size, guess_mime_type, now_millis, EntryKind, FileKind, MetadataRecord,
    ObjectSummary, RemoteObject, Session, ENCRYPTED_SUFFIX,
};
