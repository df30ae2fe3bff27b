//! What is stored, joined with what the index says about it

use gvault_core::{
    EntryKind, FileKind, MetadataRecord, ObjectSummary, VaultError, VaultResult, ENCRYPTED_SUFFIX,
};
use gvault_storage::ObjectStore;
use tracing::{info, warn};

use crate::index::MetadataIndex;

/// One stored object, with its index record when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Human-facing name: the indexed file name, or one derived from the path
    pub name: String,
    pub stored_path: String,
    /// Stored size (sealed size for encrypted objects)
    pub size: u64,
    pub revision: String,
    pub encrypted: bool,
    /// Milliseconds since the epoch, from the record or the path prefix
    pub uploaded_at: Option<u64>,
    pub record: Option<MetadataRecord>,
}

impl CatalogEntry {
    pub fn kind(&self) -> FileKind {
        FileKind::from_name(&self.name)
    }

    pub fn password_hint(&self) -> Option<&str> {
        self.record.as_ref().and_then(|r| r.password_hint.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub files: usize,
    pub total_bytes: u64,
    pub encrypted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Newest first
    pub entries: Vec<CatalogEntry>,
    /// Index records whose object no longer exists
    pub dangling: Vec<MetadataRecord>,
    /// Set when the index was missing or unreadable
    pub degraded: Option<String>,
}

/// `1700000000000_report.pdf.encrypted` → (`Some(1700000000000)`, `report.pdf`)
pub fn split_stored_name(object_name: &str) -> (Option<u64>, &str) {
    let name = object_name
        .strip_suffix(ENCRYPTED_SUFFIX)
        .unwrap_or(object_name);
    match name.split_once('_') {
        Some((prefix, rest))
            if !prefix.is_empty() && !rest.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            (prefix.parse().ok(), rest)
        }
        _ => (None, name),
    }
}

impl Catalog {
    /// List `files_dir` and join it with the index.
    ///
    /// A missing or corrupt index yields a degraded catalog built from the
    /// listing alone; any other index error is returned.
    pub async fn build(
        store: &dyn ObjectStore,
        index: &MetadataIndex,
        files_dir: &str,
    ) -> VaultResult<Self> {
        let listing = store.list(files_dir).await?;

        let records = match index.load().await {
            Ok(snapshot) if snapshot.revision.is_some() => Ok(snapshot.records),
            Ok(_) => Err("no metadata index".to_string()),
            Err(VaultError::Format(reason)) => {
                warn!(index = %index.path(), %reason, "metadata index unreadable, listing raw objects");
                Err(reason)
            }
            Err(e) => return Err(e),
        };

        let catalog = Self::from_parts(listing, records);
        info!(
            dir = files_dir,
            entries = catalog.entries.len(),
            dangling = catalog.dangling.len(),
            degraded = catalog.degraded.is_some(),
            "catalog built"
        );
        Ok(catalog)
    }

    /// Join a listing with index records, or with the reason they are unavailable.
    pub fn from_parts(
        listing: Vec<ObjectSummary>,
        records: Result<Vec<MetadataRecord>, String>,
    ) -> Self {
        let (mut records, degraded) = match records {
            Ok(r) => (r, None),
            Err(reason) => (Vec::new(), Some(reason)),
        };

        let mut entries = Vec::with_capacity(listing.len());
        for obj in listing.into_iter().filter(|o| o.kind == EntryKind::File) {
            let (prefix_ts, derived_name) = split_stored_name(&obj.name);
            let derived_name = derived_name.to_string();
            let record = records
                .iter()
                .position(|r| r.stored_path == obj.path)
                .map(|i| records.swap_remove(i));

            let entry = match record {
                Some(rec) => CatalogEntry {
                    name: rec.file_name.clone(),
                    stored_path: obj.path,
                    size: obj.size,
                    revision: obj.revision,
                    encrypted: rec.encrypted,
                    uploaded_at: Some(rec.upload_timestamp).filter(|t| *t > 0).or(prefix_ts),
                    record: Some(rec),
                },
                None => {
                    if degraded.is_none() {
                        warn!(path = %obj.path, "object has no index record");
                    }
                    CatalogEntry {
                        name: derived_name,
                        encrypted: obj.name.ends_with(ENCRYPTED_SUFFIX),
                        stored_path: obj.path,
                        size: obj.size,
                        revision: obj.revision,
                        uploaded_at: prefix_ts,
                        record: None,
                    }
                }
            };
            entries.push(entry);
        }

        for rec in &records {
            warn!(path = %rec.stored_path, name = %rec.file_name, "index record points at a missing object");
        }

        entries.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| a.stored_path.cmp(&b.stored_path))
        });

        Self {
            entries,
            dangling: records,
            degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Entries the index does not know about.
    pub fn orphans(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| e.record.is_none())
    }

    /// Look up by stored path, falling back to the display name.
    pub fn find(&self, query: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.stored_path == query)
            .or_else(|| self.entries.iter().find(|e| e.name == query))
    }

    pub fn stats(&self) -> StorageStats {
        self.entries.iter().fold(StorageStats::default(), |mut s, e| {
            s.files += 1;
            s.total_bytes += e.size;
            if e.encrypted {
                s.encrypted += 1;
            }
            s
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(path: &str, size: u64) -> ObjectSummary {
        ObjectSummary {
            name: gvault_core::file_name_of(path).to_string(),
            path: path.into(),
            size,
            revision: format!("rev-{path}"),
            kind: EntryKind::File,
        }
    }

    fn rec(path: &str, name: &str, encrypted: bool, ts: u64) -> MetadataRecord {
        MetadataRecord {
            file_name: name.into(),
            file_type: String::new(),
            file_size_bytes: 1,
            upload_timestamp: ts,
            stored_path: path.into(),
            encrypted,
            password_hint: encrypted.then(|| "pet's name".to_string()),
            uploaded_by: Some("owner".into()),
            sha: None,
        }
    }

    #[test]
    fn test_split_names() {
        assert_eq!(
            split_stored_name("1700000000000_report.pdf.encrypted"),
            (Some(1_700_000_000_000), "report.pdf")
        );
        assert_eq!(split_stored_name("my_notes.txt"), (None, "my_notes.txt"));
        assert_eq!(split_stored_name("12_"), (None, "12_"));
    }

    #[test]
    fn test_join_with_orphans_and_dangling() {
        let listing = vec![
            obj("files/100_a.txt", 10),
            obj("files/200_b.pdf.encrypted", 90),
            ObjectSummary {
                kind: EntryKind::Dir,
                ..obj("files/sub", 0)
            },
        ];
        let records = vec![
            rec("files/200_b.pdf.encrypted", "b.pdf", true, 200),
            rec("files/999_gone.txt", "gone.txt", false, 999),
        ];

        let catalog = Catalog::from_parts(listing, Ok(records));
        assert!(!catalog.is_degraded());
        assert_eq!(catalog.entries.len(), 2);
        assert_eq!(catalog.entries[0].name, "b.pdf");
        assert_eq!(catalog.entries[0].password_hint(), Some("pet's name"));
        assert_eq!(catalog.entries[1].name, "a.txt");
        assert_eq!(catalog.orphans().count(), 1);
        assert_eq!(catalog.dangling.len(), 1);
        assert_eq!(catalog.dangling[0].file_name, "gone.txt");

        assert_eq!(
            catalog.stats(),
            StorageStats {
                files: 2,
                total_bytes: 100,
                encrypted: 1
            }
        );
    }

    #[test]
    fn test_degraded_infers_encryption_from_suffix() {
        let listing = vec![obj("files/1_x.encrypted", 5), obj("files/2_y.txt", 3)];
        let catalog = Catalog::from_parts(listing, Err("corrupt".into()));
        assert!(catalog.is_degraded());
        let x = catalog.find("x").unwrap();
        assert!(x.encrypted);
        assert!(x.record.is_none());
        assert!(!catalog.find("files/2_y.txt").unwrap().encrypted);
        assert_eq!(catalog.stats().encrypted, 1);
    }
}
