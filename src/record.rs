use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Location of one archived capture inside a storage file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub original_url: String,
    pub storage_offset: u64,
    pub storage_length: u64,
    pub storage_file: String,
    /// Bypass the storage range and download `original_url` directly.
    pub force_redownload: bool,
}

impl IndexRecord {
    pub fn new(original_url: &str, storage_offset: u64, storage_length: u64, storage_file: &str) -> Self {
        Self {
            original_url: original_url.to_string(),
            storage_offset,
            storage_length,
            storage_file: storage_file.to_string(),
            force_redownload: false,
        }
    }

    pub fn with_redownload(mut self, force_redownload: bool) -> Self {
        self.force_redownload = force_redownload;
        self
    }

    /// URL + offset + length + storage file. Two records with the same key are the same capture.
    pub fn natural_key(&self) -> (&str, u64, u64, &str) {
        (&self.original_url, self.storage_offset, self.storage_length, &self.storage_file)
    }

    /// Inclusive byte range `(start, end)` covered by this record, or `None` for empty records.
    pub fn byte_range(&self) -> Option<(u64, u64)> {
        if self.storage_length == 0 {
            return None;
        }
        let end = self.storage_offset.checked_add(self.storage_length - 1)?;
        Some((self.storage_offset, end))
    }
}

impl PartialEq for IndexRecord {
    fn eq(&self, other: &Self) -> bool {
        self.natural_key() == other.natural_key()
    }
}

impl Eq for IndexRecord {}

impl Hash for IndexRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.natural_key().hash(state);
    }
}

pub type SampleSet = HashSet<IndexRecord>;

/// Decoded payloads keyed by original URL. Ordered so that training input is stable.
pub type PayloadMap = BTreeMap<String, Vec<u8>>;
