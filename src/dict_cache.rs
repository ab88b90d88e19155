//! Per-storage-file cache of externally stored zstd dictionaries.
//!
//! A dictionary-compressed storage file may start with a skippable frame holding the
//! dictionary its records were compressed with. Each filename is resolved at most once;
//! concurrent callers for the same file wait on the in-flight resolution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{Result, TrainerError};
use crate::frame::{decode_dictionary_payload, parse_frame_header, FRAME_HEADER_LEN};
use crate::storage::ArchiveStorage;

/// `None` means the file carries no embedded dictionary.
pub type ExternalDictionary = Option<Arc<Vec<u8>>>;

type Slot = Arc<Mutex<Option<ExternalDictionary>>>;

pub struct DictionaryCache {
    storage: Arc<dyn ArchiveStorage>,
    slots: DashMap<String, Slot>,
    fetches: AtomicUsize,
}

impl DictionaryCache {
    pub fn new(storage: Arc<dyn ArchiveStorage>) -> Self {
        Self { storage, slots: DashMap::new(), fetches: AtomicUsize::new(0) }
    }

    /// Returns the dictionary embedded in `storage_file`, fetching it on first use.
    ///
    /// Failures are not cached; the next caller retries the fetch.
    pub fn get(&self, storage_file: &str) -> Result<ExternalDictionary> {
        // Clone the slot out so the map shard lock is released before blocking on the slot.
        let slot: Slot = self
            .slots
            .entry(storage_file.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut guard = slot
            .lock()
            .map_err(|_| TrainerError::Worker(format!("dictionary slot for {} poisoned", storage_file)))?;
        if let Some(cached) = guard.as_ref() {
            return Ok(cached.clone());
        }

        let resolved = self.fetch(storage_file)?.map(Arc::new);
        *guard = Some(resolved.clone());
        Ok(resolved)
    }

    fn fetch(&self, storage_file: &str) -> Result<Option<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let header = self.storage.read_range(storage_file, 0, FRAME_HEADER_LEN as u64 - 1)?;
        let frame_len = match parse_frame_header(&header)? {
            Some(len) => len as u64,
            None => {
                debug!("{} has no embedded dictionary", storage_file);
                return Ok(None);
            }
        };
        if frame_len == 0 {
            return Err(TrainerError::format(format!("{}: empty dictionary frame", storage_file)));
        }

        let start = FRAME_HEADER_LEN as u64;
        let payload = self.storage.read_range(storage_file, start, start + frame_len - 1)?;
        if payload.len() as u64 != frame_len {
            return Err(TrainerError::format(format!(
                "{}: dictionary frame truncated ({} of {} bytes)",
                storage_file,
                payload.len(),
                frame_len
            )));
        }

        let dictionary = decode_dictionary_payload(&payload).map_err(|e| match e {
            TrainerError::Format(msg) => TrainerError::format(format!("{}: {}", storage_file, msg)),
            other => other,
        })?;
        info!("Loaded {} byte dictionary from {}", dictionary.len(), storage_file);
        Ok(Some(dictionary))
    }

    /// Number of underlying fetches performed (cache misses, including failed ones).
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
