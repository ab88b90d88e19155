use std::io::{self, Read};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use tracing::debug;

use crate::dict_cache::DictionaryCache;
use crate::error::{Result, TrainerError};
use crate::record::IndexRecord;
use crate::storage::ArchiveStorage;

/// How a storage file's records are encoded, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEncoding {
    /// `.zst`: one zstd frame per record, possibly against an embedded dictionary.
    Zstd,
    /// `.gz`: one gzip member per record.
    Gzip,
    /// `.warc`: stored uncompressed.
    Raw,
}

impl StorageEncoding {
    pub fn from_filename(storage_file: &str) -> Result<Self> {
        if storage_file.ends_with(".zst") {
            Ok(StorageEncoding::Zstd)
        } else if storage_file.ends_with(".gz") {
            Ok(StorageEncoding::Gzip)
        } else if storage_file.ends_with(".warc") {
            Ok(StorageEncoding::Raw)
        } else {
            Err(TrainerError::format(format!("storage file type not supported: {}", storage_file)))
        }
    }
}

/// Fetches and decodes the payload of a single index record.
pub struct RangeFetcher {
    storage: Arc<dyn ArchiveStorage>,
    dictionaries: Arc<DictionaryCache>,
}

impl RangeFetcher {
    pub fn new(storage: Arc<dyn ArchiveStorage>) -> Self {
        let dictionaries = Arc::new(DictionaryCache::new(Arc::clone(&storage)));
        Self { storage, dictionaries }
    }

    pub fn with_cache(storage: Arc<dyn ArchiveStorage>, dictionaries: Arc<DictionaryCache>) -> Self {
        Self { storage, dictionaries }
    }

    pub fn dictionaries(&self) -> &Arc<DictionaryCache> {
        &self.dictionaries
    }

    pub fn fetch(&self, record: &IndexRecord) -> Result<Vec<u8>> {
        if record.force_redownload {
            let data = self.storage.fetch_direct(&record.original_url)?;
            debug!("{} {} (direct)", data.len(), record.original_url);
            return Ok(data);
        }

        // Reject unknown types before touching the network.
        let encoding = StorageEncoding::from_filename(&record.storage_file)?;
        let dictionary = match encoding {
            StorageEncoding::Zstd => self.dictionaries.get(&record.storage_file)?,
            _ => None,
        };

        let (start, end) = record
            .byte_range()
            .ok_or_else(|| TrainerError::format(format!("{}: empty storage range", record.original_url)))?;
        let raw = self.storage.read_range(&record.storage_file, start, end)?;

        let data = match encoding {
            StorageEncoding::Zstd => decode_zstd(&raw, dictionary.as_deref().map(|d| d.as_slice())),
            StorageEncoding::Gzip => decode_gzip(&raw),
            StorageEncoding::Raw => Ok(raw),
        }
        .map_err(|e| TrainerError::format(format!("{} in {}: {}", record.original_url, record.storage_file, e)))?;

        debug!("{} {}", data.len(), record.original_url);
        Ok(data)
    }
}

fn decode_zstd(compressed: &[u8], dictionary: Option<&[u8]>) -> io::Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    if let Some(d) = dictionary {
        let mut decoder = zstd::stream::read::Decoder::with_dictionary(compressed, d)?;
        io::copy(&mut decoder, &mut decompressed)?;
    } else {
        let mut decoder = zstd::stream::read::Decoder::new(compressed)?;
        io::copy(&mut decoder, &mut decompressed)?;
    }
    Ok(decompressed)
}

fn decode_gzip(compressed: &[u8]) -> io::Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    MultiGzDecoder::new(compressed).read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
