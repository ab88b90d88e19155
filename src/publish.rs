//! Serialization of trained dictionaries and hand-off to the upload sinks.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TrainerError};
use crate::frame::write_skippable_frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct SerializeOptions {
    /// Run the dictionary through zstd before publishing.
    #[serde(default)]
    pub compress: bool,
    /// Prefix the 8-byte skippable-frame header so the file can head a `.warc.zst`.
    #[serde(default)]
    pub skippable_frame: bool,
}

pub fn serialize_dictionary(dictionary: &[u8], opts: SerializeOptions) -> Result<Vec<u8>> {
    let mut data = if opts.compress {
        zstd::bulk::compress(dictionary, zstd::DEFAULT_COMPRESSION_LEVEL)?
    } else {
        dictionary.to_vec()
    };
    if opts.skippable_frame {
        data = write_skippable_frame(&data)?;
    }
    Ok(data)
}

/// Writes a serialized dictionary to disk and returns the number of bytes written.
pub fn dump_to_file<P: AsRef<Path>>(dictionary: &[u8], opts: SerializeOptions, path: P) -> Result<usize> {
    let data = serialize_dictionary(dictionary, opts)?;
    fs::write(path.as_ref(), &data)?;
    info!("Wrote {} byte dictionary to {}", data.len(), path.as_ref().display());
    Ok(data.len())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub public_url: String,
    pub backup_url: String,
}

/// Public mirror: returns the canonical URL the file is reachable at.
pub trait PublicSink: Send + Sync {
    fn put(&self, filename: &str, data: &[u8]) -> Result<String>;
}

/// Durable backup into a named archival item.
pub trait BackupSink: Send + Sync {
    fn archive(&self, item: &str, filename: &str, data: &[u8]) -> Result<String>;
}

pub struct PublishCoordinator {
    public: Box<dyn PublicSink>,
    backup: Box<dyn BackupSink>,
}

impl PublishCoordinator {
    pub fn new(public: Box<dyn PublicSink>, backup: Box<dyn BackupSink>) -> Self {
        Self { public, backup }
    }

    pub fn publish(&self, serialized: &[u8], filename: &str, item: &str) -> Result<UploadResult> {
        if serialized.is_empty() {
            return Err(TrainerError::Validation("refusing to publish an empty dictionary".to_string()));
        }
        let public_url = self.public.put(filename, serialized)?;
        info!("Published {} to {}", filename, public_url);
        let backup_url = self.backup.archive(item, filename, serialized)?;
        info!("Backed up {} to {}", filename, backup_url);
        Ok(UploadResult { public_url, backup_url })
    }
}
