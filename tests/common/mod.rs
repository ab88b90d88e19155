#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archive_dict_trainer::error::{Result, TrainerError};
use archive_dict_trainer::publish::{BackupSink, PublicSink};
use archive_dict_trainer::record::IndexRecord;
use archive_dict_trainer::storage::ArchiveStorage;

/// In-memory storage that counts every read.
#[derive(Default)]
pub struct MemoryStorage {
    files: HashMap<String, Vec<u8>>,
    direct: HashMap<String, Vec<u8>>,
    pub range_reads: AtomicUsize,
    pub header_reads: AtomicUsize,
    pub direct_reads: AtomicUsize,
    delay: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, data: Vec<u8>) -> Self {
        self.files.insert(name.to_string(), data);
        self
    }

    pub fn with_direct(mut self, url: &str, data: Vec<u8>) -> Self {
        self.direct.insert(url.to_string(), data);
        self
    }

    /// Sleeps on every read so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    pub fn header_reads(&self) -> usize {
        self.header_reads.load(Ordering::SeqCst)
    }
}

impl ArchiveStorage for MemoryStorage {
    fn read_range(&self, storage_file: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        if start == 0 && end == 7 {
            self.header_reads.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        let data = self
            .files
            .get(storage_file)
            .ok_or_else(|| TrainerError::Http { url: storage_file.to_string(), status: 404 })?;
        let start = start as usize;
        if start >= data.len() {
            return Ok(Vec::new());
        }
        let end = (end as usize).min(data.len() - 1);
        Ok(data[start..=end].to_vec())
    }

    fn fetch_direct(&self, url: &str) -> Result<Vec<u8>> {
        self.direct_reads.fetch_add(1, Ordering::SeqCst);
        self.direct
            .get(url)
            .cloned()
            .ok_or_else(|| TrainerError::Http { url: url.to_string(), status: 404 })
    }
}

/// Lays records out back to back in one storage file and returns matching index records.
pub fn pack_records(storage_file: &str, encoded: &[(&str, Vec<u8>)]) -> (Vec<u8>, Vec<IndexRecord>) {
    let mut file = Vec::new();
    let mut records = Vec::new();
    for (url, data) in encoded {
        records.push(IndexRecord::new(url, file.len() as u64, data.len() as u64, storage_file));
        file.extend_from_slice(data);
    }
    (file, records)
}

/// Deterministic html-ish pages with enough variety for COVER training.
pub fn synthetic_pages(count: usize, seed: u64) -> Vec<Vec<u8>> {
    const WORDS: [&str; 24] = [
        "archive", "capture", "crawler", "index", "mirror", "frame", "segment", "payload",
        "header", "record", "sample", "window", "stream", "buffer", "offset", "length",
        "project", "version", "content", "request", "session", "cookie", "anchor", "script",
    ];
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };
    (0..count)
        .map(|i| {
            let mut page = format!("<html><head><title>page {}</title></head><body>", i);
            for _ in 0..(12 + next() % 20) {
                let w = WORDS[next() % WORDS.len()];
                page.push_str(&format!("<p class=\"{}\">{} {} {}</p>", w, w, next() % 1000, WORDS[next() % WORDS.len()]));
            }
            page.push_str("</body></html>\n");
            page.into_bytes()
        })
        .collect()
}

#[derive(Clone, Default)]
pub struct RecordingPublic {
    pub puts: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    pub fail: bool,
}

impl PublicSink for RecordingPublic {
    fn put(&self, filename: &str, data: &[u8]) -> Result<String> {
        if self.fail {
            return Err(TrainerError::Http { url: format!("https://mirror.test/{}", filename), status: 503 });
        }
        self.puts.lock().unwrap().push((filename.to_string(), data.to_vec()));
        Ok(format!("https://mirror.test/{}", filename))
    }
}

#[derive(Clone, Default)]
pub struct RecordingBackup {
    pub items: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
}

impl BackupSink for RecordingBackup {
    fn archive(&self, item: &str, filename: &str, data: &[u8]) -> Result<String> {
        self.items.lock().unwrap().push((item.to_string(), filename.to_string(), data.to_vec()));
        Ok(format!("https://archive.test/download/{}/{}", item, filename))
    }
}
