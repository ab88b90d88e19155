use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::error::{Result, TrainerError};

pub const DEFAULT_STORAGE_BASE: &str = "https://archive.org/download";

/// Byte-addressable archive storage.
///
/// Ranges are inclusive on both ends, matching HTTP `Range: bytes=start-end`.
pub trait ArchiveStorage: Send + Sync {
    fn read_range(&self, storage_file: &str, start: u64, end: u64) -> Result<Vec<u8>>;

    /// Fetches a live URL as-is, without following redirects.
    fn fetch_direct(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpArchiveStorage {
    base_url: String,
    client: Client,
    direct_client: Client,
}

impl HttpArchiveStorage {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| TrainerError::format(format!("bad storage base {:?}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TrainerError::format(format!("storage base must be http(s): {}", base_url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("archive-dict-trainer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrainerError::network(base_url, e))?;
        let direct_client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| TrainerError::network(base_url, e))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            direct_client,
        })
    }

    pub fn object_url(&self, storage_file: &str) -> String {
        format!("{}/{}", self.base_url, storage_file)
    }
}

impl ArchiveStorage for HttpArchiveStorage {
    fn read_range(&self, storage_file: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let url = self.object_url(storage_file);
        let resp = self
            .client
            .get(&url)
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .map_err(|e| TrainerError::network(&url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TrainerError::Http { url, status: status.as_u16() });
        }
        let body = resp.bytes().map_err(|e| TrainerError::network(&url, e))?;
        debug!("Range {}-{} of {}: HTTP {}, {} bytes", start, end, storage_file, status, body.len());

        // A short 206 is a range clamped at end of object. A 200 only counts when the
        // whole object starts at the requested offset and fits inside the range.
        let requested = end - start + 1;
        let len = body.len() as u64;
        let honoured = if status == StatusCode::PARTIAL_CONTENT {
            len <= requested
        } else {
            start == 0 && len <= requested
        };
        if !honoured {
            return Err(TrainerError::format(format!(
                "{}: range {}-{} not honoured (HTTP {}, {} bytes)",
                url,
                start,
                end,
                status.as_u16(),
                len
            )));
        }
        Ok(body.to_vec())
    }

    fn fetch_direct(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.direct_client.get(url).send().map_err(|e| TrainerError::network(url, e))?;
        let body = resp.bytes().map_err(|e| TrainerError::network(url, e))?;
        Ok(body.to_vec())
    }
}

/// Serves ranges from a local mirror directory laid out as `<root>/<storage_file>`.
pub struct LocalArchiveStorage {
    root: PathBuf,
    direct: Option<HttpArchiveStorage>,
}

impl LocalArchiveStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into(), direct: None }
    }

    /// Direct downloads go over HTTP; without this they fail.
    pub fn with_direct_fallback(mut self, http: HttpArchiveStorage) -> Self {
        self.direct = Some(http);
        self
    }
}

impl ArchiveStorage for LocalArchiveStorage {
    fn read_range(&self, storage_file: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let path = self.root.join(storage_file);
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        if start >= file_len {
            return Ok(Vec::new());
        }
        // Like an HTTP server, clamp the end of the range to the object size.
        let end = end.min(file_len - 1);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity((end - start + 1) as usize);
        file.take(end - start + 1).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn fetch_direct(&self, url: &str) -> Result<Vec<u8>> {
        match &self.direct {
            Some(http) => http.fetch_direct(url),
            None => Err(TrainerError::Validation(format!("local storage cannot download {}", url))),
        }
    }
}
