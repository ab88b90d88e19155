//! HTTP implementations of the two publishing sinks.

use std::thread;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};
use reqwest::blocking::Client;
use tracing::warn;

use crate::error::{Result, TrainerError};
use crate::publish::{BackupSink, PublicSink};

pub const DEFAULT_PUBLIC_BASE: &str = "https://transfer.notkiska.pw";
pub const DEFAULT_BACKUP_ENDPOINT: &str = "https://s3.us.archive.org";
pub const DEFAULT_DOWNLOAD_HOST: &str = "https://archive.org";

/// Fixed-delay retry: `max_attempts` tries in total, `delay` between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 10, delay: Duration::from_secs(10) }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!("{} failed (attempt {}/{}): {}. Retrying in {:?}", what, attempt, attempts, e, self.delay);
                    thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `PUT <base>/<filename>`; the response body is the public URL.
pub struct HttpPublicMirror {
    client: Client,
    base_url: String,
}

impl HttpPublicMirror {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

impl PublicSink for HttpPublicMirror {
    fn put(&self, filename: &str, data: &[u8]) -> Result<String> {
        let url = format!("{}/{}", self.base_url, filename);
        let resp = self
            .client
            .put(&url)
            .body(data.to_vec())
            .send()
            .map_err(|e| TrainerError::network(&url, e))?;
        if !resp.status().is_success() {
            return Err(TrainerError::Http { url, status: resp.status().as_u16() });
        }
        let body = resp.text().map_err(|e| TrainerError::network(&url, e))?;
        Ok(body.trim().to_string())
    }
}

/// Base64 MD5 digest for the `Content-MD5` header; the endpoint rejects a body that does not match.
pub fn content_md5(data: &[u8]) -> String {
    STANDARD.encode(Md5::digest(data))
}

#[derive(Debug, Clone)]
pub struct ArchiveCredentials {
    pub access_key: String,
    pub secret_key: String,
}

/// Uploads into an archival item through its S3-style endpoint.
pub struct ArchiveItemBackup {
    client: Client,
    endpoint: String,
    download_host: String,
    collection: String,
    credentials: Option<ArchiveCredentials>,
    retry: RetryPolicy,
}

impl ArchiveItemBackup {
    pub fn new(client: Client, endpoint: &str, download_host: &str, collection: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            download_host: download_host.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            credentials: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Option<ArchiveCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn download_url(&self, item: &str, filename: &str) -> String {
        format!("{}/download/{}/{}", self.download_host, item, filename)
    }

    fn upload_once(&self, item: &str, filename: &str, data: &[u8], md5: &str) -> Result<()> {
        let url = format!("{}/{}/{}", self.endpoint, item, filename);
        let mut req = self
            .client
            .put(&url)
            .header("content-md5", md5)
            .header("x-amz-auto-make-bucket", "1")
            .header("x-archive-queue-derive", "0")
            .header("x-archive-meta-title", item)
            .header("x-archive-meta-mediatype", "data")
            .header("x-archive-meta-collection", self.collection.as_str())
            .body(data.to_vec());
        if let Some(c) = &self.credentials {
            req = req.header("authorization", format!("LOW {}:{}", c.access_key, c.secret_key));
        }
        let resp = req.send().map_err(|e| TrainerError::network(&url, e))?;
        if !resp.status().is_success() {
            return Err(TrainerError::Http { url, status: resp.status().as_u16() });
        }
        Ok(())
    }
}

impl BackupSink for ArchiveItemBackup {
    fn archive(&self, item: &str, filename: &str, data: &[u8]) -> Result<String> {
        let md5 = content_md5(data);
        self.retry
            .run(&format!("backup upload of {}/{}", item, filename), || self.upload_once(item, filename, data, &md5))?;
        Ok(self.download_url(item, filename))
    }
}
