use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::collector::{FailurePolicy, DEFAULT_CONCURRENCY};
use crate::dashboard::DEFAULT_PORT;
use crate::error::Result;
use crate::sampler::{SamplingMode, DEFAULT_SAMPLE_SIZE};
use crate::storage::DEFAULT_STORAGE_BASE;
use crate::trainer::TrainingParams;
use crate::upload::{ArchiveCredentials, DEFAULT_BACKUP_ENDPOINT, DEFAULT_DOWNLOAD_HOST, DEFAULT_PUBLIC_BASE};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub concurrency: usize,
    pub sample_size: usize,
    pub sampling: SamplingMode,
    pub sample_seed: Option<u64>,
    pub failure_policy: FailurePolicy,
    pub force_redownload: bool,

    /// Base for range reads: `<storage_base>/<storage_file>`.
    pub storage_base: String,
    /// Used for index discovery and backup download URLs.
    pub archive_host: String,
    pub request_timeout_secs: u64,

    pub public_base: String,
    pub backup_endpoint: String,
    pub backup_collection: String,
    pub backup_access_key: Option<String>,
    pub backup_secret_key: Option<String>,
    pub backup_attempts: u32,
    pub backup_retry_delay_secs: u64,

    pub catalog_path: String,
    pub dashboard_port: u16,
    pub cooldown_secs: u64,
    pub evaluate: bool,

    pub training: TrainingParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            sample_size: DEFAULT_SAMPLE_SIZE,
            sampling: SamplingMode::default(),
            sample_seed: None,
            failure_policy: FailurePolicy::default(),
            force_redownload: false,
            storage_base: DEFAULT_STORAGE_BASE.to_string(),
            archive_host: DEFAULT_DOWNLOAD_HOST.to_string(),
            request_timeout_secs: 120,
            public_base: DEFAULT_PUBLIC_BASE.to_string(),
            backup_endpoint: DEFAULT_BACKUP_ENDPOINT.to_string(),
            backup_collection: "test_collection".to_string(),
            backup_access_key: None,
            backup_secret_key: None,
            backup_attempts: 10,
            backup_retry_delay_secs: 10,
            catalog_path: "dictionaries.jsonl".to_string(),
            dashboard_port: DEFAULT_PORT,
            cooldown_secs: 3600,
            evaluate: false,
            training: TrainingParams::scheduled(),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file; absent keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Overrides fields from `ADT_*` environment variables when set and parseable.
    pub fn apply_env(mut self) -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|s| s.parse().ok())
        }
        if let Some(v) = var("ADT_CONCURRENCY") { self.concurrency = v; }
        if let Some(v) = var("ADT_SAMPLE_SIZE") { self.sample_size = v; }
        if let Some(v) = var("ADT_STORAGE_BASE") { self.storage_base = v; }
        if let Some(v) = var("ADT_PUBLIC_BASE") { self.public_base = v; }
        if let Some(v) = var("ADT_BACKUP_ENDPOINT") { self.backup_endpoint = v; }
        if let Some(v) = var("ADT_BACKUP_COLLECTION") { self.backup_collection = v; }
        if let Some(v) = var("ADT_CATALOG") { self.catalog_path = v; }
        if let Some(v) = var("ADT_COOLDOWN_SECS") { self.cooldown_secs = v; }
        if let Some(v) = var::<String>("ADT_ACCESS_KEY") { self.backup_access_key = Some(v); }
        if let Some(v) = var::<String>("ADT_SECRET_KEY") { self.backup_secret_key = Some(v); }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn credentials(&self) -> Option<ArchiveCredentials> {
        match (&self.backup_access_key, &self.backup_secret_key) {
            (Some(a), Some(s)) => Some(ArchiveCredentials { access_key: a.clone(), secret_key: s.clone() }),
            _ => None,
        }
    }
}
