//! End-to-end training cycle: index → sample → fetch → train → publish → catalog.

use std::sync::Arc;
use std::thread;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, CatalogEntry};
use crate::collector::ConcurrentCollector;
use crate::config::PipelineConfig;
use crate::error::{Result, TrainerError};
use crate::evaluate::{CompressionEvaluator, EvaluationReport};
use crate::fetcher::RangeFetcher;
use crate::index::{locate_latest_index, IndexParser};
use crate::publish::{PublishCoordinator, UploadResult};
use crate::record::IndexRecord;
use crate::sampler::Sampler;
use crate::storage::{ArchiveStorage, HttpArchiveStorage};
use crate::trainer::{ArchiveCorpus, DictionaryTrainer};
use crate::upload::{ArchiveItemBackup, HttpPublicMirror, RetryPolicy};

pub const DICTIONARY_EXTENSION: &str = "zstdict";

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: i64,
    pub project: String,
    pub sha256: String,
    pub byte_size: usize,
    pub sampled: usize,
    pub upload: UploadResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationReport>,
}

pub struct Pipeline {
    config: PipelineConfig,
    client: Client,
    storage: Arc<dyn ArchiveStorage>,
    publisher: PublishCoordinator,
    catalog: Arc<Catalog>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        client: Client,
        storage: Arc<dyn ArchiveStorage>,
        publisher: PublishCoordinator,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self { config, client, storage, publisher, catalog }
    }

    /// Wires HTTP storage and both HTTP sinks from a config.
    pub fn from_config(config: PipelineConfig, catalog: Arc<Catalog>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TrainerError::network(&config.archive_host, e))?;
        let storage: Arc<dyn ArchiveStorage> =
            Arc::new(HttpArchiveStorage::new(&config.storage_base, config.request_timeout())?);
        let public = HttpPublicMirror::new(client.clone(), &config.public_base);
        let backup = ArchiveItemBackup::new(
            client.clone(),
            &config.backup_endpoint,
            &config.archive_host,
            &config.backup_collection,
        )
        .with_credentials(config.credentials())
        .with_retry(RetryPolicy {
            max_attempts: config.backup_attempts,
            delay: std::time::Duration::from_secs(config.backup_retry_delay_secs),
        });
        let publisher = PublishCoordinator::new(Box::new(public), Box::new(backup));
        Ok(Self::new(config, client, storage, publisher, catalog))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sampler(&self) -> Sampler {
        let sampler = Sampler::new(self.config.sample_size, self.config.sampling);
        match self.config.sample_seed {
            Some(seed) => sampler.with_seed(seed),
            None => sampler,
        }
    }

    /// Samples `records` and returns a trainer that will fetch them from storage on demand.
    pub fn trainer_for(&self, records: &[IndexRecord]) -> DictionaryTrainer<ArchiveCorpus> {
        let sample = self.sampler().sample(records);
        let corpus = ArchiveCorpus::new(
            RangeFetcher::new(Arc::clone(&self.storage)),
            ConcurrentCollector::new(self.config.concurrency, self.config.failure_policy),
        );
        DictionaryTrainer::new(sample, self.config.training, corpus)
    }

    /// One full cycle against the newest index of `collection`.
    pub fn run_once(&self, collection: &str, project: &str) -> Result<RunSummary> {
        let index_url = locate_latest_index(&self.client, &self.config.archive_host, collection)?;
        let parsed = IndexParser::with_redownload(self.config.force_redownload).fetch(&self.client, &index_url)?;
        let id = chrono::Utc::now().timestamp();
        self.run_with_records(&parsed.records, collection, project, id)
    }

    pub fn run_with_records(&self, records: &[IndexRecord], collection: &str, project: &str, id: i64) -> Result<RunSummary> {
        let mut trainer = self.trainer_for(records);
        let sampled = trainer.records().len();
        let trained = trainer.trained()?;
        info!("Trained dictionary for {}: {} bytes, sha256 {}", project, trained.byte_size, trained.sha256);

        let evaluation = if self.config.evaluate {
            match trainer.evaluate(&CompressionEvaluator::default()) {
                Ok(report) => {
                    info!(
                        "Evaluation: original {} bytes, zstd+dict {} bytes (ratio {:.3})",
                        report.sum.original,
                        report.sum.zstd_dict,
                        report.dict_ratio()
                    );
                    Some(report)
                }
                Err(e) => {
                    warn!("Evaluation failed, publishing anyway: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let item = format!("{}_dictionary_{}", collection, id);
        let filename = format!("{}.{}", item, DICTIONARY_EXTENSION);
        let upload = self.publisher.publish(&trained.bytes, &filename, &item)?;

        self.catalog.add_entry(&CatalogEntry {
            id,
            project: project.to_string(),
            sha256: trained.sha256.clone(),
            public_url: upload.public_url.clone(),
            backup_url: upload.backup_url.clone(),
        })?;

        Ok(RunSummary {
            id,
            project: project.to_string(),
            sha256: trained.sha256,
            byte_size: trained.byte_size,
            sampled,
            upload,
            evaluation,
        })
    }

    /// Runs cycles forever. Failed cycles are logged and retried after the cooldown.
    pub fn run_forever(&self, collection: &str, project: &str) -> ! {
        loop {
            match self.run_once(collection, project) {
                Ok(summary) => info!(
                    "Cycle {} done: public {} backup {}",
                    summary.id, summary.upload.public_url, summary.upload.backup_url
                ),
                Err(e) => error!("Training cycle for {} failed: {}", collection, e),
            }
            info!("Sleeping {:?} before the next cycle", self.config.cooldown());
            thread::sleep(self.config.cooldown());
        }
    }
}
