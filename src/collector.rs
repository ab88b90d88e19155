//! Bounded fan-out of record fetches over a fixed pool of OS threads.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use dashmap::DashMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Result, TrainerError};
use crate::fetcher::RangeFetcher;
use crate::record::{IndexRecord, PayloadMap, SampleSet};

pub const DEFAULT_CONCURRENCY: usize = 50;

/// What to do when a single record fails to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failure aborts the whole collection.
    #[default]
    Abort,
    /// Log the failure, keep going, report it in [`Collection::failures`].
    Skip,
}

#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub url: String,
    pub storage_file: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct Collection {
    pub payloads: PayloadMap,
    pub failures: Vec<FetchFailure>,
}

impl Collection {
    pub fn total_bytes(&self) -> usize {
        self.payloads.values().map(|p| p.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ConcurrentCollector {
    pub concurrency: usize,
    pub policy: FailurePolicy,
}

impl Default for ConcurrentCollector {
    fn default() -> Self {
        Self { concurrency: DEFAULT_CONCURRENCY, policy: FailurePolicy::default() }
    }
}

impl ConcurrentCollector {
    pub fn new(concurrency: usize, policy: FailurePolicy) -> Self {
        Self { concurrency: concurrency.max(1), policy }
    }

    pub fn collect(&self, fetcher: &RangeFetcher, sample: &SampleSet) -> Result<Collection> {
        self.collect_with(sample, |record| fetcher.fetch(record))
    }

    /// Runs `fetch` over every record with at most `concurrency` calls in flight.
    pub fn collect_with<F>(&self, sample: &SampleSet, fetch: F) -> Result<Collection>
    where
        F: Fn(&IndexRecord) -> Result<Vec<u8>> + Sync,
    {
        let total = sample.len();
        if total == 0 {
            return Ok(Collection::default());
        }

        let queue: Mutex<Vec<&IndexRecord>> = Mutex::new(sample.iter().collect());
        let results: DashMap<String, Vec<u8>> = DashMap::with_capacity(total);
        let failures: Mutex<Vec<FetchFailure>> = Mutex::new(Vec::new());
        let first_error: Mutex<Option<TrainerError>> = Mutex::new(None);
        let aborted = AtomicBool::new(false);
        let progress = AtomicUsize::new(0);
        let workers = self.concurrency.max(1).min(total);

        info!("Collecting {} records with {} workers", total, workers);

        let fetch = &fetch;
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if aborted.load(Ordering::Acquire) {
                        break;
                    }
                    let record = match queue.lock() {
                        Ok(mut q) => match q.pop() {
                            Some(r) => r,
                            None => break,
                        },
                        Err(_) => break,
                    };

                    match fetch(record) {
                        Ok(data) => {
                            results.insert(record.original_url.clone(), data);
                        }
                        Err(e) => match self.policy {
                            FailurePolicy::Abort => {
                                aborted.store(true, Ordering::Release);
                                if let Ok(mut slot) = first_error.lock() {
                                    slot.get_or_insert(e);
                                }
                                break;
                            }
                            FailurePolicy::Skip => {
                                warn!("Skipping {} ({}): {}", record.original_url, record.storage_file, e);
                                if let Ok(mut f) = failures.lock() {
                                    f.push(FetchFailure {
                                        url: record.original_url.clone(),
                                        storage_file: record.storage_file.clone(),
                                        error: e.to_string(),
                                    });
                                }
                            }
                        },
                    }

                    let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % 100 == 0 {
                        info!("[Collector] {}/{} fetched", done, total);
                    }
                });
            }
        });

        let first_error = first_error
            .into_inner()
            .map_err(|_| TrainerError::Worker("error slot poisoned".to_string()))?;
        if let Some(e) = first_error {
            return Err(e);
        }
        if aborted.load(Ordering::Acquire) {
            return Err(TrainerError::Worker("collection aborted".to_string()));
        }
        let queue_left = queue.into_inner().map(|q| q.len()).unwrap_or(1);
        if queue_left > 0 {
            return Err(TrainerError::Worker(format!("{} records left unprocessed", queue_left)));
        }

        let failures = failures
            .into_inner()
            .map_err(|_| TrainerError::Worker("failure list poisoned".to_string()))?;
        let payloads: PayloadMap = results.into_iter().collect();
        let collection = Collection { payloads, failures };
        info!(
            "Collected {} payloads ({} bytes), {} failures",
            collection.payloads.len(),
            collection.total_bytes(),
            collection.failures.len()
        );
        Ok(collection)
    }
}
