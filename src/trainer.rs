//! Dictionary training with memoized, invalidate-together derived values.
//!
//! The trainer owns the sampled record set. Everything derived from it (the
//! fetched corpus, the trained dictionary, its serialized form and the hash of
//! that form) is computed lazily, at most once per generation, and dropped as a
//! unit whenever the record set changes.

use std::ffi::CStr;
use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use zstd::zstd_safe::zstd_sys;

use crate::collector::{Collection, ConcurrentCollector};
use crate::error::{Result, TrainerError};
use crate::evaluate::{CompressionEvaluator, EvaluationReport};
use crate::fetcher::RangeFetcher;
use crate::publish::{serialize_dictionary, SerializeOptions};
use crate::record::{IndexRecord, PayloadMap, SampleSet};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub dict_size: usize,
    /// COVER segment size.
    pub k: u32,
    /// COVER dmer length.
    pub d: u32,
    pub level: i32,
    pub compress: bool,
    pub skippable_frame: bool,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self::scheduled()
    }
}

impl TrainingParams {
    /// Parameters of the recurring per-collection job; the published file is zstd-compressed.
    pub fn scheduled() -> Self {
        Self { dict_size: 1024 * 1024, k: 100_000, d: 9, level: 9, compress: true, skippable_frame: false }
    }

    /// Parameters of one-off local training runs.
    pub fn standalone() -> Self {
        Self { d: 8, compress: false, ..Self::scheduled() }
    }

    /// `k` and `d` clamped so that `d <= k <= dict_size`, as COVER requires.
    pub fn cover_segment(&self) -> (u32, u32) {
        let k = self.k.min(u32::try_from(self.dict_size).unwrap_or(u32::MAX)).max(1);
        (k, self.d.min(k).max(1))
    }

    pub fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions { compress: self.compress, skippable_frame: self.skippable_frame }
    }
}

/// Trains a zstd dictionary with the COVER algorithm.
///
/// Samples are fed in key order so identical corpora train identical dictionaries.
pub fn train_dictionary(corpus: &PayloadMap, params: &TrainingParams) -> Result<Vec<u8>> {
    let total: usize = corpus.values().map(|p| p.len()).sum();
    let mut samples = Vec::with_capacity(total);
    let mut sizes = Vec::with_capacity(corpus.len());
    for payload in corpus.values().filter(|p| !p.is_empty()) {
        samples.extend_from_slice(payload);
        sizes.push(payload.len());
    }
    if sizes.is_empty() {
        return Err(TrainerError::Training("no training data".to_string()));
    }
    let nb_samples = u32::try_from(sizes.len())
        .map_err(|_| TrainerError::Training(format!("too many samples: {}", sizes.len())))?;

    let (k, d) = params.cover_segment();
    if (k, d) != (params.k, params.d) {
        warn!("COVER k={} d={} do not fit a {} byte dictionary, using k={} d={}", params.k, params.d, params.dict_size, k, d);
    }
    info!(
        "Training dictionary: {} samples, {} bytes, max size {}, k={} d={} level={}",
        sizes.len(),
        samples.len(),
        params.dict_size,
        k,
        d,
        params.level
    );

    // SAFETY: the params struct is plain C data and all-zero is its documented "use defaults" state.
    let mut cover: zstd_sys::ZDICT_cover_params_t = unsafe { std::mem::zeroed() };
    cover.k = k;
    cover.d = d;
    cover.splitPoint = 1.0;
    cover.zParams.compressionLevel = params.level;

    let mut dictionary = vec![0u8; params.dict_size];
    // SAFETY: buffers and lengths come from live Vecs; `sizes` sums to `samples.len()`.
    let written = unsafe {
        zstd_sys::ZDICT_trainFromBuffer_cover(
            dictionary.as_mut_ptr().cast(),
            dictionary.len(),
            samples.as_ptr().cast(),
            sizes.as_ptr(),
            nb_samples,
            cover,
        )
    };
    if unsafe { zstd_sys::ZDICT_isError(written) } != 0 {
        let name = unsafe { CStr::from_ptr(zstd_sys::ZDICT_getErrorName(written)) };
        return Err(TrainerError::Training(name.to_string_lossy().into_owned()));
    }
    dictionary.truncate(written);
    info!("Dictionary trained: {} bytes", dictionary.len());
    Ok(dictionary)
}

/// Where the trainer gets its payloads from.
pub trait CorpusSource {
    fn acquire(&self, records: &SampleSet) -> Result<PayloadMap>;
}

/// Fetches payloads from archive storage.
pub struct ArchiveCorpus {
    pub fetcher: RangeFetcher,
    pub collector: ConcurrentCollector,
}

impl ArchiveCorpus {
    pub fn new(fetcher: RangeFetcher, collector: ConcurrentCollector) -> Self {
        Self { fetcher, collector }
    }
}

impl CorpusSource for ArchiveCorpus {
    fn acquire(&self, records: &SampleSet) -> Result<PayloadMap> {
        let Collection { payloads, failures } = self.collector.collect(&self.fetcher, records)?;
        if !failures.is_empty() {
            warn!("Training without {} records that failed to fetch", failures.len());
        }
        Ok(payloads)
    }
}

/// A fixed, already materialized corpus. Records are ignored.
pub struct StaticCorpus(pub PayloadMap);

impl CorpusSource for StaticCorpus {
    fn acquire(&self, _records: &SampleSet) -> Result<PayloadMap> {
        Ok(self.0.clone())
    }
}

/// Immutable result of one training generation.
#[derive(Debug, Clone)]
pub struct TrainedDictionary {
    pub bytes: Arc<Vec<u8>>,
    pub sha256: String,
    pub byte_size: usize,
}

#[derive(Default)]
struct Derived {
    corpus: Option<Arc<PayloadMap>>,
    dictionary: Option<Arc<Vec<u8>>>,
    serialized: Option<Arc<Vec<u8>>>,
    sha256: Option<String>,
}

enum State {
    Uninitialized,
    Computed(Derived),
}

pub struct DictionaryTrainer<S: CorpusSource> {
    records: SampleSet,
    params: TrainingParams,
    source: S,
    state: State,
    generation: u64,
}

impl<S: CorpusSource> DictionaryTrainer<S> {
    pub fn new(records: SampleSet, params: TrainingParams, source: S) -> Self {
        Self { records, params, source, state: State::Uninitialized, generation: 0 }
    }

    pub fn records(&self) -> &SampleSet {
        &self.records
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    /// Bumped on every invalidation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_computed(&self) -> bool {
        matches!(self.state, State::Computed(_))
    }

    pub fn add_url(&mut self, record: IndexRecord) {
        self.records.insert(record);
        self.reset();
    }

    /// Drops every derived value at once.
    pub fn reset(&mut self) {
        self.state = State::Uninitialized;
        self.generation += 1;
    }

    fn derived(&mut self) -> &mut Derived {
        if let State::Uninitialized = self.state {
            self.state = State::Computed(Derived::default());
        }
        match &mut self.state {
            State::Computed(d) => d,
            State::Uninitialized => unreachable!("state was just initialized"),
        }
    }

    pub fn corpus(&mut self) -> Result<Arc<PayloadMap>> {
        if let State::Computed(Derived { corpus: Some(c), .. }) = &self.state {
            return Ok(Arc::clone(c));
        }
        let corpus = Arc::new(self.source.acquire(&self.records)?);
        self.derived().corpus = Some(Arc::clone(&corpus));
        Ok(corpus)
    }

    pub fn dictionary(&mut self) -> Result<Arc<Vec<u8>>> {
        if let State::Computed(Derived { dictionary: Some(d), .. }) = &self.state {
            return Ok(Arc::clone(d));
        }
        let corpus = self.corpus()?;
        let dictionary = Arc::new(train_dictionary(&corpus, &self.params)?);
        self.derived().dictionary = Some(Arc::clone(&dictionary));
        Ok(dictionary)
    }

    /// The bytes that get published.
    pub fn serialized(&mut self) -> Result<Arc<Vec<u8>>> {
        if let State::Computed(Derived { serialized: Some(s), .. }) = &self.state {
            return Ok(Arc::clone(s));
        }
        let dictionary = self.dictionary()?;
        let serialized = Arc::new(serialize_dictionary(&dictionary, self.params.serialize_options())?);
        self.derived().serialized = Some(Arc::clone(&serialized));
        Ok(serialized)
    }

    /// Lower-case hex sha256 of the serialized form.
    pub fn sha256(&mut self) -> Result<String> {
        if let State::Computed(Derived { sha256: Some(h), .. }) = &self.state {
            return Ok(h.clone());
        }
        let serialized = self.serialized()?;
        let hash = hex::encode(Sha256::digest(serialized.as_slice()));
        self.derived().sha256 = Some(hash.clone());
        Ok(hash)
    }

    /// Size of the raw trained dictionary.
    pub fn dict_size(&mut self) -> Result<usize> {
        Ok(self.dictionary()?.len())
    }

    pub fn trained(&mut self) -> Result<TrainedDictionary> {
        let bytes = self.serialized()?;
        let sha256 = self.sha256()?;
        Ok(TrainedDictionary { byte_size: bytes.len(), bytes, sha256 })
    }

    pub fn evaluate(&mut self, evaluator: &CompressionEvaluator) -> Result<EvaluationReport> {
        let corpus = self.corpus()?;
        let dictionary = self.dictionary()?;
        evaluator.evaluate(&corpus, &dictionary)
    }
}
