use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::info;

use crate::record::{IndexRecord, SampleSet};

pub const DEFAULT_SAMPLE_SIZE: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    #[default]
    WithoutReplacement,
    /// Independent draws; duplicates collapse in the resulting set, so it may come out smaller.
    WithReplacement,
}

#[derive(Debug, Clone)]
pub struct Sampler {
    pub sample_size: usize,
    pub mode: SamplingMode,
    pub seed: Option<u64>,
}

impl Default for Sampler {
    fn default() -> Self {
        Self { sample_size: DEFAULT_SAMPLE_SIZE, mode: SamplingMode::default(), seed: None }
    }
}

impl Sampler {
    pub fn new(sample_size: usize, mode: SamplingMode) -> Self {
        Self { sample_size, mode, seed: None }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn sample(&self, records: &[IndexRecord]) -> SampleSet {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.sample_with_rng(records, &mut rng)
    }

    pub fn sample_with_rng<R: Rng + ?Sized>(&self, records: &[IndexRecord], rng: &mut R) -> SampleSet {
        let sample: SampleSet = match self.mode {
            SamplingMode::WithoutReplacement => {
                // Dedup first so the set never comes out short because two picks were equal.
                let mut seen = HashSet::with_capacity(records.len());
                let distinct: Vec<&IndexRecord> = records.iter().filter(|r| seen.insert(*r)).collect();
                let k = self.sample_size.min(distinct.len());
                distinct.choose_multiple(rng, k).map(|r| (*r).clone()).collect()
            }
            SamplingMode::WithReplacement => {
                let k = self.sample_size.min(records.len());
                (0..k).filter_map(|_| records.choose(rng)).cloned().collect()
            }
        };
        info!(
            "Sampled {} of {} candidate records ({:?})",
            sample.len(),
            records.len(),
            self.mode
        );
        sample
    }
}
