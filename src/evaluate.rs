//! Diagnostic comparison of the trained dictionary against plain zstd and gzip.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::error::Result;
use crate::record::PayloadMap;

pub const DEFAULT_ZSTD_LEVEL: i32 = 3;
pub const GZIP_LEVEL: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompressionSizes {
    pub original: usize,
    pub zstd_dict: usize,
    pub zstd: Option<usize>,
    pub gzip: Option<usize>,
}

impl CompressionSizes {
    fn accumulate(&mut self, other: &CompressionSizes) {
        self.original += other.original;
        self.zstd_dict += other.zstd_dict;
        self.zstd = sum_opt(self.zstd, other.zstd);
        self.gzip = sum_opt(self.gzip, other.gzip);
    }
}

fn sum_opt(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (None, b) => b,
        (a, None) => a,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    pub single: BTreeMap<String, CompressionSizes>,
    pub sum: CompressionSizes,
}

impl EvaluationReport {
    /// Compressed-to-original ratio with the dictionary; lower is better.
    pub fn dict_ratio(&self) -> f64 {
        if self.sum.original == 0 {
            return 0.0;
        }
        self.sum.zstd_dict as f64 / self.sum.original as f64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompressionEvaluator {
    pub level: i32,
    pub without_dict: bool,
    pub gzip: bool,
}

impl Default for CompressionEvaluator {
    fn default() -> Self {
        Self { level: DEFAULT_ZSTD_LEVEL, without_dict: true, gzip: true }
    }
}

impl CompressionEvaluator {
    pub fn evaluate(&self, corpus: &PayloadMap, dictionary: &[u8]) -> Result<EvaluationReport> {
        let mut with_dict = zstd::bulk::Compressor::with_dictionary(self.level, dictionary)?;
        let mut plain = zstd::bulk::Compressor::new(self.level)?;

        let mut report = EvaluationReport::default();
        for (url, content) in corpus {
            let sizes = CompressionSizes {
                original: content.len(),
                zstd_dict: with_dict.compress(content)?.len(),
                zstd: if self.without_dict { Some(plain.compress(content)?.len()) } else { None },
                gzip: if self.gzip { Some(gzip_len(content)?) } else { None },
            };
            report.sum.accumulate(&sizes);
            report.single.insert(url.clone(), sizes);
        }
        Ok(report)
    }
}

fn gzip_len(content: &[u8]) -> Result<usize> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::new(GZIP_LEVEL));
    enc.write_all(content)?;
    Ok(enc.finish()?.len())
}
