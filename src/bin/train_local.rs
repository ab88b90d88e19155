//! Train Local: one-off dictionary from an index file or URL, written to disk.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use reqwest::blocking::Client;
use url::Url;

use archive_dict_trainer::collector::{ConcurrentCollector, FailurePolicy};
use archive_dict_trainer::evaluate::CompressionEvaluator;
use archive_dict_trainer::fetcher::RangeFetcher;
use archive_dict_trainer::index::IndexParser;
use archive_dict_trainer::publish::dump_to_file;
use archive_dict_trainer::sampler::{Sampler, SamplingMode};
use archive_dict_trainer::storage::{ArchiveStorage, HttpArchiveStorage, LocalArchiveStorage, DEFAULT_STORAGE_BASE};
use archive_dict_trainer::trainer::{ArchiveCorpus, DictionaryTrainer, TrainingParams};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Index file path or http(s) URL (plain or gzip)
    index: String,

    /// Where the dictionary is written
    #[arg(short, long, default_value = "dictionary.zstdict")]
    output: String,

    /// Concurrent fetch workers
    #[arg(short, long, default_value_t = 50)]
    concurrency: usize,

    #[arg(short, long, default_value_t = 4000)]
    sample_size: usize,

    /// Sample with replacement instead of without
    #[arg(long)]
    with_replacement: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Dictionary size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    dict_size: usize,

    /// COVER segment size (clamped to the dictionary size)
    #[arg(short, long)]
    k: Option<u32>,

    /// COVER dmer length (clamped to k)
    #[arg(short, long)]
    d: Option<u32>,

    /// zstd-compress the dictionary before writing
    #[arg(long)]
    compress: bool,

    /// Wrap the output in a skippable frame
    #[arg(long)]
    frame: bool,

    /// Read storage files from this directory instead of the archive
    #[arg(long)]
    storage_dir: Option<String>,

    /// Base URL for remote storage files
    #[arg(long, default_value = DEFAULT_STORAGE_BASE)]
    storage_base: String,

    /// Drop records that fail to fetch instead of aborting
    #[arg(long)]
    skip_failures: bool,

    /// Skip the compression comparison
    #[arg(long)]
    no_evaluate: bool,

    #[arg(long, default_value_t = 120)]
    timeout: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let timeout = Duration::from_secs(args.timeout);

    let started = Instant::now();
    let parser = IndexParser::new();
    let remote = Url::parse(&args.index).map(|u| matches!(u.scheme(), "http" | "https")).unwrap_or(false);
    let parsed = if remote {
        let client = Client::builder().timeout(timeout).build()?;
        parser.fetch(&client, &args.index)?
    } else {
        parser.parse_file(&args.index)?
    };
    println!(
        "[Train Local] Index: {} rows, {} usable, {} filtered, {} malformed",
        parsed.rows,
        parsed.records.len(),
        parsed.filtered,
        parsed.malformed
    );
    if parsed.records.is_empty() {
        bail!("no usable records in {}", args.index);
    }

    let mode = if args.with_replacement { SamplingMode::WithReplacement } else { SamplingMode::WithoutReplacement };
    let mut sampler = Sampler::new(args.sample_size, mode);
    if let Some(seed) = args.seed {
        sampler = sampler.with_seed(seed);
    }
    let sample = sampler.sample(&parsed.records);
    println!("[Train Local] Sampled {} records", sample.len());

    let http = HttpArchiveStorage::new(&args.storage_base, timeout)?;
    let storage: Arc<dyn ArchiveStorage> = match &args.storage_dir {
        Some(dir) => Arc::new(LocalArchiveStorage::new(dir).with_direct_fallback(http)),
        None => Arc::new(http),
    };
    let policy = if args.skip_failures { FailurePolicy::Skip } else { FailurePolicy::Abort };
    let corpus = ArchiveCorpus::new(RangeFetcher::new(storage), ConcurrentCollector::new(args.concurrency, policy));

    let defaults = TrainingParams::standalone();
    let params = TrainingParams {
        dict_size: args.dict_size,
        k: args.k.unwrap_or(defaults.k),
        d: args.d.unwrap_or(defaults.d),
        compress: args.compress,
        skippable_frame: args.frame,
        ..defaults
    };
    let mut trainer = DictionaryTrainer::new(sample, params, corpus);
    let dictionary = trainer.dictionary()?;
    let written = dump_to_file(&dictionary, params.serialize_options(), &args.output)?;
    println!("[Train Local] Dictionary: {} bytes ({} on disk) -> {}", dictionary.len(), written, args.output);
    println!("[Train Local] sha256 {}", trainer.sha256()?);

    if !args.no_evaluate {
        let report = trainer.evaluate(&CompressionEvaluator::default())?;
        let sum = report.sum;
        println!("[Train Local] Evaluation over {} samples:", report.single.len());
        println!("  original      {:>12}", sum.original);
        println!("  zstd + dict   {:>12}  ({:.3})", sum.zstd_dict, report.dict_ratio());
        if let Some(z) = sum.zstd {
            println!("  zstd          {:>12}", z);
        }
        if let Some(g) = sum.gzip {
            println!("  gzip -9       {:>12}", g);
        }
    }

    println!("[Train Local] Done in {:.2?}", started.elapsed());
    Ok(())
}
