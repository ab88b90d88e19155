mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use archive_dict_trainer::collector::{ConcurrentCollector, FailurePolicy};
use archive_dict_trainer::dict_cache::DictionaryCache;
use archive_dict_trainer::error::TrainerError;
use archive_dict_trainer::fetcher::RangeFetcher;
use archive_dict_trainer::frame::write_skippable_frame;
use archive_dict_trainer::index::IndexParser;
use archive_dict_trainer::record::{IndexRecord, PayloadMap, SampleSet};
use archive_dict_trainer::sampler::{Sampler, SamplingMode};
use archive_dict_trainer::storage::ArchiveStorage;
use archive_dict_trainer::trainer::{train_dictionary, TrainingParams};
use flate2::write::GzEncoder;
use flate2::Compression;

use common::{pack_records, synthetic_pages, MemoryStorage};

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn small_params() -> TrainingParams {
    TrainingParams { dict_size: 4096, k: 256, d: 8, level: 3, compress: false, skippable_frame: false }
}

#[test]
fn test_index_to_payloads_over_raw_warc() {
    let pages: Vec<Vec<u8>> = (0..3).map(|i| format!("<html>page {}</html>", i).repeat(i + 1).into_bytes()).collect();
    let mut file = Vec::new();
    let mut index = String::from(" CDX a m V S g\n");
    for (i, page) in pages.iter().enumerate() {
        index.push_str(&format!("http://site.test/{} text/html {} {} crawl.warc\n", i, file.len(), page.len()));
        file.extend_from_slice(page);
    }
    index.push_str("http://site.test/logo.png image/png 0 10 crawl.warc\n");

    let parsed = IndexParser::new().parse_bytes(index.as_bytes()).unwrap();
    assert_eq!(parsed.rows, 4);
    assert_eq!(parsed.records.len(), 3);
    assert_eq!(parsed.filtered, 1);

    let sample = Sampler::new(10, SamplingMode::WithoutReplacement).with_seed(1).sample(&parsed.records);
    assert_eq!(sample.len(), 3);

    let storage = Arc::new(MemoryStorage::new().with_file("crawl.warc", file));
    let fetcher = RangeFetcher::new(storage.clone());
    let collection = ConcurrentCollector::new(4, FailurePolicy::Abort).collect(&fetcher, &sample).unwrap();

    assert!(collection.failures.is_empty());
    assert_eq!(collection.payloads.len(), 3);
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(&collection.payloads[&format!("http://site.test/{}", i)], page);
    }
    assert_eq!(storage.range_reads(), 3);
    // Raw files never consult the dictionary cache.
    assert!(fetcher.dictionaries().is_empty());
}

#[test]
fn test_gzip_members_are_decoded() {
    let pages = synthetic_pages(5, 3);
    let encoded: Vec<(String, Vec<u8>)> =
        pages.iter().enumerate().map(|(i, p)| (format!("http://gz.test/{}", i), gzip(p))).collect();
    let refs: Vec<(&str, Vec<u8>)> = encoded.iter().map(|(u, d)| (u.as_str(), d.clone())).collect();
    let (file, records) = pack_records("crawl.warc.gz", &refs);

    let storage = Arc::new(MemoryStorage::new().with_file("crawl.warc.gz", file));
    let fetcher = RangeFetcher::new(storage);
    for (record, page) in records.iter().zip(&pages) {
        assert_eq!(&fetcher.fetch(record).unwrap(), page);
    }
}

#[test]
fn test_zst_without_embedded_dictionary_uses_plain_zstd() {
    let pages = synthetic_pages(6, 11);
    let encoded: Vec<(String, Vec<u8>)> = pages
        .iter()
        .enumerate()
        .map(|(i, p)| (format!("http://zst.test/{}", i), zstd::bulk::compress(p, 3).unwrap()))
        .collect();
    let refs: Vec<(&str, Vec<u8>)> = encoded.iter().map(|(u, d)| (u.as_str(), d.clone())).collect();
    let (file, records) = pack_records("crawl.warc.zst", &refs);

    let storage = Arc::new(MemoryStorage::new().with_file("crawl.warc.zst", file));
    let fetcher = RangeFetcher::new(storage.clone());
    let sample: SampleSet = records.iter().cloned().collect();
    let collection = ConcurrentCollector::new(3, FailurePolicy::Abort).collect(&fetcher, &sample).unwrap();

    for (i, page) in pages.iter().enumerate() {
        assert_eq!(&collection.payloads[&format!("http://zst.test/{}", i)], page);
    }
    assert_eq!(fetcher.dictionaries().fetch_count(), 1);
    assert_eq!(storage.header_reads(), 1);
    assert_eq!(fetcher.dictionaries().get("crawl.warc.zst").unwrap(), None);
}

#[test]
fn test_embedded_dictionary_is_fetched_once_under_concurrency() {
    let corpus: PayloadMap = synthetic_pages(200, 5)
        .into_iter()
        .enumerate()
        .map(|(i, p)| (format!("train/{}", i), p))
        .collect();
    let dictionary = train_dictionary(&corpus, &small_params()).unwrap();

    let pages = synthetic_pages(20, 99);
    let mut compressor = zstd::bulk::Compressor::with_dictionary(3, &dictionary).unwrap();
    let encoded: Vec<(String, Vec<u8>)> = pages
        .iter()
        .enumerate()
        .map(|(i, p)| (format!("http://dict.test/{}", i), compressor.compress(p).unwrap()))
        .collect();
    let refs: Vec<(&str, Vec<u8>)> = encoded.iter().map(|(u, d)| (u.as_str(), d.clone())).collect();

    let frame = write_skippable_frame(&dictionary).unwrap();
    let (body, records) = pack_records("dict.warc.zst", &refs);
    let mut file = frame.clone();
    file.extend_from_slice(&body);
    let records: Vec<IndexRecord> = records
        .into_iter()
        .map(|r| IndexRecord::new(&r.original_url, r.storage_offset + frame.len() as u64, r.storage_length, &r.storage_file))
        .collect();

    let storage = Arc::new(
        MemoryStorage::new()
            .with_file("dict.warc.zst", file)
            .with_delay(Duration::from_millis(5)),
    );
    let fetcher = RangeFetcher::new(storage.clone());
    let sample: SampleSet = records.into_iter().collect();
    let collection = ConcurrentCollector::new(8, FailurePolicy::Abort).collect(&fetcher, &sample).unwrap();

    assert_eq!(collection.payloads.len(), 20);
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(&collection.payloads[&format!("http://dict.test/{}", i)], page);
    }
    assert_eq!(fetcher.dictionaries().fetch_count(), 1);
    assert_eq!(storage.header_reads(), 1);
    // header + dictionary payload + one read per record
    assert_eq!(storage.range_reads(), 2 + 20);
}

#[test]
fn test_corrupt_dictionary_frame_is_a_format_error_and_not_cached() {
    let mut file = write_skippable_frame(b"definitely not a dictionary").unwrap();
    file.extend_from_slice(&zstd::bulk::compress(b"record", 3).unwrap());
    let storage: Arc<dyn ArchiveStorage> = Arc::new(MemoryStorage::new().with_file("bad.warc.zst", file));
    let cache = DictionaryCache::new(storage);

    assert!(matches!(cache.get("bad.warc.zst"), Err(TrainerError::Format(_))));
    assert!(matches!(cache.get("bad.warc.zst"), Err(TrainerError::Format(_))));
    assert_eq!(cache.fetch_count(), 2);
}

#[test]
fn test_unknown_extension_fails_before_any_read() {
    let storage = Arc::new(MemoryStorage::new().with_file("crawl.arc", vec![0; 64]));
    let fetcher = RangeFetcher::new(storage.clone());
    let err = fetcher.fetch(&IndexRecord::new("http://x.test/", 0, 10, "crawl.arc")).unwrap_err();
    assert!(matches!(err, TrainerError::Format(_)));
    assert_eq!(storage.range_reads(), 0);
}

#[test]
fn test_forced_redownload_reads_the_live_url() {
    let storage = Arc::new(
        MemoryStorage::new().with_direct("http://live.test/", b"fresh copy".to_vec()),
    );
    let fetcher = RangeFetcher::new(storage.clone());
    let record = IndexRecord::new("http://live.test/", 0, 10, "gone.warc.gz").with_redownload(true);
    assert_eq!(fetcher.fetch(&record).unwrap(), b"fresh copy");
    assert_eq!(storage.range_reads(), 0);
}

#[test]
fn test_failure_policies() {
    let good = b"<html>ok</html>".to_vec();
    let storage = Arc::new(MemoryStorage::new().with_file("a.warc", good.clone()));
    let fetcher = RangeFetcher::new(storage);
    let sample: SampleSet = [
        IndexRecord::new("http://ok.test/", 0, good.len() as u64, "a.warc"),
        IndexRecord::new("http://missing.test/", 0, 10, "missing.warc"),
    ]
    .into_iter()
    .collect();

    let aborted = ConcurrentCollector::new(2, FailurePolicy::Abort).collect(&fetcher, &sample);
    assert!(matches!(aborted, Err(TrainerError::Http { status: 404, .. })));

    let skipped = ConcurrentCollector::new(2, FailurePolicy::Skip).collect(&fetcher, &sample).unwrap();
    assert_eq!(skipped.payloads.len(), 1);
    assert_eq!(skipped.failures.len(), 1);
    assert_eq!(skipped.failures[0].url, "http://missing.test/");
}
