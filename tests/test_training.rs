mod common;

use std::sync::Arc;

use archive_dict_trainer::collector::{ConcurrentCollector, FailurePolicy};
use archive_dict_trainer::dict_cache::DictionaryCache;
use archive_dict_trainer::evaluate::CompressionEvaluator;
use archive_dict_trainer::fetcher::RangeFetcher;
use archive_dict_trainer::frame::DICTIONARY_MAGIC;
use archive_dict_trainer::publish::{dump_to_file, serialize_dictionary, SerializeOptions};
use archive_dict_trainer::record::{IndexRecord, PayloadMap, SampleSet};
use archive_dict_trainer::storage::{ArchiveStorage, LocalArchiveStorage};
use archive_dict_trainer::trainer::{ArchiveCorpus, DictionaryTrainer, StaticCorpus, TrainingParams};
use tempfile::tempdir;

use common::{pack_records, synthetic_pages, MemoryStorage};

fn tiny_params() -> TrainingParams {
    TrainingParams { dict_size: 1024, k: 256, d: 8, level: 3, compress: false, skippable_frame: false }
}

fn corpus(count: usize, seed: u64) -> PayloadMap {
    synthetic_pages(count, seed)
        .into_iter()
        .enumerate()
        .map(|(i, p)| (format!("http://corpus.test/{}", i), p))
        .collect()
}

#[test]
fn test_small_dictionary_is_bounded_and_stable() {
    let data = corpus(40, 7);
    assert!(data.values().map(|p| p.len()).sum::<usize>() > 10_000);

    let mut first = DictionaryTrainer::new(SampleSet::new(), tiny_params(), StaticCorpus(data.clone()));
    let mut second = DictionaryTrainer::new(SampleSet::new(), tiny_params(), StaticCorpus(data));

    let dictionary = first.dictionary().unwrap();
    assert!(dictionary.len() <= 1024);
    assert_eq!(&dictionary[..4], &DICTIONARY_MAGIC);
    assert_eq!(first.sha256().unwrap(), second.sha256().unwrap());
    assert_eq!(first.sha256().unwrap().len(), 64);
}

#[test]
fn test_adding_a_record_invalidates_everything() {
    let mut trainer = DictionaryTrainer::new(SampleSet::new(), tiny_params(), StaticCorpus(corpus(40, 8)));
    let before = trainer.sha256().unwrap();
    assert!(trainer.is_computed());
    let generation = trainer.generation();

    trainer.add_url(IndexRecord::new("http://new.test/", 0, 10, "crawl.warc"));
    assert!(!trainer.is_computed());
    assert_eq!(trainer.generation(), generation + 1);
    assert_eq!(trainer.records().len(), 1);

    // Same static corpus, so the recomputed value matches.
    assert_eq!(trainer.sha256().unwrap(), before);
}

#[test]
fn test_hash_covers_the_published_form() {
    let data = corpus(40, 9);
    let mut plain = DictionaryTrainer::new(SampleSet::new(), tiny_params(), StaticCorpus(data.clone()));
    let framed_params = TrainingParams { compress: true, skippable_frame: true, ..tiny_params() };
    let mut framed = DictionaryTrainer::new(SampleSet::new(), framed_params, StaticCorpus(data));

    assert_eq!(plain.dictionary().unwrap(), framed.dictionary().unwrap());
    assert_ne!(plain.sha256().unwrap(), framed.sha256().unwrap());
    assert_eq!(plain.trained().unwrap().byte_size, plain.dict_size().unwrap());
}

#[test]
fn test_framed_output_reads_back_through_the_cache() {
    let mut trainer = DictionaryTrainer::new(SampleSet::new(), tiny_params(), StaticCorpus(corpus(40, 10)));
    let dictionary = trainer.dictionary().unwrap();
    let opts = SerializeOptions { compress: true, skippable_frame: true };
    let mut file = serialize_dictionary(&dictionary, opts).unwrap();
    file.extend_from_slice(&zstd::bulk::Compressor::with_dictionary(3, &dictionary).unwrap().compress(b"<html>hi</html>").unwrap());

    let storage: Arc<dyn ArchiveStorage> = Arc::new(MemoryStorage::new().with_file("own.warc.zst", file));
    let cache = DictionaryCache::new(storage);
    let loaded = cache.get("own.warc.zst").unwrap().unwrap();
    assert_eq!(loaded.as_slice(), dictionary.as_slice());
}

#[test]
fn test_train_from_local_storage_and_evaluate() {
    let dir = tempdir().unwrap();
    let pages = synthetic_pages(60, 21);
    let encoded: Vec<(String, Vec<u8>)> =
        pages.iter().enumerate().map(|(i, p)| (format!("http://local.test/{}", i), p.clone())).collect();
    let refs: Vec<(&str, Vec<u8>)> = encoded.iter().map(|(u, d)| (u.as_str(), d.clone())).collect();
    let (file, records) = pack_records("crawl.warc", &refs);
    std::fs::write(dir.path().join("crawl.warc"), &file).unwrap();

    let storage: Arc<dyn ArchiveStorage> = Arc::new(LocalArchiveStorage::new(dir.path()));
    let source = ArchiveCorpus::new(RangeFetcher::new(storage), ConcurrentCollector::new(4, FailurePolicy::Abort));
    let mut trainer = DictionaryTrainer::new(records.into_iter().collect(), tiny_params(), source);

    let fetched = trainer.corpus().unwrap();
    assert_eq!(fetched.len(), 60);
    assert_eq!(fetched["http://local.test/0"], pages[0]);

    let report = trainer.evaluate(&CompressionEvaluator::default()).unwrap();
    assert_eq!(report.single.len(), 60);
    assert_eq!(report.sum.original, file.len());
    assert!(report.sum.zstd_dict < report.sum.original);
    assert!(report.sum.gzip.is_some());

    let out = dir.path().join("out.zstdict");
    let written = dump_to_file(&trainer.dictionary().unwrap(), trainer.params().serialize_options(), &out).unwrap();
    assert_eq!(std::fs::read(&out).unwrap().len(), written);
}

#[test]
fn test_scheduled_params_train_a_one_kib_dictionary() {
    let params = TrainingParams { dict_size: 1024, ..TrainingParams::scheduled() };
    let mut trainer = DictionaryTrainer::new(SampleSet::new(), params, StaticCorpus(corpus(40, 12)));
    let dictionary = trainer.dictionary().unwrap();
    assert!(dictionary.len() <= 1024);
    assert_eq!(&dictionary[..4], &DICTIONARY_MAGIC);
}

#[test]
fn test_added_records_change_corpus_and_hash() {
    let pages = synthetic_pages(60, 31);
    let encoded: Vec<(String, Vec<u8>)> =
        pages.iter().enumerate().map(|(i, p)| (format!("http://grow.test/{}", i), p.clone())).collect();
    let refs: Vec<(&str, Vec<u8>)> = encoded.iter().map(|(u, d)| (u.as_str(), d.clone())).collect();
    let (file, records) = pack_records("grow.warc", &refs);

    let storage = Arc::new(MemoryStorage::new().with_file("grow.warc", file));
    let source = ArchiveCorpus::new(RangeFetcher::new(storage), ConcurrentCollector::new(4, FailurePolicy::Abort));
    let (first, rest) = records.split_at(30);
    let mut trainer = DictionaryTrainer::new(first.iter().cloned().collect(), tiny_params(), source);

    let before = trainer.sha256().unwrap();
    assert_eq!(trainer.corpus().unwrap().len(), 30);

    for record in rest {
        trainer.add_url(record.clone());
    }
    assert!(!trainer.is_computed());
    let after = trainer.sha256().unwrap();
    assert_ne!(before, after);
    assert_eq!(trainer.corpus().unwrap().len(), 60);
    assert_eq!(trainer.records().len(), 60);
}
