//! archive_dict_trainer: zstd dictionaries trained on sampled web archive captures
//!
//! # Usage
//! See `src/bin/dict_trainer.rs` (scheduled service) and `src/bin/train_local.rs` (one-off runs).

pub mod error;
pub mod record;
pub mod index;
pub mod sampler;
pub mod frame;
pub mod storage;
pub mod dict_cache;
pub mod fetcher;
pub mod collector;
pub mod trainer;
pub mod evaluate;
pub mod publish;
pub mod upload;
pub mod catalog;
pub mod dashboard;
pub mod config;
pub mod pipeline;

pub use error::{Result, TrainerError};
pub use record::{IndexRecord, PayloadMap, SampleSet};
