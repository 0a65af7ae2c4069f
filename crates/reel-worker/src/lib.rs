//! Auto reels worker.
//!
//! This crate provides:
//! - Content source (WordPress) and photo download
//! - Asset pipeline: card, video, hosted URL
//! - Per-platform publishing joined per item
//! - Dedup ledger
//! - Fetch cycle loop with graceful shutdown

pub mod app;
pub mod caption;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod runner;
pub mod source;

pub use caption::build_caption;
pub use config::{CardConfig, WorkerConfig};
pub use coordinator::AssetPipeline;
pub use error::{SourceError, SourceResult, WorkerError, WorkerResult};
pub use ledger::Ledger;
pub use logging::ItemLogger;
pub use runner::{CycleSummary, ItemOutcome, ItemReport, PlatformReport, Runner};
pub use source::{ContentSource, HttpPhotoFetcher, PhotoFetcher, SourceConfig, WordPressSource};
