//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - Reel upload to an R2 bucket
//! - Public URL construction for uploaded objects
//! - The `AssetStore` seam used by the pipeline

pub mod client;
pub mod error;

pub use client::{public_url, reel_key, AssetStore, R2Client, R2Config, DEFAULT_KEY_PREFIX, VIDEO_CONTENT_TYPE};
pub use error::{StorageError, StorageResult};
