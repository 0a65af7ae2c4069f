//! Shared data models for the AutoReels publisher.
//!
//! This crate provides Serde-serializable types for:
//! - Content items and their identifiers
//! - The fixed card layout (`RenderSpec`)
//! - Publish jobs, their states and terminal results
//! - Still-to-video encoding configuration

pub mod content;
pub mod encoding;
pub mod error;
pub mod job;
pub mod layout;

// Re-export common types
pub use content::{ContentItem, ItemId, DEFAULT_CATEGORY};
pub use encoding::EncodingConfig;
pub use error::{InputError, InputResult, LayoutError, LayoutResult};
pub use job::{FailureKind, JobResult, JobState, Platform, PublishFailure, PublishJob};
pub use layout::{OverlayAnchor, Rect, Region, RegionRole, RenderSpec, Rgb8, TextStyle};
