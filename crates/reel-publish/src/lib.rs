//! Social publishing for finished reels.
//!
//! This crate provides:
//! - A `PlatformApi` seam with Graph API transports for the page video feed
//!   and short-form reels
//! - A pure publish state machine plus an async driver with bounded polling,
//!   classified retry and cooperative shutdown
//! - A configurable table of transient platform error codes

pub mod api;
pub mod classify;
pub mod clock;
pub mod error;
pub mod graph;
pub mod machine;
pub mod metrics;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::{truncate_caption, PlatformApi, ProcessingStatus, Submission, MAX_CAPTION_CHARS};
pub use classify::TransientErrorTable;
pub use clock::{Clock, SystemClock};
pub use error::{PublishError, PublishResult};
pub use graph::{FeedVideoApi, GraphClient, GraphConfig, ShortFormApi};
pub use machine::{transition, Effect, Event, PublishPolicy, Publisher};
