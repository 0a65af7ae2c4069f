#![deny(unreachable_patterns)]
//! Card rendering and video encoding.
//!
//! This crate provides:
//! - Largest-fit text layout over a pluggable measurer
//! - Font shaping and rasterization backed by parley and vello_cpu
//! - Fixed-layout card compositing (cover-fit photo, overlay, text regions)
//! - Type-safe FFmpeg command building with progress and cancellation
//! - Still-to-video encoding with optional background audio

pub mod command;
pub mod compositor;
pub mod encode;
pub mod error;
pub mod fonts;
pub mod progress;
pub mod typeset;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use compositor::{cover_fit, render_card, CardCompositor, ComposedAsset};
pub use encode::{StillEncoder, VideoEncoder};
pub use error::{MediaError, MediaResult};
pub use fonts::FontBook;
pub use progress::FfmpegProgress;
pub use typeset::{fit, FitRequest, FittedText, SizeRange, TextMeasure, TextPainter, VerticalMetrics};
