//! Still-to-video encoding.
//!
//! A composed card is looped for a fixed duration and muxed with either a
//! background track or generated silence, since some platforms reject
//! videos without an audio stream.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use reel_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Silent stereo source used when no audio track is configured.
pub const SILENT_AUDIO_SOURCE: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

/// Histogram of encode wall time.
pub const ENCODE_DURATION_SECONDS: &str = "reel_encode_duration_seconds";

/// Turns a still image into a video file.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    async fn encode(&self, still: &Path, output: &Path) -> MediaResult<()>;
}

/// FFmpeg-backed encoder.
pub struct StillEncoder {
    config: EncodingConfig,
    audio: Option<PathBuf>,
    binary: PathBuf,
    timeout_secs: Option<u64>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl StillEncoder {
    pub fn new(config: EncodingConfig) -> Self {
        Self {
            config,
            audio: None,
            binary: PathBuf::from("ffmpeg"),
            timeout_secs: None,
            cancel_rx: None,
        }
    }

    /// Loop this track under the video instead of silence.
    pub fn with_audio(mut self, audio: Option<PathBuf>) -> Self {
        self.audio = audio;
        self
    }

    /// Use a specific ffmpeg executable.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn config(&self) -> &EncodingConfig {
        &self.config
    }

    /// Audio track to use, if configured and present on disk.
    fn usable_audio(&self) -> Option<&Path> {
        let audio = self.audio.as_deref()?;
        if audio.is_file() {
            Some(audio)
        } else {
            warn!(path = %audio.display(), "Audio track not found, encoding with silence");
            None
        }
    }

    /// Build the ffmpeg invocation for one still.
    pub fn build_command(&self, still: &Path, output: &Path) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(output).input_with(["-loop", "1"], still.to_string_lossy());

        let cmd = match self.usable_audio() {
            Some(audio) => cmd.input_with(["-stream_loop", "-1"], audio.to_string_lossy()),
            None => cmd.input_with(["-f", "lavfi"], SILENT_AUDIO_SOURCE),
        };

        cmd.output_args(self.config.to_ffmpeg_args())
    }

    fn runner(&self) -> FfmpegRunner {
        let mut runner = FfmpegRunner::new().with_binary(&self.binary);
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        if let Some(rx) = &self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }
        runner
    }
}

#[async_trait]
impl VideoEncoder for StillEncoder {
    async fn encode(&self, still: &Path, output: &Path) -> MediaResult<()> {
        if !still.is_file() {
            return Err(MediaError::FileNotFound(still.to_path_buf()));
        }

        let cmd = self.build_command(still, output);
        let total_ms = i64::from(self.config.seconds) * 1000;
        let started = Instant::now();

        self.runner()
            .run_with_progress(&cmd, move |p| {
                debug!(percent = p.percentage(total_ms), speed = p.speed, "Encoding");
            })
            .await?;

        let elapsed = started.elapsed().as_secs_f64();
        metrics::histogram!(ENCODE_DURATION_SECONDS).record(elapsed);

        let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg produced an empty output file",
                None,
                None,
            ));
        }

        info!(
            output = %output.display(),
            bytes = size,
            elapsed_secs = elapsed,
            "Encoded video"
        );
        Ok(())
    }
}
