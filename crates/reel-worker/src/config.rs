//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reel_models::{EncodingConfig, Platform, RenderSpec};

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Parse a comma-separated platform list; unknown names are skipped.
pub fn parse_platforms(raw: &str) -> Vec<Platform> {
    let mut platforms = Vec::new();
    for name in raw.split(',').map(|s| s.trim().to_lowercase()) {
        let platform = match name.as_str() {
            "feed_video" | "feed" | "facebook" => Platform::FeedVideo,
            "short_form" | "reels" | "instagram" => Platform::ShortForm,
            _ => continue,
        };
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    platforms
}

/// Card assets and video settings.
#[derive(Debug, Clone)]
pub struct CardConfig {
    /// Font used for the headline box
    pub headline_font: PathBuf,
    /// Font used for the category bar and signature
    pub label_font: PathBuf,
    /// Optional brand mark PNG
    pub overlay_path: Option<PathBuf>,
    /// Optional background track
    pub audio_path: Option<PathBuf>,
    /// Override for the signature line
    pub signature: Option<String>,
    pub video_seconds: u32,
    pub fps: u32,
    /// JPEG quality of the intermediate still
    pub jpeg_quality: u8,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            headline_font: PathBuf::from("assets/fonts/Roboto-Black.ttf"),
            label_font: PathBuf::from("assets/fonts/Anton-Regular.ttf"),
            overlay_path: None,
            audio_path: None,
            signature: None,
            video_seconds: reel_models::encoding::DEFAULT_VIDEO_SECONDS,
            fps: reel_models::encoding::DEFAULT_FPS,
            jpeg_quality: reel_models::encoding::DEFAULT_STILL_QUALITY,
        }
    }
}

impl CardConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            headline_font: env_path("CARD_HEADLINE_FONT").unwrap_or(defaults.headline_font),
            label_font: env_path("CARD_LABEL_FONT").unwrap_or(defaults.label_font),
            overlay_path: env_path("CARD_OVERLAY_PATH"),
            audio_path: env_path("CARD_AUDIO_PATH"),
            signature: std::env::var("CARD_SIGNATURE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            video_seconds: env_or("CARD_VIDEO_SECONDS", defaults.video_seconds).max(1),
            fps: env_or("CARD_VIDEO_FPS", defaults.fps).max(1),
            jpeg_quality: env_or("CARD_JPEG_QUALITY", defaults.jpeg_quality).clamp(1, 100),
        }
    }

    /// Card layout with the configured signature applied.
    pub fn render_spec(&self) -> RenderSpec {
        let spec = RenderSpec::reel_card();
        match &self.signature {
            Some(signature) => spec.with_signature(signature.clone()),
            None => spec,
        }
    }

    pub fn encoding(&self) -> EncodingConfig {
        EncodingConfig::default()
            .with_seconds(self.video_seconds)
            .with_fps(self.fps)
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory for intermediate stills and videos
    pub work_dir: PathBuf,
    /// Append-only record of published items
    pub ledger_path: PathBuf,
    /// Items processed at once
    pub max_concurrent_items: usize,
    /// Concurrent FFmpeg processes
    pub max_encoder_processes: usize,
    /// Platform publish jobs run at once for one item
    pub max_publish_parallel: usize,
    /// Pause after each processed item
    pub item_pause: Duration,
    /// Sleep between fetch cycles
    pub cycle_interval: Duration,
    /// Run a single cycle and exit
    pub run_once: bool,
    /// Platforms that must all succeed before an item is marked done
    pub required_platforms: Vec<Platform>,
    /// Keep intermediate files after a successful upload
    pub keep_artifacts: bool,
    /// Encoder wall-clock limit
    pub encode_timeout: Duration,
    /// Hashtag line appended to captions
    pub caption_hashtags: String,
    pub card: CardConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/reels"),
            ledger_path: PathBuf::from("data/published.ledger"),
            max_concurrent_items: 1,
            max_encoder_processes: 1,
            max_publish_parallel: 2,
            item_pause: Duration::from_secs(2),
            cycle_interval: Duration::from_secs(300),
            run_once: false,
            required_platforms: Platform::ALL.to_vec(),
            keep_artifacts: false,
            encode_timeout: Duration::from_secs(300),
            caption_hashtags: String::new(),
            card: CardConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: env_path("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            ledger_path: env_path("WORKER_LEDGER_PATH").unwrap_or(defaults.ledger_path),
            max_concurrent_items: env_or("WORKER_MAX_ITEMS", defaults.max_concurrent_items).max(1),
            max_encoder_processes: env_or("WORKER_MAX_FFMPEG", defaults.max_encoder_processes)
                .max(1),
            max_publish_parallel: env_or(
                "WORKER_MAX_PUBLISH_PARALLEL",
                defaults.max_publish_parallel,
            )
            .max(1),
            item_pause: Duration::from_secs(env_or("WORKER_ITEM_PAUSE_SECS", 2)),
            cycle_interval: Duration::from_secs(env_or("WORKER_CYCLE_INTERVAL_SECS", 300)),
            run_once: env_flag("WORKER_RUN_ONCE"),
            required_platforms: std::env::var("WORKER_REQUIRED_PLATFORMS")
                .map(|raw| parse_platforms(&raw))
                .unwrap_or(defaults.required_platforms),
            keep_artifacts: env_flag("WORKER_KEEP_ARTIFACTS"),
            encode_timeout: Duration::from_secs(env_or("WORKER_ENCODE_TIMEOUT_SECS", 300)),
            caption_hashtags: std::env::var("WORKER_CAPTION_HASHTAGS").unwrap_or_default(),
            card: CardConfig::from_env(),
        }
    }

    /// Check if `platform` gates the ledger mark.
    pub fn is_required(&self, platform: Platform) -> bool {
        self.required_platforms.contains(&platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "WORKER_WORK_DIR",
        "WORKER_MAX_ITEMS",
        "WORKER_MAX_FFMPEG",
        "WORKER_RUN_ONCE",
        "WORKER_REQUIRED_PLATFORMS",
        "WORKER_ITEM_PAUSE_SECS",
        "CARD_VIDEO_SECONDS",
        "CARD_SIGNATURE",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear();
        let config = WorkerConfig::from_env();
        assert_eq!(config.max_concurrent_items, 1);
        assert_eq!(config.max_publish_parallel, 2);
        assert_eq!(config.item_pause, Duration::from_secs(2));
        assert_eq!(config.cycle_interval, Duration::from_secs(300));
        assert!(!config.run_once);
        assert_eq!(config.required_platforms, Platform::ALL.to_vec());
        assert_eq!(config.card.video_seconds, 10);
    }

    #[test]
    #[serial]
    fn test_env_overrides_and_bad_numbers() {
        clear();
        std::env::set_var("WORKER_WORK_DIR", "/var/tmp/cards");
        std::env::set_var("WORKER_MAX_ITEMS", "not-a-number");
        std::env::set_var("WORKER_MAX_FFMPEG", "0");
        std::env::set_var("WORKER_RUN_ONCE", "true");
        std::env::set_var("WORKER_REQUIRED_PLATFORMS", "short_form");
        std::env::set_var("CARD_VIDEO_SECONDS", "6");
        std::env::set_var("CARD_SIGNATURE", "@ilhabela");

        let config = WorkerConfig::from_env();
        clear();

        assert_eq!(config.work_dir, PathBuf::from("/var/tmp/cards"));
        assert_eq!(config.max_concurrent_items, 1);
        assert_eq!(config.max_encoder_processes, 1);
        assert!(config.run_once);
        assert!(config.is_required(Platform::ShortForm));
        assert!(!config.is_required(Platform::FeedVideo));
        assert_eq!(config.card.encoding().seconds, 6);
        assert_eq!(config.card.render_spec().signature, "@ilhabela");
    }

    #[test]
    fn test_parse_platforms() {
        assert_eq!(
            parse_platforms("reels, feed_video ,reels,bogus"),
            vec![Platform::ShortForm, Platform::FeedVideo]
        );
        assert!(parse_platforms("").is_empty());
    }
}
