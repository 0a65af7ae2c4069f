//! Asset pipeline: photo, card, video, hosted URL.
//!
//! Strictly sequential per item. Compositing runs on the blocking pool and
//! encoder processes are capped by a semaphore shared across items.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use reel_media::{CardCompositor, MediaError, VideoEncoder};
use reel_models::{ContentItem, ItemId};
use reel_storage::{AssetStore, StorageError};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::ItemLogger;
use crate::retry::{retry_async, RetryConfig};
use crate::source::PhotoFetcher;

/// Turns a content item into a publicly hosted video.
pub struct AssetPipeline {
    compositor: Arc<CardCompositor>,
    encoder: Arc<dyn VideoEncoder>,
    store: Arc<dyn AssetStore>,
    photos: Arc<dyn PhotoFetcher>,
    encoder_slots: Arc<Semaphore>,
    work_dir: PathBuf,
    jpeg_quality: u8,
    keep_artifacts: bool,
    upload_retry: RetryConfig,
}

impl AssetPipeline {
    pub fn new(
        config: &WorkerConfig,
        compositor: Arc<CardCompositor>,
        encoder: Arc<dyn VideoEncoder>,
        store: Arc<dyn AssetStore>,
        photos: Arc<dyn PhotoFetcher>,
    ) -> Self {
        Self {
            compositor,
            encoder,
            store,
            photos,
            encoder_slots: Arc::new(Semaphore::new(config.max_encoder_processes.max(1))),
            work_dir: config.work_dir.clone(),
            jpeg_quality: config.card.jpeg_quality,
            keep_artifacts: config.keep_artifacts,
            upload_retry: RetryConfig::new("r2_upload"),
        }
    }

    pub fn with_upload_retry(mut self, retry: RetryConfig) -> Self {
        self.upload_retry = retry;
        self
    }

    pub fn still_path(&self, item_id: &ItemId) -> PathBuf {
        self.work_dir.join(format!("card_{}.jpg", item_id))
    }

    pub fn video_path(&self, item_id: &ItemId) -> PathBuf {
        self.work_dir.join(format!("reel_{}.mp4", item_id))
    }

    /// Compose, encode and upload `item`, returning the hosted video URL.
    ///
    /// Intermediate files are removed on every exit path unless
    /// `keep_artifacts` is set.
    pub async fn build(&self, item: &ContentItem) -> WorkerResult<String> {
        item.validate()?;
        let logger = ItemLogger::new(&item.id, "build");
        logger.log_start(&item.headline);

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let still = self.still_path(&item.id);
        let video = self.video_path(&item.id);

        let result = self.produce(item, &still, &video, &logger).await;

        if !self.keep_artifacts {
            for path in [&still, &video] {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        logger.log_warning(&format!("could not remove {}: {}", path.display(), e))
                    }
                }
            }
        }

        if let Ok(url) = &result {
            logger.log_completion(url);
        }
        result
    }

    async fn produce(
        &self,
        item: &ContentItem,
        still: &Path,
        video: &Path,
        logger: &ItemLogger,
    ) -> WorkerResult<String> {
        let photo = self.fetch_photo(item, logger).await;
        self.compose(item, photo, still.to_path_buf()).await?;
        logger.log_progress("card rendered");

        {
            let _permit = self
                .encoder_slots
                .acquire()
                .await
                .map_err(|_| WorkerError::Cancelled)?;
            self.encoder
                .encode(still, video)
                .await
                .map_err(WorkerError::Encode)?;
        }
        logger.log_progress("video encoded");

        let url = retry_async(&self.upload_retry, StorageError::is_retryable, || {
            self.store.put_reel(&item.id, video)
        })
        .await?;
        Ok(url)
    }

    /// Best effort: any failure falls back to the placeholder.
    async fn fetch_photo(&self, item: &ContentItem, logger: &ItemLogger) -> Option<Vec<u8>> {
        let url = match item.usable_image_url() {
            Some(url) => url,
            None => {
                if item.image_url.is_some() {
                    logger.log_warning("image URL is not usable, using placeholder");
                }
                return None;
            }
        };

        match self.photos.fetch(url).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                logger.log_warning("photo download was empty, using placeholder");
                None
            }
            Err(e) => {
                logger.log_warning(&format!("photo download failed, using placeholder: {e}"));
                None
            }
        }
    }

    async fn compose(
        &self,
        item: &ContentItem,
        photo: Option<Vec<u8>>,
        still: PathBuf,
    ) -> WorkerResult<()> {
        let compositor = Arc::clone(&self.compositor);
        let item = item.clone();
        let quality = self.jpeg_quality;

        tokio::task::spawn_blocking(move || {
            let category = item.category_or(&compositor.spec().default_category);
            let asset = compositor.compose(&item.id, photo.as_deref(), category, &item.headline)?;
            asset.save_jpeg(&still, quality)
        })
        .await
        .map_err(|e| WorkerError::Render(MediaError::internal(format!("compose task failed: {e}"))))?
        .map_err(WorkerError::Render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    use reel_media::testing::FixedAdvancePainter;
    use reel_media::MediaResult;
    use reel_models::RenderSpec;
    use reel_storage::StorageResult;

    use crate::error::{SourceError, SourceResult};

    struct CopyEncoder;

    #[async_trait]
    impl VideoEncoder for CopyEncoder {
        async fn encode(&self, still: &Path, output: &Path) -> MediaResult<()> {
            tokio::fs::copy(still, output).await?;
            Ok(())
        }
    }

    struct FailingEncoder;

    #[async_trait]
    impl VideoEncoder for FailingEncoder {
        async fn encode(&self, _still: &Path, output: &Path) -> MediaResult<()> {
            // Leaves a truncated output behind, as a killed ffmpeg would
            tokio::fs::write(output, b"partial").await?;
            Err(MediaError::ffmpeg_failed("boom", None, Some(1)))
        }
    }

    #[derive(Default)]
    struct FlakyStore {
        failures_left: AtomicU32,
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AssetStore for FlakyStore {
        async fn put_reel(&self, item_id: &ItemId, path: &Path) -> StorageResult<String> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::upload_failed("connection reset"));
            }
            assert!(path.is_file());
            self.uploads.lock().unwrap().push(item_id.to_string());
            Ok(format!("https://media.example.com/auto_reels/reel_{item_id}.mp4"))
        }
    }

    struct NoPhotos;

    #[async_trait]
    impl PhotoFetcher for NoPhotos {
        async fn fetch(&self, url: &str) -> SourceResult<Vec<u8>> {
            Err(SourceError::Status {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    fn pipeline(
        dir: &TempDir,
        encoder: Arc<dyn VideoEncoder>,
        store: Arc<FlakyStore>,
        keep_artifacts: bool,
    ) -> AssetPipeline {
        let config = WorkerConfig {
            work_dir: dir.path().join("work"),
            keep_artifacts,
            ..WorkerConfig::default()
        };
        let compositor = CardCompositor::new(
            RenderSpec::reel_card(),
            Arc::new(FixedAdvancePainter::default()),
            None,
        )
        .unwrap();
        AssetPipeline::new(&config, Arc::new(compositor), encoder, store, Arc::new(NoPhotos))
            .with_upload_retry(RetryConfig::new("test").with_base_delay(Duration::from_millis(1)))
    }

    fn item() -> ContentItem {
        ContentItem::new(42u64, "Balsa volta a operar normalmente")
            .with_image_url("https://site.example/missing.jpg")
    }

    #[tokio::test]
    async fn test_build_uploads_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlakyStore::default());
        let pipeline = pipeline(&dir, Arc::new(CopyEncoder), store.clone(), false);

        let url = pipeline.build(&item()).await.unwrap();

        assert_eq!(url, "https://media.example.com/auto_reels/reel_42.mp4");
        assert_eq!(*store.uploads.lock().unwrap(), vec!["42".to_string()]);
        assert!(!pipeline.still_path(&ItemId::from(42u64)).exists());
        assert!(!pipeline.video_path(&ItemId::from(42u64)).exists());
    }

    #[tokio::test]
    async fn test_keep_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlakyStore::default());
        let pipeline = pipeline(&dir, Arc::new(CopyEncoder), store, true);

        pipeline.build(&item()).await.unwrap();

        let still = pipeline.still_path(&ItemId::from(42u64));
        assert!(still.is_file());
        let card = image::open(&still).unwrap();
        assert_eq!((card.width(), card.height()), (1080, 1920));
    }

    #[tokio::test]
    async fn test_upload_retried() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlakyStore {
            failures_left: AtomicU32::new(2),
            ..FlakyStore::default()
        });
        let pipeline = pipeline(&dir, Arc::new(CopyEncoder), store.clone(), false);

        pipeline.build(&item()).await.unwrap();
        assert_eq!(store.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_encode_failure_stops_before_upload() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlakyStore::default());
        let pipeline = pipeline(&dir, Arc::new(FailingEncoder), store.clone(), false);

        let err = pipeline.build(&item()).await.unwrap_err();
        assert_eq!(err.stage(), "encode");
        assert!(store.uploads.lock().unwrap().is_empty());
        assert!(!pipeline.still_path(&ItemId::from(42u64)).exists());
        assert!(!pipeline.video_path(&ItemId::from(42u64)).exists());
    }

    #[tokio::test]
    async fn test_failed_upload_cleans_up() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlakyStore {
            failures_left: AtomicU32::new(100),
            ..FlakyStore::default()
        });
        let pipeline = pipeline(&dir, Arc::new(CopyEncoder), store.clone(), false);

        let err = pipeline.build(&item()).await.unwrap_err();
        assert_eq!(err.stage(), "upload");
        assert!(!pipeline.still_path(&ItemId::from(42u64)).exists());
        assert!(!pipeline.video_path(&ItemId::from(42u64)).exists());
    }

    #[tokio::test]
    async fn test_failure_keeps_artifacts_when_asked() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, Arc::new(FailingEncoder), Arc::new(FlakyStore::default()), true);

        pipeline.build(&item()).await.unwrap_err();
        assert!(pipeline.still_path(&ItemId::from(42u64)).is_file());
    }

    #[tokio::test]
    async fn test_invalid_item_rejected() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, Arc::new(CopyEncoder), Arc::new(FlakyStore::default()), false);

        let err = pipeline.build(&ContentItem::new(1u64, "  ")).await.unwrap_err();
        assert_eq!(err.stage(), "input");
    }
}
