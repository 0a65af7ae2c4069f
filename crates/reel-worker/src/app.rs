//! Production wiring of the runner.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use reel_media::{CardCompositor, FontBook, StillEncoder};
use reel_models::layout::{HEADLINE_FAMILY, LABEL_FAMILY};
use reel_publish::{
    Clock, FeedVideoApi, GraphClient, GraphConfig, PlatformApi, PublishPolicy, Publisher,
    ShortFormApi, SystemClock, TransientErrorTable,
};
use reel_storage::R2Client;

use crate::config::{CardConfig, WorkerConfig};
use crate::coordinator::AssetPipeline;
use crate::error::{WorkerError, WorkerResult};
use crate::ledger::Ledger;
use crate::runner::Runner;
use crate::source::{HttpPhotoFetcher, SourceConfig, WordPressSource};

const PHOTO_TIMEOUT: Duration = Duration::from_secs(30);

/// Load the card fonts from disk.
pub fn load_fonts(card: &CardConfig) -> WorkerResult<FontBook> {
    let fonts = FontBook::new();
    fonts
        .register_file(HEADLINE_FAMILY, &card.headline_font)
        .map_err(WorkerError::Render)?;
    fonts
        .register_file(LABEL_FAMILY, &card.label_font)
        .map_err(WorkerError::Render)?;
    Ok(fonts)
}

/// One publisher per platform with an account id in `graph`.
pub fn build_publishers(graph: GraphConfig) -> WorkerResult<Vec<Publisher>> {
    let has_page = graph.page_id.is_some();
    let has_account = graph.instagram_id.is_some();
    let client = GraphClient::new(graph)?;

    let mut apis: Vec<Arc<dyn PlatformApi>> = Vec::new();
    if has_page {
        apis.push(Arc::new(FeedVideoApi::from_client(client.clone())?));
    }
    if has_account {
        apis.push(Arc::new(ShortFormApi::from_client(client)?));
    }
    if apis.is_empty() {
        return Err(WorkerError::config_error(
            "neither FACEBOOK_PAGE_ID nor INSTAGRAM_ID is set",
        ));
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let policy = PublishPolicy::from_env();
    let table = TransientErrorTable::from_env();
    Ok(apis
        .into_iter()
        .map(|api| Publisher::new(api, Arc::clone(&clock), policy.clone(), table.clone()))
        .collect())
}

/// Build a runner backed by WordPress, ffmpeg, R2 and the Graph API.
pub async fn build_runner(
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> WorkerResult<Runner> {
    let fonts = load_fonts(&config.card)?;
    let overlay = match &config.card.overlay_path {
        Some(path) => match CardCompositor::load_overlay(path) {
            Ok(mark) => Some(mark),
            Err(e) => {
                warn!(path = %path.display(), "Overlay not loaded, rendering without it: {}", e);
                None
            }
        },
        None => None,
    };
    let compositor = CardCompositor::new(config.card.render_spec(), Arc::new(fonts), overlay)
        .map_err(WorkerError::Render)?;

    let encoder = StillEncoder::new(config.card.encoding())
        .with_audio(config.card.audio_path.clone())
        .with_timeout(config.encode_timeout.as_secs())
        .with_cancel(shutdown.clone());

    let store = R2Client::from_env()
        .await
        .map_err(|e| WorkerError::config_error(format!("storage: {e}")))?;
    let photos = HttpPhotoFetcher::new(PHOTO_TIMEOUT)?;

    let pipeline = AssetPipeline::new(
        &config,
        Arc::new(compositor),
        Arc::new(encoder),
        Arc::new(store),
        Arc::new(photos),
    );

    let publishers = build_publishers(GraphConfig::from_env()?)?;
    let ledger = Ledger::open(&config.ledger_path).await?;
    let source = WordPressSource::new(SourceConfig::from_env()?)?;

    info!(
        work_dir = %config.work_dir.display(),
        ledger = %ledger.path().display(),
        "Runner wired"
    );

    Ok(Runner::new(
        config,
        Arc::new(source),
        Arc::new(pipeline),
        publishers,
        Arc::new(ledger),
        shutdown,
    ))
}
