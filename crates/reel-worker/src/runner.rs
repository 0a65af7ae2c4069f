//! Fetch cycles and per-item orchestration.
//!
//! Each item runs the asset pipeline once, then one publish machine per
//! platform still pending. Platform completions are recorded as they happen;
//! the item itself is marked only when every required platform succeeded.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use reel_models::{ContentItem, ItemId, JobState, Platform, PublishJob};
use reel_publish::Publisher;

use crate::caption::build_caption;
use crate::config::WorkerConfig;
use crate::coordinator::AssetPipeline;
use crate::error::WorkerResult;
use crate::ledger::Ledger;
use crate::logging::ItemLogger;
use crate::metrics::{record_cycle_failure, record_item};
use crate::source::ContentSource;

/// How an item ended up after one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Already in the ledger.
    AlreadyDone,
    /// Every platform succeeded.
    Published,
    /// Required platforms succeeded, an optional one did not.
    PublishedPartial,
    /// Invalid, failed to build, or a required platform failed.
    Failed,
    /// Shutdown interrupted the item before it could be marked.
    Cancelled,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::AlreadyDone => "already_done",
            ItemOutcome::Published => "published",
            ItemOutcome::PublishedPartial => "published_partial",
            ItemOutcome::Failed => "failed",
            ItemOutcome::Cancelled => "cancelled",
        }
    }

    /// Whether the item did pipeline or publish work worth pausing after.
    fn did_work(&self) -> bool {
        !matches!(self, ItemOutcome::AlreadyDone | ItemOutcome::Cancelled)
    }
}

/// Per-platform part of an item report.
#[derive(Debug, Clone)]
pub struct PlatformReport {
    pub platform: Platform,
    pub required: bool,
    /// `None` when a previous run already published to this platform.
    pub job: Option<PublishJob>,
}

impl PlatformReport {
    pub fn succeeded(&self) -> bool {
        self.job.as_ref().map_or(true, |job| job.state.is_success())
    }

    fn cancelled(&self) -> bool {
        self.job
            .as_ref()
            .is_some_and(|job| job.state == JobState::Cancelled)
    }
}

/// Result of processing one item.
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub item_id: ItemId,
    pub outcome: ItemOutcome,
    pub video_url: Option<String>,
    pub platforms: Vec<PlatformReport>,
    pub error: Option<String>,
}

impl ItemReport {
    fn new(item_id: ItemId, outcome: ItemOutcome) -> Self {
        Self {
            item_id,
            outcome,
            video_url: None,
            platforms: Vec::new(),
            error: None,
        }
    }

    pub fn platform(&self, platform: Platform) -> Option<&PlatformReport> {
        self.platforms.iter().find(|p| p.platform == platform)
    }
}

/// Counts for one fetch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub fetched: usize,
    pub already_done: usize,
    pub published: usize,
    pub partial: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl CycleSummary {
    fn add(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::AlreadyDone => self.already_done += 1,
            ItemOutcome::Published => self.published += 1,
            ItemOutcome::PublishedPartial => self.partial += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Drives fetch cycles until shutdown.
pub struct Runner {
    config: WorkerConfig,
    source: Arc<dyn ContentSource>,
    pipeline: Arc<AssetPipeline>,
    publishers: Vec<Publisher>,
    ledger: Arc<Ledger>,
    publish_slots: Arc<Semaphore>,
    default_category: String,
    shutdown: watch::Receiver<bool>,
}

impl Runner {
    pub fn new(
        config: WorkerConfig,
        source: Arc<dyn ContentSource>,
        pipeline: Arc<AssetPipeline>,
        publishers: Vec<Publisher>,
        ledger: Arc<Ledger>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        for platform in &config.required_platforms {
            if !publishers.iter().any(|p| p.platform() == *platform) {
                warn!(
                    platform = %platform,
                    "Required platform has no publisher configured, it will not gate the ledger"
                );
            }
        }

        Self {
            publish_slots: Arc::new(Semaphore::new(config.max_publish_parallel.max(1))),
            default_category: config.card.render_spec().default_category,
            config,
            source,
            pipeline,
            publishers,
            ledger,
            shutdown,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run cycles until shutdown, or once when `run_once` is set.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            platforms = ?self.publishers.iter().map(Publisher::platform).collect::<Vec<_>>(),
            cycle_interval_secs = self.config.cycle_interval.as_secs(),
            run_once = self.config.run_once,
            "Runner started"
        );

        loop {
            if let Err(e) = self.run_once().await {
                error!(
                    stage = e.stage(),
                    retryable = e.is_retryable(),
                    "Cycle failed: {}", e
                );
                record_cycle_failure();
            }

            if self.config.run_once || self.is_shutting_down() {
                break;
            }
            if self.pause(self.config.cycle_interval).await {
                break;
            }
        }

        info!("Runner stopped");
        Ok(())
    }

    /// Fetch the latest items and process each of them.
    pub async fn run_once(&self) -> WorkerResult<CycleSummary> {
        let items = self.source.latest().await?;
        info!(count = items.len(), "Fetched content items");

        let reports: Vec<ItemReport> = stream::iter(items.iter())
            .map(|item| async move {
                let report = self.process_item(item).await;
                if report.outcome.did_work() {
                    self.pause(self.config.item_pause).await;
                }
                report
            })
            .buffer_unordered(self.config.max_concurrent_items.max(1))
            .collect()
            .await;

        let mut summary = CycleSummary {
            fetched: items.len(),
            ..CycleSummary::default()
        };
        for report in &reports {
            summary.add(report.outcome);
            record_item(report.outcome.as_str());
        }

        info!(
            fetched = summary.fetched,
            already_done = summary.already_done,
            published = summary.published,
            partial = summary.partial,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Cycle complete"
        );
        Ok(summary)
    }

    /// Build and publish a single item. Never fails; errors end up in the report.
    pub async fn process_item(&self, item: &ContentItem) -> ItemReport {
        let mut report = ItemReport::new(item.id.clone(), ItemOutcome::Failed);

        if self.ledger.seen(&item.id).await {
            report.outcome = ItemOutcome::AlreadyDone;
            return report;
        }
        if self.is_shutting_down() {
            report.outcome = ItemOutcome::Cancelled;
            return report;
        }

        let logger = ItemLogger::new(&item.id, "input");
        if let Err(e) = item.validate() {
            logger.log_error(&format!("skipping item: {e}"));
            report.error = Some(e.to_string());
            return report;
        }

        let mut pending = Vec::new();
        for publisher in &self.publishers {
            let platform = publisher.platform();
            if self.ledger.seen_platform(&item.id, platform).await {
                info!(item_id = %item.id, platform = %platform, "Platform already published");
                report.platforms.push(PlatformReport {
                    platform,
                    required: self.config.is_required(platform),
                    job: None,
                });
            } else {
                pending.push(publisher);
            }
        }

        if !pending.is_empty() {
            let url = match self.pipeline.build(item).await {
                Ok(url) => url,
                Err(e) => {
                    error!(
                        item_id = %item.id,
                        stage = e.stage(),
                        retryable = e.is_retryable(),
                        "Asset pipeline failed: {}", e
                    );
                    report.error = Some(e.to_string());
                    return report;
                }
            };

            let caption = build_caption(item, &self.default_category, &self.config.caption_hashtags);
            let jobs = join_all(pending.iter().map(|publisher| {
                let url = url.as_str();
                let caption = caption.as_str();
                let shutdown = self.shutdown.clone();
                async move {
                    let _permit = self.publish_slots.acquire().await.ok();
                    publisher.run(&item.id, url, caption, shutdown).await
                }
            }))
            .await;

            for job in jobs {
                if job.state.is_success() {
                    if let Err(e) = self.ledger.mark_platform(&item.id, job.platform).await {
                        logger
                            .with_stage("ledger")
                            .log_error(&format!("could not record {} completion: {e}", job.platform));
                    }
                }
                report.platforms.push(PlatformReport {
                    platform: job.platform,
                    required: self.config.is_required(job.platform),
                    job: Some(job),
                });
            }
            report.video_url = Some(url);
        }

        self.settle(report, &logger).await
    }

    /// Decide the outcome from the platform reports and mark the ledger.
    async fn settle(&self, mut report: ItemReport, logger: &ItemLogger) -> ItemReport {
        let required: Vec<&PlatformReport> =
            report.platforms.iter().filter(|p| p.required).collect();
        let gate_ok = if required.is_empty() {
            report.platforms.iter().any(PlatformReport::succeeded)
        } else {
            required.iter().all(|p| p.succeeded())
        };
        let all_ok = report.platforms.iter().all(PlatformReport::succeeded);
        let cancelled = report.platforms.iter().any(PlatformReport::cancelled);

        if !gate_ok {
            let failed: Vec<&str> = report
                .platforms
                .iter()
                .filter(|p| !p.succeeded())
                .map(|p| p.platform.as_str())
                .collect();
            if cancelled {
                report.outcome = ItemOutcome::Cancelled;
                logger.log_warning("shutdown before publishing finished, item left unmarked");
            } else {
                report.outcome = ItemOutcome::Failed;
                logger
                    .with_stage("publish")
                    .log_error(&format!("not published on {}", failed.join(", ")));
            }
            return report;
        }

        if let Err(e) = self.ledger.mark(&report.item_id).await {
            logger.with_stage("ledger").log_error(&format!("could not mark item: {e}"));
            report.outcome = ItemOutcome::Failed;
            report.error = Some(e.to_string());
            return report;
        }

        report.outcome = if all_ok {
            ItemOutcome::Published
        } else {
            ItemOutcome::PublishedPartial
        };
        logger
            .with_stage("publish")
            .log_completion(report.video_url.as_deref().unwrap_or("previously published"));
        report
    }

    /// Sleep for `duration` unless shutdown comes first. Returns true on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        if self.is_shutting_down() {
            return true;
        }
        if duration.is_zero() {
            return false;
        }

        let mut shutdown = self.shutdown.clone();
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        tokio::select! {
            _ = &mut sleep => false,
            res = shutdown.wait_for(|stop| *stop) => match res {
                Ok(_) => true,
                Err(_) => {
                    // Sender gone: nobody can request shutdown any more
                    (&mut sleep).await;
                    false
                }
            },
        }
    }
}
