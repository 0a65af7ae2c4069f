//! Scripted platform and manual clock for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use reel_models::Platform;

use crate::api::{PlatformApi, ProcessingStatus, Submission};
use crate::clock::Clock;
use crate::error::{PublishError, PublishResult};

/// Clock that only advances when something sleeps on it.
pub struct ManualClock {
    start: DateTime<Utc>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
        )
    }
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every sleep taken so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Total time slept.
    pub fn elapsed(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::Duration::zero());
        self.start + elapsed
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// A Graph-style rejection with the given code and subcode.
pub fn graph_error(code: i64, subcode: Option<i64>, message: &str) -> PublishError {
    PublishError::Api {
        status: 400,
        code: Some(code),
        subcode,
        message: message.to_string(),
    }
}

/// The "media not ready" rejection.
pub fn not_ready() -> PublishError {
    graph_error(9007, Some(2207027), "Media ID is not available")
}

/// Platform that answers from per-call scripts.
///
/// Once a script runs dry: create returns a job (or an immediate post for
/// the feed platform), status stays pending and publish succeeds.
pub struct ScriptedApi {
    platform: Platform,
    creates: Mutex<VecDeque<PublishResult<Submission>>>,
    statuses: Mutex<VecDeque<PublishResult<ProcessingStatus>>>,
    publishes: Mutex<VecDeque<PublishResult<String>>>,
    create_calls: AtomicU32,
    status_calls: AtomicU32,
    publish_calls: AtomicU32,
    video_urls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            creates: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            publishes: Mutex::new(VecDeque::new()),
            create_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            publish_calls: AtomicU32::new(0),
            video_urls: Mutex::new(Vec::new()),
        }
    }

    pub fn feed_video() -> Self {
        Self::new(Platform::FeedVideo)
    }

    pub fn short_form() -> Self {
        Self::new(Platform::ShortForm)
    }

    pub fn with_creates(self, script: Vec<PublishResult<Submission>>) -> Self {
        if let Ok(mut q) = self.creates.lock() {
            q.extend(script);
        }
        self
    }

    pub fn with_statuses(self, script: Vec<PublishResult<ProcessingStatus>>) -> Self {
        if let Ok(mut q) = self.statuses.lock() {
            q.extend(script);
        }
        self
    }

    pub fn with_publishes(self, script: Vec<PublishResult<String>>) -> Self {
        if let Ok(mut q) = self.publishes.lock() {
            q.extend(script);
        }
        self
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn publish_calls(&self) -> u32 {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Video URLs passed to create, in order.
    pub fn video_urls(&self) -> Vec<String> {
        self.video_urls.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

fn next<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    queue.lock().ok().and_then(|mut q| q.pop_front())
}

#[async_trait]
impl PlatformApi for ScriptedApi {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn create(&self, video_url: &str, _caption: &str) -> PublishResult<Submission> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.video_urls.lock() {
            urls.push(video_url.to_string());
        }
        next(&self.creates).unwrap_or_else(|| match self.platform {
            Platform::FeedVideo => Ok(Submission::Published("post-1".to_string())),
            Platform::ShortForm => Ok(Submission::Job("container-1".to_string())),
        })
    }

    async fn status(&self, _remote_id: &str) -> PublishResult<ProcessingStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.statuses).unwrap_or(Ok(ProcessingStatus::Pending))
    }

    async fn publish(&self, _remote_id: &str) -> PublishResult<String> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.publishes).unwrap_or_else(|| Ok("media-1".to_string()))
    }
}
