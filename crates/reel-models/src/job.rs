//! Per-platform publish job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::content::ItemId;

/// A publish target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Page video feed: one-shot publish by URL
    FeedVideo,
    /// Short-form reels: create, poll, publish
    ShortForm,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::FeedVideo, Platform::ShortForm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::FeedVideo => "feed_video",
            Platform::ShortForm => "short_form",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a publish job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Nothing submitted yet
    #[default]
    New,
    /// Job submitted, awaiting platform-side processing
    Created,
    /// Status checks in flight
    Polling,
    /// Platform reports processing finished
    Ready,
    /// Terminal success
    Published,
    /// Creation rejected
    FailedCreate,
    /// Platform reported a processing error or expiry
    FailedProcess,
    /// Publish call rejected (hard, or transient retries exhausted)
    FailedPublish,
    /// Processing did not finish within the wait budget
    TimedOut,
    /// Shutdown requested while waiting
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::New => "new",
            JobState::Created => "created",
            JobState::Polling => "polling",
            JobState::Ready => "ready",
            JobState::Published => "published",
            JobState::FailedCreate => "failed_create",
            JobState::FailedProcess => "failed_process",
            JobState::FailedPublish => "failed_publish",
            JobState::TimedOut => "timed_out",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Check if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Published
                | JobState::FailedCreate
                | JobState::FailedProcess
                | JobState::FailedPublish
                | JobState::TimedOut
                | JobState::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Published)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a terminal publish failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Create,
    Process,
    PublishTransient,
    PublishHard,
    Timeout,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Create => "create",
            FailureKind::Process => "process",
            FailureKind::PublishTransient => "publish_transient",
            FailureKind::PublishHard => "publish_hard",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Terminal failure with its cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl PublishFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    Published { platform_id: String },
    Failed(PublishFailure),
}

/// One publish job per (content item, platform).
///
/// Lives only for the duration of the state machine run; only the item id
/// is ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJob {
    pub item_id: ItemId,
    pub platform: Platform,
    /// Platform-side job id, set once creation succeeds
    pub remote_id: Option<String>,
    pub state: JobState,
    pub create_attempts: u32,
    pub poll_attempts: u32,
    pub publish_attempts: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub first_poll_at: Option<DateTime<Utc>>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
}

impl PublishJob {
    /// Create a fresh job in the `New` state.
    pub fn new(item_id: ItemId, platform: Platform) -> Self {
        Self {
            item_id,
            platform,
            remote_id: None,
            state: JobState::New,
            create_attempts: 0,
            poll_attempts: 0,
            publish_attempts: 0,
            created_at: None,
            first_poll_at: None,
            last_poll_at: None,
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Platform id when the job ended published.
    pub fn platform_id(&self) -> Option<&str> {
        match &self.result {
            Some(JobResult::Published { platform_id }) => Some(platform_id),
            _ => None,
        }
    }

    /// Failure when the job ended in any non-success terminal state.
    pub fn failure(&self) -> Option<&PublishFailure> {
        match &self.result {
            Some(JobResult::Failed(f)) => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::New.is_terminal());
        assert!(!JobState::Created.is_terminal());
        assert!(!JobState::Polling.is_terminal());
        assert!(!JobState::Ready.is_terminal());
        assert!(JobState::Published.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Published.is_success());
        assert!(!JobState::FailedPublish.is_success());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&JobState::FailedCreate).unwrap();
        assert_eq!(json, "\"failed_create\"");
        let json = serde_json::to_string(&Platform::ShortForm).unwrap();
        assert_eq!(json, "\"short_form\"");
    }

    #[test]
    fn test_result_accessors() {
        let mut job = PublishJob::new(ItemId::from(42u64), Platform::FeedVideo);
        assert_eq!(job.platform_id(), None);

        job.result = Some(JobResult::Published {
            platform_id: "987".to_string(),
        });
        assert_eq!(job.platform_id(), Some("987"));
        assert!(job.failure().is_none());

        job.result = Some(JobResult::Failed(PublishFailure::new(
            FailureKind::Timeout,
            "waited 480s",
        )));
        assert_eq!(job.failure().unwrap().kind, FailureKind::Timeout);
    }
}
