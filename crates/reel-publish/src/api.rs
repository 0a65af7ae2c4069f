//! The seam between the publish state machine and a platform.

use async_trait::async_trait;

use reel_models::Platform;

use crate::error::PublishResult;

/// Longest caption the platforms accept, in characters.
pub const MAX_CAPTION_CHARS: usize = 2200;

/// Outcome of a successful create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A processing job was queued; poll it, then publish it
    Job(String),
    /// The platform published right away
    Published(String),
}

/// Platform-side processing state of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Finished,
    Error(String),
    Expired,
}

/// Transport for one platform.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    fn platform(&self) -> Platform;

    /// Submit a hosted video with its caption.
    async fn create(&self, video_url: &str, caption: &str) -> PublishResult<Submission>;

    /// Processing status of a submitted job.
    async fn status(&self, remote_id: &str) -> PublishResult<ProcessingStatus>;

    /// Publish a finished job, returning the platform media id.
    async fn publish(&self, remote_id: &str) -> PublishResult<String>;
}

/// Cut `caption` to at most [`MAX_CAPTION_CHARS`] characters.
pub fn truncate_caption(caption: &str) -> &str {
    match caption.char_indices().nth(MAX_CAPTION_CHARS) {
        Some((idx, _)) => &caption[..idx],
        None => caption,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_caption_on_char_boundary() {
        let short = "Olá";
        assert_eq!(truncate_caption(short), short);

        let long = "ç".repeat(MAX_CAPTION_CHARS + 10);
        let cut = truncate_caption(&long);
        assert_eq!(cut.chars().count(), MAX_CAPTION_CHARS);
    }
}
