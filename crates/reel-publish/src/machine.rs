//! Per-platform publish state machine.
//!
//! [`transition`] is a pure function from a job, an event and the current
//! time to the next [`Effect`]. [`Publisher`] executes effects against a
//! [`PlatformApi`] and a [`Clock`], checking the shutdown signal at every
//! wait and enforcing an overall deadline.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use reel_models::{FailureKind, ItemId, JobResult, JobState, PublishFailure, PublishJob};

use crate::api::{PlatformApi, ProcessingStatus, Submission};
use crate::classify::TransientErrorTable;
use crate::clock::Clock;
use crate::metrics::record_outcome;

/// Timing and retry budget of a publish job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPolicy {
    /// Wait between status checks
    pub poll_interval: Duration,
    /// Longest wait for processing, measured from the first status check
    pub max_wait: Duration,
    /// Publish attempts allowed, first one included
    pub max_publish_attempts: u32,
    /// Backoff before the second attempt
    pub backoff_base: Duration,
    /// Cap on a single backoff
    pub backoff_max: Duration,
    /// Cap on the sum of all backoffs
    pub max_total_backoff: Duration,
    /// Overall budget of one job
    pub deadline: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(480),
            max_publish_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(60),
            max_total_backoff: Duration::from_secs(180),
            deadline: Duration::from_secs(900),
        }
    }
}

impl PublishPolicy {
    /// Create policy from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            poll_interval: secs("WORKER_POLL_INTERVAL_SECS", defaults.poll_interval),
            max_wait: secs("WORKER_MAX_WAIT_SECS", defaults.max_wait),
            max_publish_attempts: std::env::var("WORKER_PUBLISH_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_publish_attempts),
            backoff_base: secs("WORKER_BACKOFF_BASE_SECS", defaults.backoff_base),
            backoff_max: secs("WORKER_BACKOFF_MAX_SECS", defaults.backoff_max),
            max_total_backoff: secs("WORKER_BACKOFF_TOTAL_SECS", defaults.max_total_backoff),
            deadline: secs("WORKER_PUBLISH_DEADLINE_SECS", defaults.deadline),
        }
    }

    /// Backoff after the `attempt`-th failed publish: `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }

    /// Sum of the backoffs after the first `attempts` failed publishes.
    pub fn total_backoff(&self, attempts: u32) -> Duration {
        (1..=attempts).map(|n| self.backoff(n)).sum()
    }
}

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    CreateSucceeded(Submission),
    CreateFailed(String),
    Status(ProcessingStatus),
    /// The status request itself failed; treated as still pending
    StatusUnavailable(String),
    PublishSucceeded(String),
    PublishFailed { transient: bool, message: String },
    DeadlineExceeded,
    Shutdown,
}

/// What the driver should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Create,
    CheckStatus { after: Duration },
    Publish { after: Duration },
    Finish,
}

fn finish(job: &mut PublishJob, state: JobState, kind: FailureKind, message: String) -> Effect {
    job.state = state;
    job.result = Some(JobResult::Failed(PublishFailure::new(kind, message)));
    Effect::Finish
}

fn published(job: &mut PublishJob, platform_id: String) -> Effect {
    job.state = JobState::Published;
    job.result = Some(JobResult::Published { platform_id });
    Effect::Finish
}

/// The effect a job in its current state is waiting on.
fn resume(policy: &PublishPolicy, job: &PublishJob) -> Effect {
    match job.state {
        JobState::New => Effect::Create,
        JobState::Created => Effect::CheckStatus {
            after: Duration::ZERO,
        },
        JobState::Polling => Effect::CheckStatus {
            after: policy.poll_interval,
        },
        JobState::Ready => Effect::Publish {
            after: Duration::ZERO,
        },
        _ => Effect::Finish,
    }
}

/// Apply `event` to `job` at time `now` and return the next effect.
///
/// Terminal jobs never change. An event that does not apply to the current
/// state leaves the job as is and repeats the effect it is waiting on.
pub fn transition(
    policy: &PublishPolicy,
    job: &mut PublishJob,
    event: Event,
    now: DateTime<Utc>,
) -> Effect {
    if job.is_terminal() {
        return Effect::Finish;
    }

    match (job.state, event) {
        (_, Event::Shutdown) => {
            let message = format!("shutdown requested while {}", job.state);
            finish(job, JobState::Cancelled, FailureKind::Cancelled, message)
        }
        (_, Event::DeadlineExceeded) => {
            let message = format!(
                "deadline of {}s exceeded while {}",
                policy.deadline.as_secs(),
                job.state
            );
            finish(job, JobState::TimedOut, FailureKind::Timeout, message)
        }

        (JobState::New, Event::Start) => Effect::Create,
        (JobState::New, Event::CreateSucceeded(submission)) => {
            job.create_attempts += 1;
            job.created_at = Some(now);
            match submission {
                Submission::Published(id) => {
                    job.remote_id = Some(id.clone());
                    published(job, id)
                }
                Submission::Job(id) => {
                    job.remote_id = Some(id);
                    job.state = JobState::Created;
                    Effect::CheckStatus {
                        after: Duration::ZERO,
                    }
                }
            }
        }
        (JobState::New, Event::CreateFailed(message)) => {
            job.create_attempts += 1;
            finish(job, JobState::FailedCreate, FailureKind::Create, message)
        }

        (JobState::Created | JobState::Polling, Event::Status(status)) => {
            record_poll(job, now);
            match status {
                ProcessingStatus::Finished => {
                    job.state = JobState::Ready;
                    Effect::Publish {
                        after: Duration::ZERO,
                    }
                }
                ProcessingStatus::Error(detail) => {
                    finish(job, JobState::FailedProcess, FailureKind::Process, detail)
                }
                ProcessingStatus::Expired => finish(
                    job,
                    JobState::FailedProcess,
                    FailureKind::Process,
                    "processing job expired".to_string(),
                ),
                ProcessingStatus::Pending => still_pending(policy, job, now),
            }
        }
        (JobState::Created | JobState::Polling, Event::StatusUnavailable(_)) => {
            record_poll(job, now);
            still_pending(policy, job, now)
        }

        (JobState::Ready, Event::PublishSucceeded(id)) => {
            job.publish_attempts += 1;
            published(job, id)
        }
        (JobState::Ready, Event::PublishFailed { transient, message }) => {
            job.publish_attempts += 1;
            let attempts = job.publish_attempts;

            if !transient {
                return finish(job, JobState::FailedPublish, FailureKind::PublishHard, message);
            }

            if attempts < policy.max_publish_attempts
                && policy.total_backoff(attempts) <= policy.max_total_backoff
            {
                return Effect::Publish {
                    after: policy.backoff(attempts),
                };
            }

            finish(
                job,
                JobState::FailedPublish,
                FailureKind::PublishTransient,
                format!("{message} (gave up after {attempts} attempts)"),
            )
        }

        _ => resume(policy, job),
    }
}

fn record_poll(job: &mut PublishJob, now: DateTime<Utc>) {
    job.poll_attempts += 1;
    job.first_poll_at.get_or_insert(now);
    job.last_poll_at = Some(now);
}

fn still_pending(policy: &PublishPolicy, job: &mut PublishJob, now: DateTime<Utc>) -> Effect {
    job.state = JobState::Polling;
    let waited = job
        .first_poll_at
        .and_then(|first| (now - first).to_std().ok())
        .unwrap_or(Duration::ZERO);

    if waited >= policy.max_wait {
        let message = format!(
            "not finished after {}s ({} status checks)",
            waited.as_secs(),
            job.poll_attempts
        );
        return finish(job, JobState::TimedOut, FailureKind::Timeout, message);
    }

    Effect::CheckStatus {
        after: policy.poll_interval,
    }
}

/// Runs publish jobs for one platform.
#[derive(Clone)]
pub struct Publisher {
    api: Arc<dyn PlatformApi>,
    clock: Arc<dyn Clock>,
    policy: PublishPolicy,
    table: TransientErrorTable,
}

impl Publisher {
    pub fn new(
        api: Arc<dyn PlatformApi>,
        clock: Arc<dyn Clock>,
        policy: PublishPolicy,
        table: TransientErrorTable,
    ) -> Self {
        Self {
            api,
            clock,
            policy,
            table,
        }
    }

    pub fn platform(&self) -> reel_models::Platform {
        self.api.platform()
    }

    pub fn policy(&self) -> &PublishPolicy {
        &self.policy
    }

    /// Drive a fresh job for `item_id` to a terminal state.
    pub async fn run(
        &self,
        item_id: &ItemId,
        video_url: &str,
        caption: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> PublishJob {
        let mut job = PublishJob::new(item_id.clone(), self.api.platform());
        let span = info_span!("publish", item_id = %item_id, platform = %job.platform);

        async {
            let started = self.clock.now();
            let mut effect = transition(&self.policy, &mut job, Event::Start, started);

            loop {
                let event = match effect {
                    Effect::Finish => break,
                    Effect::Create => match self.api.create(video_url, caption).await {
                        Ok(submission) => Event::CreateSucceeded(submission),
                        Err(e) => Event::CreateFailed(e.to_string()),
                    },
                    Effect::CheckStatus { after } => {
                        match self.wait(after, started, &mut shutdown).await {
                            Some(interrupt) => interrupt,
                            None => self.check_status(&job).await,
                        }
                    }
                    Effect::Publish { after } => {
                        match self.wait(after, started, &mut shutdown).await {
                            Some(interrupt) => interrupt,
                            None => self.publish(&job).await,
                        }
                    }
                };

                let before = job.state;
                effect = transition(&self.policy, &mut job, event, self.clock.now());
                if job.state != before {
                    debug!(from = %before, to = %job.state, "Publish job transition");
                }
            }

            match &job.result {
                Some(JobResult::Published { platform_id }) => info!(
                    platform_id = %platform_id,
                    publish_attempts = job.publish_attempts,
                    status_checks = job.poll_attempts,
                    "Published"
                ),
                Some(JobResult::Failed(failure)) => warn!(
                    state = %job.state,
                    kind = %failure.kind,
                    publish_attempts = job.publish_attempts,
                    status_checks = job.poll_attempts,
                    "Publish failed: {}",
                    failure.message
                ),
                None => {}
            }
            record_outcome(&job);
        }
        .instrument(span)
        .await;

        job
    }

    async fn check_status(&self, job: &PublishJob) -> Event {
        let remote_id = job.remote_id.as_deref().unwrap_or_default();
        match self.api.status(remote_id).await {
            Ok(status) => Event::Status(status),
            Err(e) => {
                warn!(remote_id = %remote_id, "Status check failed, treating as pending: {}", e);
                Event::StatusUnavailable(e.to_string())
            }
        }
    }

    async fn publish(&self, job: &PublishJob) -> Event {
        let remote_id = job.remote_id.as_deref().unwrap_or_default();
        match self.api.publish(remote_id).await {
            Ok(id) => Event::PublishSucceeded(id),
            Err(e) => {
                let transient = self.table.is_transient(&e);
                warn!(
                    attempt = job.publish_attempts + 1,
                    transient,
                    http_status = ?e.http_status(),
                    code = ?e.code(),
                    subcode = ?e.subcode(),
                    "Publish call rejected: {}", e
                );
                Event::PublishFailed {
                    transient,
                    message: e.to_string(),
                }
            }
        }
    }

    fn past_deadline(&self, started: DateTime<Utc>) -> bool {
        (self.clock.now() - started)
            .to_std()
            .map(|elapsed| elapsed >= self.policy.deadline)
            .unwrap_or(false)
    }

    /// Wait `after`, returning the event that interrupted the wait, if any.
    async fn wait(
        &self,
        after: Duration,
        started: DateTime<Utc>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Event> {
        if *shutdown.borrow() {
            return Some(Event::Shutdown);
        }
        if self.past_deadline(started) {
            return Some(Event::DeadlineExceeded);
        }
        if after.is_zero() {
            return None;
        }

        let sleep = self.clock.sleep(after);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => return Some(Event::Shutdown),
                    Ok(()) => {}
                    Err(_) => {
                        // Sender gone: nobody can ask for shutdown any more
                        (&mut sleep).await;
                        break;
                    }
                },
            }
        }

        if self.past_deadline(started) {
            return Some(Event::DeadlineExceeded);
        }
        None
    }
}
