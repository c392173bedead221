use std::future::Future;
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use futures_util::stream::FuturesUnordered;
use futures_util::{select, FutureExt, StreamExt};
use log::{debug, warn};

use crate::config::WidgetConfig;
use crate::error::{AssistantError, Result};
use crate::models::{GenerationJob, JobStatus};
use crate::services::generation::GenerationJobClient;
use crate::services::timer;

const GENERIC_FAILURE: &str = "Course generation failed";
const POLL_TIMEOUT: &str = "Timed out waiting for generation job";
const UNKNOWN_STATUS: &str = "Course generation stopped with an unrecognized status";

/// Where the modal is in a generation's lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PollPhase {
    #[default]
    Idle,
    Starting,
    Processing,
    Completed,
    Failed,
}

impl From<JobStatus> for PollPhase {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Starting => PollPhase::Starting,
            JobStatus::Processing => PollPhase::Processing,
            JobStatus::Completed => PollPhase::Completed,
            JobStatus::Failed | JobStatus::Unknown => PollPhase::Failed,
        }
    }
}

impl PollPhase {
    pub fn is_active(self) -> bool {
        matches!(self, PollPhase::Starting | PollPhase::Processing)
    }
}

pub struct PollCallbacks {
    pub on_progress: Box<dyn FnMut(&GenerationJob)>,
    pub on_success: Box<dyn FnOnce(GenerationJob)>,
    pub on_failure: Box<dyn FnOnce(AssistantError)>,
}

/// Owns a running poll. Dropping it stops the poll; no callback fires
/// afterwards, even for a status request that was already on the wire.
pub struct PollHandle {
    abort: AbortHandle,
}

impl PollHandle {
    /// Tie `task` to a new handle. The task resolves early, without running
    /// the rest of its body, once the handle is cancelled or dropped.
    pub fn wrap<F>(task: F) -> (PollHandle, impl Future<Output = ()>)
    where
        F: Future<Output = ()>,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let task = Abortable::new(task, registration).map(|outcome| {
            if outcome.is_err() {
                debug!("job poll cancelled");
            }
        });
        (PollHandle { abort }, task)
    }

    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

#[derive(Clone)]
pub struct JobPoller {
    client: GenerationJobClient,
    interval: Duration,
    max_attempts: Option<u32>,
}

impl JobPoller {
    pub fn new(client: GenerationJobClient, interval: Duration) -> Self {
        Self {
            client,
            interval,
            max_attempts: None,
        }
    }

    pub fn from_config(client: GenerationJobClient, config: &WidgetConfig) -> Self {
        Self::new(client, Duration::from_millis(u64::from(config.poll_interval_ms)))
            .with_max_attempts(config.max_poll_attempts)
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Fetch the job's status every interval until it completes or fails.
    ///
    /// Requests are issued on a fixed cadence, so a slow one may still be
    /// pending when the next goes out. Each request is numbered and a
    /// non-terminal answer older than the last one applied is dropped.
    /// Request errors are logged and the next tick tries again.
    pub async fn poll_until_terminal<F>(&self, job_id: &str, mut on_progress: F) -> Result<GenerationJob>
    where
        F: FnMut(&GenerationJob),
    {
        let mut in_flight = FuturesUnordered::new();
        let mut tick = Box::pin(timer::sleep(self.interval)).fuse();
        let mut issued: u64 = 0;
        let mut applied: u64 = 0;

        loop {
            select! {
                () = tick => {
                    let capped = self.max_attempts.is_some_and(|max| issued >= u64::from(max));
                    // Out of attempts: let pending requests answer before giving up.
                    if capped && in_flight.is_empty() {
                        return Err(AssistantError::JobStatus(POLL_TIMEOUT.to_string()));
                    }
                    if !capped {
                        issued += 1;
                        let seq = issued;
                        let client = self.client.clone();
                        let id = job_id.to_string();
                        in_flight.push(async move { (seq, client.get_job_status(&id).await) });
                    }
                    tick = Box::pin(timer::sleep(self.interval)).fuse();
                }
                (seq, result) = in_flight.select_next_some() => match result {
                    Ok(job) if job.status == JobStatus::Completed => return Ok(job),
                    Ok(job) if job.status == JobStatus::Failed => {
                        let message = job
                            .error_message
                            .filter(|m| !m.is_empty())
                            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
                        return Err(AssistantError::JobFailed(message));
                    }
                    Ok(job) if job.status == JobStatus::Unknown => {
                        warn!("job {} reported an unrecognized status", job_id);
                        let message = job
                            .error_message
                            .filter(|m| !m.is_empty())
                            .unwrap_or_else(|| UNKNOWN_STATUS.to_string());
                        return Err(AssistantError::JobFailed(message));
                    }
                    Ok(_) if seq < applied => {
                        debug!("dropping stale status #{} for job {}", seq, job_id);
                    }
                    Ok(job) => {
                        applied = seq;
                        on_progress(&job);
                    }
                    Err(err) => warn!("status poll #{} for job {} failed: {}", seq, job_id, err),
                },
            }
        }
    }

    /// Poll `job_id` to a terminal state and report through `callbacks`.
    pub async fn run(&self, job_id: String, callbacks: PollCallbacks) {
        let PollCallbacks {
            mut on_progress,
            on_success,
            on_failure,
        } = callbacks;
        match self.poll_until_terminal(&job_id, |job| on_progress(job)).await {
            Ok(job) => on_success(job),
            Err(err) => on_failure(err),
        }
    }

    /// Start watching a job. The returned task must be spawned by the
    /// caller; it stops as soon as the handle is cancelled or dropped.
    pub fn watch(&self, job_id: impl Into<String>, callbacks: PollCallbacks) -> (PollHandle, impl Future<Output = ()>) {
        let poller = self.clone();
        let job_id = job_id.into();
        PollHandle::wrap(async move { poller.run(job_id, callbacks).await })
    }
}
