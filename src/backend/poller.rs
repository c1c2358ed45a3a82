//! Submit-then-poll completion for backends that hand out job ids

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// State of a backend job as reported by its status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Complete,
    Failed,
}

/// A backend-issued job id and the last state observed for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub state: JobState,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Pending,
        }
    }
}

/// Polling limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(5),
        }
    }
}

/// Poll `status_fn` until the job completes, then fetch its result once
///
/// Fails with [`AppError::JobFailed`] as soon as the backend reports failure
/// and with [`AppError::JobTimeout`] once `timeout` has elapsed without a
/// terminal state. The wait between polls only suspends the calling task.
pub async fn await_completion<S, SFut, R, RFut>(
    job_id: &str,
    mut status_fn: S,
    result_fn: R,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Vec<u8>>
where
    S: FnMut(String) -> SFut,
    SFut: Future<Output = Result<JobState>>,
    R: FnOnce(String) -> RFut,
    RFut: Future<Output = Result<Vec<u8>>>,
{
    let mut handle = JobHandle::new(job_id);
    let started = Instant::now();
    let mut polls = 0u32;

    while started.elapsed() < timeout {
        handle.state = status_fn(handle.job_id.clone()).await?;
        polls += 1;

        match handle.state {
            JobState::Complete => {
                debug!(job_id = %handle.job_id, polls, "Job complete");
                return result_fn(handle.job_id).await;
            }
            JobState::Failed => {
                warn!(job_id = %handle.job_id, polls, "Job failed");
                return Err(AppError::JobFailed {
                    job_id: handle.job_id,
                });
            }
            JobState::Pending => {
                debug!(job_id = %handle.job_id, polls, "Job pending");
                // never sleep past the deadline
                let remaining = timeout.saturating_sub(started.elapsed());
                tokio::time::sleep(poll_interval.min(remaining)).await;
            }
        }
    }

    warn!(job_id = %handle.job_id, polls, timeout_secs = timeout.as_secs_f64(), "Job timed out");
    Err(AppError::JobTimeout {
        job_id: handle.job_id,
        timeout,
    })
}

/// [`await_completion`] with limits taken from [`PollSettings`]
pub async fn await_with_settings<S, SFut, R, RFut>(
    job_id: &str,
    status_fn: S,
    result_fn: R,
    settings: PollSettings,
) -> Result<Vec<u8>>
where
    S: FnMut(String) -> SFut,
    SFut: Future<Output = Result<JobState>>,
    R: FnOnce(String) -> RFut,
    RFut: Future<Output = Result<Vec<u8>>>,
{
    await_completion(job_id, status_fn, result_fn, settings.timeout, settings.interval).await
}
