//! Assistant run lifecycle: poll a run until it reaches a terminal status.
//!
//! ```text
//! queued | in_progress  ──sleep(interval)──▶ poll again
//! completed             ──▶ Ok
//! failed                ──▶ RunFailure::Failed(message)
//! cancelled | cancelling | expired ──▶ RunFailure::CancelledOrExpired
//! requires_action       ──▶ RunFailure::RequiresAction
//! anything else         ──▶ RunFailure::Unexpected(status)
//! ```
//!
//! The wait is bounded by `max_polls` and aborted by the shutdown token.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ProviderError, RunFailure, RunStatus};

/// Default pause between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default poll budget (~5 minutes at the default interval).
pub const DEFAULT_MAX_POLLS: u32 = 60;

/// Polling policy for [`RunPoller::await_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPoller {
    pub interval: Duration,
    /// Maximum number of status fetches; `None` waits indefinitely.
    pub max_polls: Option<u32>,
}

impl Default for RunPoller {
    fn default() -> Self {
        Self { interval: DEFAULT_POLL_INTERVAL, max_polls: Some(DEFAULT_MAX_POLLS) }
    }
}

impl RunPoller {
    pub fn new(interval: Duration, max_polls: Option<u32>) -> Self {
        Self { interval, max_polls }
    }

    /// Drive a run from its `initial` status to completion.
    ///
    /// `fetch` performs one status poll. It is only called while the last
    /// known status is non-terminal, and every non-terminal status is
    /// followed by exactly one `interval` sleep before the next poll.
    /// Returns the number of polls performed on success.
    pub async fn await_run<F, Fut>(
        &self,
        initial: RunStatus,
        mut fetch: F,
        shutdown: &CancellationToken,
    ) -> Result<u32, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RunStatus, ProviderError>>,
    {
        let mut status = initial;
        let mut polls: u32 = 0;

        loop {
            match status {
                RunStatus::Queued | RunStatus::InProgress => {}
                RunStatus::Completed => {
                    debug!(polls, "run completed");
                    return Ok(polls);
                }
                terminal => return Err(terminal_failure(terminal).into()),
            }

            if self.max_polls.is_some_and(|max| polls >= max) {
                warn!(polls, "run still pending, giving up");
                return Err(RunFailure::TimedOut { polls }.into());
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(RunFailure::Aborted.into()),
                _ = tokio::time::sleep(self.interval) => {}
            }

            status = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(RunFailure::Aborted.into()),
                next = fetch() => next?,
            };
            polls += 1;
            debug!(polls, %status, "run polled");
        }
    }
}

fn terminal_failure(status: RunStatus) -> RunFailure {
    match status {
        RunStatus::Failed(message) => RunFailure::Failed(message),
        RunStatus::Cancelled | RunStatus::Cancelling | RunStatus::Expired => {
            RunFailure::CancelledOrExpired
        }
        RunStatus::RequiresAction => RunFailure::RequiresAction,
        other => RunFailure::Unexpected(other.to_string()),
    }
}
