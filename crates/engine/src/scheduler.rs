//! Poll loop for a single pending job.
//!
//! [`PollScheduler::run`] owns the [`JobHandle`] for the duration of the
//! loop and issues strictly sequential poll attempts until the provider
//! reports a terminal state, the budget runs out, or the cancellation token
//! fires. Each iteration, in order:
//!
//! 1. stop if cancelled;
//! 2. stop if `max_attempts` attempts have been issued;
//! 3. if the next attempt would land at or past the `max_elapsed` deadline,
//!    wait for the deadline and stop;
//! 4. wait for the current delay, or stop early on cancellation;
//! 5. fetch a fresh credential and poll;
//! 6. normalize and decide.
//!
//! Transport failures keep the current delay and count against the budget.
//! Backoff only grows after a `Processing` response.

use std::sync::Arc;
use std::time::Duration;

use genjob_core::backoff::PollConfig;
use genjob_core::error::CoreError;
use genjob_core::job::{ErrorKind, JobError, JobHandle, JobResult, JobState, PollAttempt};
use genjob_providers::normalizer::normalize;
use genjob_providers::{CredentialProvider, ProviderAdapter};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

/// Progress reported after every poll attempt.
#[derive(Debug, Clone, Copy)]
pub struct PollTick<'a> {
    pub attempt: u32,
    /// Canonical state after this attempt; unchanged after a transport error.
    /// Terminal on the last tick of a run that the provider resolved.
    pub state: JobState,
    /// Time since submission.
    pub elapsed: Duration,
    pub preview_outputs: &'a [String],
}

/// Drives poll attempts for one provider under one [`PollConfig`].
pub struct PollScheduler {
    adapter: Arc<dyn ProviderAdapter>,
    credentials: Arc<dyn CredentialProvider>,
    config: PollConfig,
    clock: Arc<dyn Clock>,
}

impl PollScheduler {
    /// Fails when `config` is unbounded or otherwise invalid.
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        credentials: Arc<dyn CredentialProvider>,
        config: PollConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            adapter,
            credentials,
            config,
            clock,
        })
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `handle` to a terminal outcome.
    ///
    /// `started` is the submission instant; `max_elapsed` is measured from
    /// it. `on_tick` is called after every attempt, in attempt order,
    /// including the attempt that observed a terminal provider state.
    pub async fn run<F>(
        &self,
        handle: JobHandle,
        started: Instant,
        cancel: &CancellationToken,
        mut on_tick: F,
    ) -> Result<JobResult, JobError>
    where
        F: FnMut(PollTick<'_>) + Send,
    {
        let provider = self.adapter.provider();
        // A budget past the end of the clock's range never binds.
        let deadline = self
            .config
            .max_elapsed
            .and_then(|budget| started.checked_add(budget));
        let mut delay = self.config.first_delay(handle.provider_eta);
        let mut attempt = 0u32;
        let mut state = JobState::Queued;
        let mut previews: Vec<String> = Vec::new();

        tracing::debug!(
            provider = %provider,
            provider_job_id = %handle.provider_job_id,
            first_delay_ms = delay.as_millis() as u64,
            "Polling started",
        );

        loop {
            if cancel.is_cancelled() {
                return Err(canceled(attempt));
            }

            if let Some(max) = self.config.max_attempts {
                if attempt >= max {
                    return Err(JobError::new(
                        ErrorKind::TimedOut,
                        format!("No terminal state after {attempt} poll attempts"),
                    )
                    .with_cause("max_attempts"));
                }
            }

            let now = self.clock.now();
            if let Some(deadline) = deadline {
                let next = now.checked_add(delay);
                if next.is_none_or(|next| next >= deadline) {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(canceled(attempt)),
                        _ = self.clock.sleep(deadline.saturating_duration_since(now)) => {}
                    }
                    let elapsed = self.clock.now().saturating_duration_since(started);
                    return Err(JobError::new(
                        ErrorKind::TimedOut,
                        format!(
                            "No terminal state within {} ms ({attempt} poll attempts)",
                            elapsed.as_millis()
                        ),
                    )
                    .with_cause("max_elapsed"));
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(canceled(attempt)),
                _ = self.clock.sleep(delay) => {}
            }

            attempt += 1;
            let poll = PollAttempt {
                attempt_number: attempt,
                scheduled_delay: delay,
                issued_at: self.clock.utc_now(),
            };
            tracing::debug!(
                provider = %provider,
                provider_job_id = %handle.provider_job_id,
                attempt = poll.attempt_number,
                delay_ms = poll.scheduled_delay.as_millis() as u64,
                issued_at = %poll.issued_at,
                "Poll attempt",
            );

            // Short-lived tokens are minted per attempt so long runs never
            // poll with an expired one.
            let credential = self
                .credentials
                .get_credential(provider)
                .map_err(JobError::from)?;

            let mut terminal = None;
            match self.adapter.poll(&handle, &credential).await {
                Err(e) => {
                    tracing::warn!(
                        provider = %provider,
                        provider_job_id = %handle.provider_job_id,
                        attempt,
                        error = %e,
                        "Poll attempt failed, retrying",
                    );
                }
                Ok(raw) => {
                    let normalized = normalize(raw.provider, &raw.body);
                    previews = normalized.preview_outputs;
                    match (normalized.result, normalized.state) {
                        (Some(result), _) => {
                            state = JobState::Succeeded;
                            terminal = Some(Ok(result));
                        }
                        (None, JobState::Failed | JobState::TimedOut | JobState::Canceled) => {
                            let err = normalized.error.unwrap_or_else(|| {
                                JobError::new(ErrorKind::ProviderFailed, "Provider reported failure")
                            });
                            state = err.state();
                            terminal = Some(Err(err));
                        }
                        (None, JobState::Queued) => state = JobState::Queued,
                        (None, JobState::Processing | JobState::Succeeded) => {
                            state = JobState::Processing;
                            delay = self.config.next_delay(delay);
                        }
                    }
                }
            }

            on_tick(PollTick {
                attempt,
                state,
                elapsed: self.clock.now().saturating_duration_since(started),
                preview_outputs: &previews,
            });

            if let Some(outcome) = terminal {
                return outcome;
            }
        }
    }
}

fn canceled(attempts: u32) -> JobError {
    JobError::new(
        ErrorKind::Canceled,
        format!("Job canceled after {attempts} poll attempts"),
    )
}
