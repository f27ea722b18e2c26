//! Public entry point for running a generation job to completion.
//!
//! A run has two phases:
//!
//! - [`JobOrchestrator::submit`] validates, obtains a credential, and submits
//!   (retrying transport failures up to the provider's `submit_retries`).
//!   Immediate and rejected outcomes resolve here.
//! - [`JobOrchestrator::drive`] takes a pending job and runs the
//!   [`PollScheduler`] to a terminal state.
//!
//! [`JobOrchestrator::run`] chains both. Every run publishes an ordered
//! sequence of [`JobSnapshot`]s through its [`RunContext`]: one `Queued`
//! snapshot, one per poll attempt, then exactly one terminal snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use genjob_core::backoff::PollConfig;
use genjob_core::error::CoreError;
use genjob_core::job::{ErrorKind, JobError, JobHandle, JobRequest, JobResult, JobSnapshot};
use genjob_core::provider::ProviderId;
use genjob_core::types::JobId;
use genjob_providers::{CredentialProvider, ProviderAdapter, SubmitOutcome};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, TokioClock};
use crate::scheduler::PollScheduler;

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Per-run identity, cancellation, and snapshot sinks.
pub struct RunContext {
    pub job_id: JobId,
    pub cancel: CancellationToken,
    progress: Option<mpsc::UnboundedSender<JobSnapshot>>,
    status: Option<watch::Sender<JobSnapshot>>,
}

impl RunContext {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            cancel: CancellationToken::new(),
            progress: None,
            status: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Receive every snapshot, in order.
    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<JobSnapshot>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Keep only the latest snapshot.
    pub fn with_status(mut self, status: watch::Sender<JobSnapshot>) -> Self {
        self.status = Some(status);
        self
    }

    fn publish(&self, snapshot: &JobSnapshot) {
        if let Some(progress) = &self.progress {
            // A dropped receiver only means nobody is listening any more.
            let _ = progress.send(snapshot.clone());
        }
        if let Some(status) = &self.status {
            status.send_replace(snapshot.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// A job the provider accepted and that still needs polling.
pub struct PendingJob {
    handle: JobHandle,
    scheduler: Arc<PollScheduler>,
    started: Instant,
    snapshot: JobSnapshot,
}

impl PendingJob {
    pub fn provider_job_id(&self) -> &str {
        &self.handle.provider_job_id
    }

    pub fn snapshot(&self) -> &JobSnapshot {
        &self.snapshot
    }
}

/// Result of the submit phase.
pub enum Submission {
    /// Resolved without polling: immediate result, rejection, or a local
    /// failure. `snapshot` is the terminal snapshot already published.
    Resolved {
        outcome: Result<JobResult, JobError>,
        snapshot: JobSnapshot,
    },
    Pending(PendingJob),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Submits jobs to providers and polls them to completion.
///
/// Holds no per-job state; concurrent runs share only the per-provider
/// schedulers, the credential provider and the clock, all of which are
/// immutable.
pub struct JobOrchestrator {
    schedulers: HashMap<ProviderId, Arc<PollScheduler>>,
    credentials: Arc<dyn CredentialProvider>,
    clock: Arc<dyn Clock>,
    /// Successful runs never resolve faster than this.
    minimum_total_duration: Option<Duration>,
}

impl JobOrchestrator {
    /// Every adapter needs a valid poll config.
    pub fn new(
        adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
        credentials: Arc<dyn CredentialProvider>,
        poll_configs: HashMap<ProviderId, PollConfig>,
    ) -> Result<Self, CoreError> {
        Self::with_clock(adapters, credentials, poll_configs, Arc::new(TokioClock))
    }

    /// Like [`new`](Self::new), timing every run with `clock`.
    pub fn with_clock(
        adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
        credentials: Arc<dyn CredentialProvider>,
        mut poll_configs: HashMap<ProviderId, PollConfig>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let mut schedulers = HashMap::with_capacity(adapters.len());
        for (provider, adapter) in adapters {
            let config = poll_configs.remove(&provider).ok_or_else(|| {
                CoreError::Validation(format!("No poll config for provider '{provider}'"))
            })?;
            let scheduler = PollScheduler::new(
                adapter,
                Arc::clone(&credentials),
                config,
                Arc::clone(&clock),
            )
            .map_err(|e| CoreError::Validation(format!("Provider '{provider}': {e}")))?;
            schedulers.insert(provider, Arc::new(scheduler));
        }

        Ok(Self {
            schedulers,
            credentials,
            clock,
            minimum_total_duration: None,
        })
    }

    pub fn with_minimum_total_duration(mut self, minimum: Option<Duration>) -> Self {
        self.minimum_total_duration = minimum.filter(|d| !d.is_zero());
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Whether an adapter is registered for `provider`.
    pub fn supports(&self, provider: ProviderId) -> bool {
        self.schedulers.contains_key(&provider)
    }

    /// Run `request` to completion with a fresh job id and no observers.
    pub async fn run(&self, request: JobRequest) -> Result<JobResult, JobError> {
        self.run_with(request, RunContext::new(uuid::Uuid::new_v4()))
            .await
    }

    /// Run `request` to completion, publishing snapshots through `ctx`.
    pub async fn run_with(
        &self,
        request: JobRequest,
        ctx: RunContext,
    ) -> Result<JobResult, JobError> {
        match self.submit(&request, &ctx).await {
            Submission::Resolved { outcome, .. } => outcome,
            Submission::Pending(pending) => self.drive(pending, &ctx).await,
        }
    }

    /// Phase 1: validate and submit.
    pub async fn submit(&self, request: &JobRequest, ctx: &RunContext) -> Submission {
        let started = self.clock.now();
        let snapshot = JobSnapshot::queued(ctx.job_id, request.provider, request.kind);
        ctx.publish(&snapshot);

        tracing::info!(
            job_id = %ctx.job_id,
            provider = %request.provider,
            kind = %request.kind,
            "Submitting job",
        );

        let scheduler = match self.route(request.provider) {
            Ok(scheduler) => scheduler,
            Err(err) => return self.resolve(Err(err), started, snapshot, ctx).await,
        };
        if let Err(err) = scheduler.adapter().validate(request) {
            return self.resolve(Err(err), started, snapshot, ctx).await;
        }

        let outcome = self.submit_with_retries(request, scheduler, ctx).await;

        match outcome {
            SubmitOutcome::Immediate(result) => {
                self.resolve(Ok(result), started, snapshot, ctx).await
            }
            SubmitOutcome::Rejected(err) => self.resolve(Err(err), started, snapshot, ctx).await,
            SubmitOutcome::Pending { handle, eta } => {
                tracing::info!(
                    job_id = %ctx.job_id,
                    provider = %request.provider,
                    provider_job_id = %handle.provider_job_id,
                    eta_ms = eta.map(|d| d.as_millis() as u64),
                    "Job accepted by provider",
                );
                Submission::Pending(PendingJob {
                    handle,
                    scheduler: Arc::clone(scheduler),
                    started,
                    snapshot,
                })
            }
        }
    }

    /// Phase 2: poll a pending job to a terminal state.
    pub async fn drive(&self, pending: PendingJob, ctx: &RunContext) -> Result<JobResult, JobError> {
        let PendingJob {
            handle,
            scheduler,
            started,
            mut snapshot,
        } = pending;

        let outcome = scheduler
            .run(handle, started, &ctx.cancel, |tick| {
                snapshot.state = tick.state;
                snapshot.attempt = tick.attempt;
                snapshot.elapsed_ms = tick.elapsed.as_millis() as u64;
                snapshot.preview_outputs = tick.preview_outputs.to_vec();
                // The terminal snapshot is published once, by `finish`.
                if !tick.state.is_terminal() {
                    ctx.publish(&snapshot);
                }
            })
            .await;

        let (outcome, _) = self.finish(outcome, started, snapshot, ctx).await;
        outcome
    }

    // ---- private helpers ----

    fn route(&self, provider: ProviderId) -> Result<&Arc<PollScheduler>, JobError> {
        self.schedulers.get(&provider).ok_or_else(|| {
            JobError::validation(format!("No adapter configured for provider '{provider}'"))
        })
    }

    async fn submit_with_retries(
        &self,
        request: &JobRequest,
        scheduler: &PollScheduler,
        ctx: &RunContext,
    ) -> SubmitOutcome {
        let adapter = scheduler.adapter();
        let config = scheduler.config();
        let mut retries_left = config.submit_retries;
        loop {
            if ctx.cancel.is_cancelled() {
                return SubmitOutcome::Rejected(JobError::new(
                    ErrorKind::Canceled,
                    "Job canceled before submission",
                ));
            }

            let credential = match self.credentials.get_credential(request.provider) {
                Ok(credential) => credential,
                Err(e) => {
                    tracing::error!(
                        job_id = %ctx.job_id,
                        provider = %request.provider,
                        error = %e,
                        "Credential unavailable",
                    );
                    return SubmitOutcome::Rejected(e.into());
                }
            };

            match adapter.submit(request, &credential).await {
                SubmitOutcome::Rejected(err)
                    if err.kind == ErrorKind::Transport && retries_left > 0 =>
                {
                    retries_left -= 1;
                    tracing::warn!(
                        job_id = %ctx.job_id,
                        provider = %request.provider,
                        error = %err,
                        retries_left,
                        delay_ms = config.base_delay.as_millis() as u64,
                        "Submit failed in transport, retrying",
                    );
                    tokio::select! {
                        biased;
                        _ = ctx.cancel.cancelled() => {}
                        _ = self.clock.sleep(config.base_delay) => {}
                    }
                }
                outcome => return outcome,
            }
        }
    }

    async fn resolve(
        &self,
        outcome: Result<JobResult, JobError>,
        started: Instant,
        snapshot: JobSnapshot,
        ctx: &RunContext,
    ) -> Submission {
        let (outcome, snapshot) = self.finish(outcome, started, snapshot, ctx).await;
        Submission::Resolved { outcome, snapshot }
    }

    /// Pad successful runs, publish the terminal snapshot, and log.
    async fn finish(
        &self,
        outcome: Result<JobResult, JobError>,
        started: Instant,
        snapshot: JobSnapshot,
        ctx: &RunContext,
    ) -> (Result<JobResult, JobError>, JobSnapshot) {
        if let (Ok(_), Some(minimum)) = (&outcome, self.minimum_total_duration) {
            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed < minimum {
                self.clock.sleep(minimum - elapsed).await;
            }
        }

        let elapsed = self.clock.now().saturating_duration_since(started);
        let terminal = snapshot.resolved(&outcome, elapsed);

        match &outcome {
            Ok(result) => tracing::info!(
                job_id = %ctx.job_id,
                provider = %terminal.provider,
                attempts = terminal.attempt,
                elapsed_ms = terminal.elapsed_ms,
                outputs = result.outputs().len(),
                "Job succeeded",
            ),
            Err(err) => tracing::warn!(
                job_id = %ctx.job_id,
                provider = %terminal.provider,
                attempts = terminal.attempt,
                elapsed_ms = terminal.elapsed_ms,
                state = terminal.state.as_str(),
                kind = ?err.kind,
                cause = err.cause.as_deref(),
                error = %err,
                "Job did not succeed",
            ),
        }

        ctx.publish(&terminal);
        (outcome, terminal)
    }
}
