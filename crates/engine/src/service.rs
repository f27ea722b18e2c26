//! In-memory job registry behind the inbound API.
//!
//! [`JobService`] registers every job before it touches the network, then
//! runs it (submit, then poll) in a background task while callers look up
//! its latest snapshot by id. A submission waits a bounded time for the
//! submit phase: a synchronous provider answer comes back directly, anything
//! slower is answered with the job id. Each job's status lives in a `watch`
//! channel fed by its run, so lookups never contend with the poll loop.
//!
//! Finished jobs are kept for a retention window and pruned lazily on the
//! next submission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use genjob_core::job::{JobRequest, JobSnapshot, JobState};
use genjob_core::provider::{GenerationKind, ProviderId};
use genjob_core::types::JobId;
use tokio::sync::{oneshot, watch, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{JobOrchestrator, RunContext, Submission};

/// Default time a finished job stays queryable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Default time [`JobService::submit_job`] waits for the submit phase.
pub const DEFAULT_SUBMIT_WAIT: Duration = Duration::from_secs(15);

/// How long [`JobService::shutdown`] waits for each job task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from job registry operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job {job_id} already finished ({})", .state.as_str())]
    AlreadyFinished { job_id: JobId, state: JobState },

    #[error("No adapter configured for provider '{0}'")]
    UnknownProvider(ProviderId),
}

/// Answer to [`JobService::submit_job`].
#[derive(Debug)]
pub enum Submitted {
    /// The job resolved during submission; this is its terminal snapshot.
    Completed(JobSnapshot),
    /// The job is pending at the provider, or its submission is still in
    /// flight; poll its status by id.
    Accepted(JobId),
}

/// Bookkeeping for one submitted job.
struct TrackedJob {
    status: watch::Receiver<JobSnapshot>,
    /// Child of the service's master token.
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
    submitted_at: Instant,
}

impl TrackedJob {
    /// When the job reached a terminal state, if it has.
    fn finished_at(&self) -> Option<Instant> {
        let snapshot = self.status.borrow();
        snapshot
            .state
            .is_terminal()
            .then(|| self.submitted_at + Duration::from_millis(snapshot.elapsed_ms))
    }
}

/// Submits, tracks, and cancels generation jobs.
///
/// Created once at startup; the returned `Arc` is cheap to clone into
/// request handlers.
pub struct JobService {
    orchestrator: Arc<JobOrchestrator>,
    jobs: RwLock<HashMap<JobId, TrackedJob>>,
    retention: Duration,
    submit_wait: Duration,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl JobService {
    pub fn new(orchestrator: Arc<JobOrchestrator>) -> Self {
        Self {
            orchestrator,
            jobs: RwLock::new(HashMap::new()),
            retention: DEFAULT_RETENTION,
            submit_wait: DEFAULT_SUBMIT_WAIT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Cap on how long [`submit_job`](Self::submit_job) waits for the
    /// provider to accept or resolve a job. Keep it under any request
    /// timeout in front of the service.
    pub fn with_submit_wait(mut self, submit_wait: Duration) -> Self {
        self.submit_wait = submit_wait;
        self
    }

    /// Submit a job and either return its terminal snapshot or its id.
    ///
    /// `provider` defaults to the kind's default provider. The job is
    /// tracked, and runs to completion, even if the caller stops waiting.
    pub async fn submit_job(
        &self,
        kind: GenerationKind,
        provider: Option<ProviderId>,
        payload: serde_json::Value,
    ) -> Result<Submitted, ServiceError> {
        self.prune().await;

        let provider = provider.unwrap_or_else(|| kind.default_provider());
        if !self.orchestrator.supports(provider) {
            return Err(ServiceError::UnknownProvider(provider));
        }

        let job_id = uuid::Uuid::new_v4();
        let request = JobRequest::new(provider, kind, payload);
        let cancel = self.cancel.child_token();
        let (status_tx, status_rx) = watch::channel(JobSnapshot::queued(job_id, provider, kind));
        let ctx = RunContext::new(job_id)
            .with_cancel(cancel.clone())
            .with_status(status_tx);
        let submitted_at = self.orchestrator.clock().now();

        let (resolved_tx, resolved_rx) = oneshot::channel();
        {
            // Spawn and register under one lock so a dropped caller can
            // never leave a running job untracked.
            let mut jobs = self.jobs.write().await;
            let orchestrator = Arc::clone(&self.orchestrator);
            let task = tokio::spawn(async move {
                match orchestrator.submit(&request, &ctx).await {
                    Submission::Resolved { snapshot, .. } => {
                        let _ = resolved_tx.send(Some(snapshot));
                    }
                    Submission::Pending(pending) => {
                        let _ = resolved_tx.send(None);
                        // The outcome reaches callers through the status channel.
                        let _ = orchestrator.drive(pending, &ctx).await;
                    }
                }
            });
            jobs.insert(
                job_id,
                TrackedJob {
                    status: status_rx,
                    cancel,
                    task,
                    submitted_at,
                },
            );
        }

        match tokio::time::timeout(self.submit_wait, resolved_rx).await {
            Ok(Ok(Some(snapshot))) => Ok(Submitted::Completed(snapshot)),
            Ok(Ok(None)) => Ok(Submitted::Accepted(job_id)),
            Ok(Err(_)) => {
                tracing::error!(job_id = %job_id, "Job task ended before submission finished");
                Ok(Submitted::Accepted(job_id))
            }
            Err(_) => {
                tracing::info!(
                    job_id = %job_id,
                    wait_ms = self.submit_wait.as_millis() as u64,
                    "Submission still in flight, answering with job id",
                );
                Ok(Submitted::Accepted(job_id))
            }
        }
    }

    /// Latest snapshot for `job_id`, if it is still tracked.
    pub async fn get_job_status(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map(|job| job.status.borrow().clone())
    }

    /// Request cancellation of a running job.
    ///
    /// The job resolves to `Canceled` asynchronously, before its next poll
    /// attempt. Nothing is sent to the provider.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<(), ServiceError> {
        let jobs = self.jobs.read().await;
        let job = jobs.get(&job_id).ok_or(ServiceError::NotFound(job_id))?;

        let state = job.status.borrow().state;
        if state.is_terminal() {
            return Err(ServiceError::AlreadyFinished { job_id, state });
        }

        job.cancel.cancel();
        tracing::info!(job_id = %job_id, "Job cancellation requested");
        Ok(())
    }

    /// Number of tracked jobs not yet in a terminal state.
    pub async fn active_jobs(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| !job.status.borrow().state.is_terminal())
            .count()
    }

    /// Cancel every job and wait up to 5 seconds per task for a clean exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job service");
        self.cancel.cancel();

        let mut jobs = self.jobs.write().await;
        for (job_id, job) in jobs.drain() {
            tracing::debug!(job_id = %job_id, "Waiting for job task");
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, job.task).await.is_err() {
                tracing::warn!(job_id = %job_id, "Job task did not stop in time");
            }
        }

        tracing::info!("Job service shut down complete");
    }

    // ---- private helpers ----

    /// Drop finished jobs older than the retention window.
    async fn prune(&self) {
        let now = self.orchestrator.clock().now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| match job.finished_at() {
            Some(finished) => now.saturating_duration_since(finished) < self.retention,
            None => true,
        });
        let pruned = before - jobs.len();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = jobs.len(), "Pruned finished jobs");
        }
    }
}
