//! The provider adapter seam.
//!
//! A [`ProviderAdapter`] owns everything provider-specific about a job:
//! local validation, the submit call, and the poll call. Submission always
//! yields a typed [`SubmitOutcome`]; transport failures are folded into
//! [`SubmitOutcome::Rejected`] with [`ErrorKind::Transport`] so callers can
//! decide whether to retry.

use std::time::Duration;

use async_trait::async_trait;
use genjob_core::job::{ErrorKind, JobError, JobHandle, JobRequest, JobResult, JobState};
use genjob_core::provider::ProviderId;

use crate::credentials::Credential;
use crate::http::TransportError;
use crate::normalizer::normalize;

/// Result of submitting a job to a provider.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The provider finished synchronously.
    Immediate(JobResult),
    /// The provider accepted the job and returned a poll target.
    Pending {
        handle: JobHandle,
        eta: Option<Duration>,
    },
    /// Local validation or the provider refused the job, or the submit call
    /// failed in transport.
    Rejected(JobError),
}

/// One raw poll body, ready for the normalizer.
#[derive(Debug, Clone)]
pub struct RawPollResponse {
    pub provider: ProviderId,
    pub body: serde_json::Value,
}

/// Submit/poll capability for one external provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> ProviderId;

    /// Local, pre-network checks on the request payload.
    fn validate(&self, request: &JobRequest) -> Result<(), JobError>;

    /// Validate, then submit. Never makes a network call when validation fails.
    async fn submit(&self, request: &JobRequest, credential: &Credential) -> SubmitOutcome;

    /// Fetch the current raw status of a pending job.
    async fn poll(
        &self,
        handle: &JobHandle,
        credential: &Credential,
    ) -> Result<RawPollResponse, TransportError>;
}

/// Classify a submit-time transport failure.
///
/// Client errors are provider rejections; everything else is a transport
/// error the orchestrator may retry.
pub(crate) fn rejected_from_transport(provider: ProviderId, err: TransportError) -> SubmitOutcome {
    let kind = if err.is_rejection() {
        ErrorKind::ProviderRejected
    } else {
        ErrorKind::Transport
    };
    tracing::warn!(provider = %provider, error = %err, ?kind, "Submit request failed");
    let cause = err.cause();
    SubmitOutcome::Rejected(JobError::new(kind, err.to_string()).with_cause(cause))
}

/// Turn a successful submit body into an outcome.
///
/// `handle_from` extracts the poll target when the provider accepted the job
/// asynchronously.
pub(crate) fn outcome_from_submit_body(
    provider: ProviderId,
    body: &serde_json::Value,
    handle_from: impl FnOnce(&serde_json::Value) -> Option<JobHandle>,
) -> SubmitOutcome {
    let normalized = normalize(provider, body);
    match normalized.state {
        JobState::Succeeded => match normalized.result {
            Some(result) => SubmitOutcome::Immediate(result),
            None => SubmitOutcome::Rejected(JobError::new(
                ErrorKind::ProviderRejected,
                "Provider reported success without a result",
            )),
        },
        JobState::Queued | JobState::Processing => match handle_from(body) {
            Some(handle) => {
                let eta = normalized.eta;
                SubmitOutcome::Pending {
                    handle: handle.with_eta(eta),
                    eta,
                }
            }
            None => SubmitOutcome::Rejected(JobError::new(
                ErrorKind::ProviderRejected,
                format!("{provider} accepted the job without returning a poll target"),
            )),
        },
        JobState::Failed | JobState::TimedOut | JobState::Canceled => {
            let err = normalized.error.unwrap_or_else(|| {
                JobError::new(ErrorKind::ProviderRejected, "Provider rejected the job")
            });
            SubmitOutcome::Rejected(JobError {
                kind: ErrorKind::ProviderRejected,
                ..err
            })
        }
    }
}
