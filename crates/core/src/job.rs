//! Canonical job lifecycle types.
//!
//! Every provider response, whatever its wire shape, is reduced to a
//! [`JobState`] plus either a [`JobResult`] or a [`JobError`]. Callers never
//! see raw provider fields.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::{GenerationKind, ProviderId};
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Succeeded,
    Failed,
    TimedOut,
    Canceled,
}

impl JobState {
    /// `true` for states from which no further transition can occur.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
            JobState::Canceled => "canceled",
        }
    }

    /// Parse a canonical state name (as produced by [`as_str`](Self::as_str)).
    pub fn from_canonical(s: &str) -> Option<Self> {
        [
            JobState::Queued,
            JobState::Processing,
            JobState::Succeeded,
            JobState::Failed,
            JobState::TimedOut,
            JobState::Canceled,
        ]
        .into_iter()
        .find(|state| state.as_str().eq_ignore_ascii_case(s))
    }
}

// ---------------------------------------------------------------------------
// JobRequest / JobHandle
// ---------------------------------------------------------------------------

/// One logical request to a provider. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    pub provider: ProviderId,
    pub kind: GenerationKind,
    /// Provider-specific fields, validated by the provider adapter.
    pub payload: serde_json::Value,
    pub submitted_at: Timestamp,
}

impl JobRequest {
    pub fn new(provider: ProviderId, kind: GenerationKind, payload: serde_json::Value) -> Self {
        Self {
            provider,
            kind,
            payload,
            submitted_at: chrono::Utc::now(),
        }
    }

    /// Look up a top-level payload field, treating JSON `null` as absent.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name).filter(|v| !v.is_null())
    }
}

/// Poll target returned by a provider that accepted a job asynchronously.
///
/// Moved into the poll scheduler that drives it, so a handle can never be
/// polled by two loops at once.
#[derive(Debug)]
pub struct JobHandle {
    /// The provider's own identifier for the job.
    pub provider_job_id: String,
    /// URL or path the adapter polls.
    pub poll_target: String,
    pub created_at: Timestamp,
    /// Provider's estimate of time to completion, if it gave one.
    pub provider_eta: Option<Duration>,
}

impl JobHandle {
    pub fn new(provider_job_id: impl Into<String>, poll_target: impl Into<String>) -> Self {
        Self {
            provider_job_id: provider_job_id.into(),
            poll_target: poll_target.into(),
            created_at: chrono::Utc::now(),
            provider_eta: None,
        }
    }

    pub fn with_eta(mut self, eta: Option<Duration>) -> Self {
        self.provider_eta = eta;
        self
    }
}

// ---------------------------------------------------------------------------
// JobResult
// ---------------------------------------------------------------------------

/// Successful outcome of a job. `outputs` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    outputs: Vec<String>,
    preview_outputs: Vec<String>,
    generation_time_secs: Option<f64>,
    provider_meta: serde_json::Value,
}

impl JobResult {
    /// Build a result from final output URIs.
    ///
    /// Returns `None` when `outputs` is empty: a success without output is
    /// not a success.
    pub fn new(outputs: Vec<String>) -> Option<Self> {
        if outputs.is_empty() {
            return None;
        }
        Some(Self {
            outputs,
            preview_outputs: Vec::new(),
            generation_time_secs: None,
            provider_meta: serde_json::Value::Null,
        })
    }

    pub fn with_preview_outputs(mut self, previews: Vec<String>) -> Self {
        self.preview_outputs = previews;
        self
    }

    pub fn with_generation_time(mut self, secs: Option<f64>) -> Self {
        self.generation_time_secs = secs;
        self
    }

    pub fn with_provider_meta(mut self, meta: serde_json::Value) -> Self {
        self.provider_meta = meta;
        self
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Provisional links the provider exposed before the final output. Never
    /// part of [`outputs`](Self::outputs).
    pub fn preview_outputs(&self) -> &[String] {
        &self.preview_outputs
    }

    pub fn generation_time_secs(&self) -> Option<f64> {
        self.generation_time_secs
    }

    pub fn provider_meta(&self) -> &serde_json::Value {
        &self.provider_meta
    }
}

// ---------------------------------------------------------------------------
// JobError
// ---------------------------------------------------------------------------

/// Failure taxonomy for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Local, pre-network validation failed. Never retried.
    Validation,
    /// Required secret material is missing from configuration.
    CredentialUnavailable,
    /// Network error or non-2xx response.
    Transport,
    /// The provider explicitly refused the submission.
    ProviderRejected,
    /// The provider reported failure while the job was being polled.
    ProviderFailed,
    /// The poll budget ran out before a terminal state.
    TimedOut,
    /// The caller cancelled the job.
    Canceled,
}

impl ErrorKind {
    /// Terminal [`JobState`] a job ends in when it fails with this kind.
    pub fn state(self) -> JobState {
        match self {
            ErrorKind::TimedOut => JobState::TimedOut,
            ErrorKind::Canceled => JobState::Canceled,
            _ => JobState::Failed,
        }
    }
}

/// Unsuccessful outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    /// Underlying cause (HTTP status, provider error code, ...), if known.
    pub cause: Option<String>,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn state(&self) -> JobState {
        self.kind.state()
    }
}

// ---------------------------------------------------------------------------
// PollAttempt / JobSnapshot
// ---------------------------------------------------------------------------

/// One scheduled poll of a job handle.
#[derive(Debug, Clone, PartialEq)]
pub struct PollAttempt {
    /// 1-based, strictly increasing per handle.
    pub attempt_number: u32,
    pub scheduled_delay: Duration,
    pub issued_at: Timestamp,
}

/// Point-in-time view of a job, used for progress streams and status lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub provider: ProviderId,
    pub kind: GenerationKind,
    pub state: JobState,
    /// Number of poll attempts issued so far.
    pub attempt: u32,
    /// Milliseconds since submission.
    pub elapsed_ms: u64,
    pub preview_outputs: Vec<String>,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
}

impl JobSnapshot {
    /// A freshly queued job with no attempts.
    pub fn queued(job_id: JobId, provider: ProviderId, kind: GenerationKind) -> Self {
        Self {
            job_id,
            provider,
            kind,
            state: JobState::Queued,
            attempt: 0,
            elapsed_ms: 0,
            preview_outputs: Vec::new(),
            result: None,
            error: None,
        }
    }

    /// Copy of this snapshot moved to its terminal state for `outcome`.
    pub fn resolved(&self, outcome: &Result<JobResult, JobError>, elapsed: Duration) -> Self {
        let mut next = self.clone();
        next.elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Ok(result) => {
                next.state = JobState::Succeeded;
                next.result = Some(result.clone());
                next.error = None;
            }
            Err(err) => {
                next.state = err.state();
                next.result = None;
                next.error = Some(err.clone());
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Processing.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
        assert!(JobState::Canceled.is_terminal());
    }

    #[test]
    fn canonical_names_round_trip() {
        for state in [JobState::Queued, JobState::Succeeded, JobState::TimedOut] {
            assert_eq!(JobState::from_canonical(state.as_str()), Some(state));
        }
        assert_eq!(JobState::from_canonical("SUCCEEDED"), Some(JobState::Succeeded));
        assert_eq!(JobState::from_canonical("succeed"), None);
    }

    #[test]
    fn result_requires_outputs() {
        assert!(JobResult::new(vec![]).is_none());
        let result = JobResult::new(vec!["https://cdn/x.png".into()]).unwrap();
        assert_eq!(result.outputs().to_vec(), vec!["https://cdn/x.png".to_string()]);
        assert!(result.preview_outputs().is_empty());
    }

    #[test]
    fn error_kind_maps_to_terminal_state() {
        assert_eq!(ErrorKind::TimedOut.state(), JobState::TimedOut);
        assert_eq!(ErrorKind::Canceled.state(), JobState::Canceled);
        assert_eq!(ErrorKind::ProviderFailed.state(), JobState::Failed);
        assert_eq!(ErrorKind::Validation.state(), JobState::Failed);
    }

    #[test]
    fn job_error_displays_message() {
        let err = JobError::new(ErrorKind::ProviderFailed, "content policy").with_cause("1301");
        assert_eq!(err.to_string(), "content policy");
        assert_eq!(err.cause.as_deref(), Some("1301"));
    }

    #[test]
    fn request_field_treats_null_as_absent() {
        let req = JobRequest::new(
            ProviderId::Kling,
            GenerationKind::Video,
            serde_json::json!({"prompt": "cat", "image_tail": null}),
        );
        assert!(req.field("prompt").is_some());
        assert!(req.field("image_tail").is_none());
        assert!(req.field("missing").is_none());
    }

    #[test]
    fn resolved_snapshot_carries_error() {
        let snap = JobSnapshot::queued(
            uuid::Uuid::new_v4(),
            ProviderId::Replicate,
            GenerationKind::Music,
        );
        let outcome = Err(JobError::new(ErrorKind::TimedOut, "budget exhausted"));
        let done = snap.resolved(&outcome, Duration::from_millis(3000));
        assert_eq!(done.state, JobState::TimedOut);
        assert_eq!(done.elapsed_ms, 3000);
        assert!(done.result.is_none());
        assert_eq!(done.error.unwrap().kind, ErrorKind::TimedOut);
    }
}
