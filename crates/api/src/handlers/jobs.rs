//! Handlers for the `/jobs` resource.
//!
//! Jobs live in memory only; a job id is valid until the job is pruned after
//! the configured retention window.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use genjob_core::error::CoreError;
use genjob_core::job::{ErrorKind, JobState};
use genjob_core::provider::{GenerationKind, ProviderId};
use genjob_core::types::JobId;
use genjob_engine::Submitted;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub kind: GenerationKind,
    /// Provider name; the kind's default provider when absent.
    #[serde(default)]
    pub provider: Option<String>,
    /// Provider-specific generation parameters.
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Returned when a job was accepted and is being polled in the background.
#[derive(Debug, Serialize)]
pub struct AcceptedJob {
    pub job_id: JobId,
    pub state: JobState,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Returns 201 with the job id when the provider accepted the job, or 200
/// with the terminal snapshot when it resolved during submission. A payload
/// rejected by local validation answers 400 `VALIDATION_ERROR`.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<Response> {
    let provider = input
        .provider
        .as_deref()
        .map(str::parse::<ProviderId>)
        .transpose()?;

    let submitted = state
        .jobs
        .submit_job(input.kind, provider, input.payload)
        .await?;

    match submitted {
        Submitted::Accepted(job_id) => {
            tracing::info!(job_id = %job_id, kind = %input.kind, "Job accepted");
            Ok((
                StatusCode::CREATED,
                Json(DataResponse {
                    data: AcceptedJob {
                        job_id,
                        state: JobState::Queued,
                    },
                }),
            )
                .into_response())
        }
        Submitted::Completed(snapshot) => {
            if let Some(err) = snapshot
                .error
                .as_ref()
                .filter(|e| e.kind == ErrorKind::Validation)
            {
                return Err(AppError::Core(CoreError::Validation(err.message.clone())));
            }
            tracing::info!(
                job_id = %snapshot.job_id,
                state = snapshot.state.as_str(),
                "Job completed during submission",
            );
            Ok(Json(DataResponse { data: snapshot }).into_response())
        }
    }
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Latest snapshot of a tracked job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state
        .jobs
        .get_job_status(job_id)
        .await
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id.to_string(),
        }))?;

    Ok(Json(DataResponse { data: snapshot }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Requests cancellation and returns 202 immediately. The job reaches
/// `canceled` before its next poll attempt.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<StatusCode> {
    state.jobs.cancel_job(job_id).await?;
    Ok(StatusCode::ACCEPTED)
}
