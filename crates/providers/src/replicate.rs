//! Replicate predictions adapter, used for music generation.
//!
//! Submits a prediction for a pinned model `version` and polls the
//! prediction's `urls.get` endpoint. Replicate may finish short predictions
//! within the submit call when asked to wait, in which case the submit
//! response already carries the output.

use async_trait::async_trait;
use genjob_core::job::{JobError, JobHandle, JobRequest};
use genjob_core::provider::ProviderId;
use serde_json::Value;

use crate::adapter::{
    outcome_from_submit_body, rejected_from_transport, ProviderAdapter, RawPollResponse,
    SubmitOutcome,
};
use crate::credentials::Credential;
use crate::http::{read_json, resolve_url, TransportError};
use crate::validation::{number_in_range, require_any};

const PREDICTIONS_PATH: &str = "/v1/predictions";

/// Seconds Replicate may hold the submit request open waiting for a result.
const SYNC_WAIT_SECS: u32 = 5;

/// HTTP adapter for the Replicate API.
pub struct ReplicateAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl ReplicateAdapter {
    /// * `base_url` - API root, e.g. `https://api.replicate.com`.
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl ProviderAdapter for ReplicateAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Replicate
    }

    fn validate(&self, request: &JobRequest) -> Result<(), JobError> {
        let p = &request.payload;
        if !p.is_object() {
            return Err(JobError::validation("Replicate payload must be a JSON object"));
        }
        require_any(p, &["version"])?;
        if !p["version"].is_string() {
            return Err(JobError::validation("'version' must be a string"));
        }

        let input = &p["input"];
        if !(input.is_null() || input.is_object()) {
            return Err(JobError::validation("'input' must be a JSON object"));
        }
        number_in_range(input, "duration", 1.0, 300.0)?;
        number_in_range(input, "temperature", 0.0, 2.0)?;
        number_in_range(input, "top_k", 0.0, 1000.0)?;
        number_in_range(input, "top_p", 0.0, 1.0)?;
        Ok(())
    }

    async fn submit(&self, request: &JobRequest, credential: &Credential) -> SubmitOutcome {
        if let Err(err) = self.validate(request) {
            return SubmitOutcome::Rejected(err);
        }

        let body = serde_json::json!({
            "version": request.payload["version"],
            "input": request.field("input").cloned().unwrap_or_else(|| serde_json::json!({})),
        });

        let response = match self
            .client
            .post(resolve_url(&self.base_url, PREDICTIONS_PATH))
            .bearer_auth(credential.secret())
            .header("Prefer", format!("wait={SYNC_WAIT_SECS}"))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return rejected_from_transport(ProviderId::Replicate, e.into()),
        };
        let body = match read_json(response).await {
            Ok(body) => body,
            Err(e) => return rejected_from_transport(ProviderId::Replicate, e),
        };

        outcome_from_submit_body(ProviderId::Replicate, &body, |body| {
            let id = body.get("id").and_then(Value::as_str)?;
            let target = body
                .pointer("/urls/get")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| format!("{PREDICTIONS_PATH}/{id}"));
            tracing::info!(provider = "replicate", prediction_id = id, "Prediction created");
            Some(JobHandle::new(id, target))
        })
    }

    async fn poll(
        &self,
        handle: &JobHandle,
        credential: &Credential,
    ) -> Result<RawPollResponse, TransportError> {
        let response = self
            .client
            .get(resolve_url(&self.base_url, &handle.poll_target))
            .bearer_auth(credential.secret())
            .send()
            .await?;
        let body = read_json(response).await?;
        Ok(RawPollResponse {
            provider: ProviderId::Replicate,
            body,
        })
    }
}
