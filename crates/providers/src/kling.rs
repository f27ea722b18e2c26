//! Kling video generation adapter.
//!
//! Submits text-to-video or image-to-video tasks (chosen by whether the
//! payload carries an `image`) and polls the task endpoint. Every response is
//! wrapped in `{"code", "message", "data"}`; a non-zero `code` is an explicit
//! provider error. Transient codes surface as [`TransportError::Provider`] and
//! are retried; the normalizer reads every other code as a terminal failure.

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
use crate::validation::{
    max_chars, mutually_exclusive, number_in_range, one_of, require_any, ExclusiveGroup,
};

const TEXT_TO_VIDEO_PATH: &str = "/v1/videos/text2video";
const IMAGE_TO_VIDEO_PATH: &str = "/v1/videos/image2video";

/// Maximum prompt / negative prompt length in characters.
pub const MAX_PROMPT_CHARS: usize = 2500;
/// Allowed clip durations in seconds.
pub const VALID_DURATIONS: &[&str] = &["5", "10"];
pub const VALID_MODES: &[&str] = &["std", "pro"];
pub const VALID_ASPECT_RATIOS: &[&str] = &["16:9", "9:16", "1:1"];

/// Field groups that may not be combined with each other.
const EXCLUSIVE_GROUPS: &[ExclusiveGroup<'static>] = &[
    ExclusiveGroup {
        name: "image_tail",
        fields: &["image_tail"],
    },
    ExclusiveGroup {
        name: "mask",
        fields: &["static_mask", "dynamic_masks"],
    },
    ExclusiveGroup {
        name: "camera_control",
        fields: &["camera_control"],
    },
];

/// HTTP adapter for the Kling API.
pub struct KlingAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl KlingAdapter {
    /// * `base_url` - API root, e.g. `https://api.klingai.com`.
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn endpoint_for(request: &JobRequest) -> &'static str {
        if request.field("image").is_some() {
            IMAGE_TO_VIDEO_PATH
        } else {
            TEXT_TO_VIDEO_PATH
        }
    }

    /// An in-band error code that clears on retry: 5xxx server faults, 1302
    /// (rate limit) and 1303 (concurrency limit).
    fn transient_error(body: &Value) -> Option<TransportError> {
        let code = body
            .get("code")
            .and_then(Value::as_i64)
            .filter(|&code| code >= 5000 || matches!(code, 1302 | 1303))?;
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Kling returned an error");
        Some(TransportError::Provider {
            code: code.to_string(),
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl ProviderAdapter for KlingAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Kling
    }

    fn validate(&self, request: &JobRequest) -> Result<(), JobError> {
        let p = &request.payload;
        if !p.is_object() {
            return Err(JobError::validation("Kling payload must be a JSON object"));
        }
        require_any(p, &["prompt", "image"])?;
        max_chars(p, "prompt", MAX_PROMPT_CHARS)?;
        max_chars(p, "negative_prompt", MAX_PROMPT_CHARS)?;
        number_in_range(p, "cfg_scale", 0.0, 1.0)?;
        one_of(p, "duration", VALID_DURATIONS)?;
        one_of(p, "mode", VALID_MODES)?;
        one_of(p, "aspect_ratio", VALID_ASPECT_RATIOS)?;
        mutually_exclusive(p, EXCLUSIVE_GROUPS)?;

        let needs_image = ["image_tail", "static_mask", "dynamic_masks"]
            .iter()
            .find(|f| request.field(f).is_some());
        if let (Some(field), None) = (needs_image, request.field("image")) {
            return Err(JobError::validation(format!(
                "'{field}' requires an 'image'"
            )));
        }
        Ok(())
    }

    async fn submit(&self, request: &JobRequest, credential: &Credential) -> SubmitOutcome {
        if let Err(err) = self.validate(request) {
            return SubmitOutcome::Rejected(err);
        }

        let path = Self::endpoint_for(request);
        let response = match self
            .client
            .post(resolve_url(&self.base_url, path))
            .bearer_auth(credential.secret())
            .json(&request.payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return rejected_from_transport(ProviderId::Kling, e.into()),
        };
        let body = match read_json(response).await {
            Ok(body) => body,
            Err(e) => return rejected_from_transport(ProviderId::Kling, e),
        };

        if let Some(e) = Self::transient_error(&body) {
            return rejected_from_transport(ProviderId::Kling, e);
        }

        outcome_from_submit_body(ProviderId::Kling, &body, |body| {
            let task_id = body.pointer("/data/task_id").and_then(Value::as_str)?;
            tracing::info!(provider = "kling", task_id, "Kling task created");
            Some(JobHandle::new(task_id, format!("{path}/{task_id}")))
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

        if let Some(e) = Self::transient_error(&body) {
            return Err(e);
        }

        Ok(RawPollResponse {
            provider: ProviderId::Kling,
            body,
        })
    }
}
