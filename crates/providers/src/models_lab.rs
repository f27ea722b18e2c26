//! ModelsLab adapter for image, deepfake and 3D generation.
//!
//! ModelsLab takes its API key inside the JSON body, answers synchronously
//! when the result is ready, and otherwise returns a `fetch_result` URL plus
//! an ETA. While processing it may expose `future_links`, which are surfaced
//! as previews only.

use async_trait::async_trait;
use genjob_core::job::{JobError, JobHandle, JobRequest};
use genjob_core::provider::{GenerationKind, ProviderId};
use serde_json::Value;

use crate::adapter::{
    outcome_from_submit_body, rejected_from_transport, ProviderAdapter, RawPollResponse,
    SubmitOutcome,
};
use crate::credentials::Credential;
use crate::http::{read_json, resolve_url, TransportError};
use crate::validation::{number_in_range, require_any};

/// Submit and fetch paths for one ModelsLab endpoint family.
struct Endpoint {
    submit: &'static str,
    fetch: &'static str,
}

static TEXT_TO_IMAGE: Endpoint = Endpoint {
    submit: "/v6/images/text2img",
    fetch: "/v6/images/fetch",
};
static IMAGE_TO_IMAGE: Endpoint = Endpoint {
    submit: "/v6/images/img2img",
    fetch: "/v6/images/fetch",
};
static FACE_SWAP: Endpoint = Endpoint {
    submit: "/v6/deepfake/single_face_swap",
    fetch: "/v6/deepfake/fetch",
};
static TEXT_TO_3D: Endpoint = Endpoint {
    submit: "/v6/3d/text_to_3d",
    fetch: "/v6/3d/fetch",
};
static IMAGE_TO_3D: Endpoint = Endpoint {
    submit: "/v6/3d/image_to_3d",
    fetch: "/v6/3d/fetch",
};

/// HTTP adapter for the ModelsLab API.
pub struct ModelsLabAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl ModelsLabAdapter {
    /// * `base_url` - API root, e.g. `https://modelslab.com/api`.
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn endpoint_for(request: &JobRequest) -> Result<&'static Endpoint, JobError> {
        match request.kind {
            GenerationKind::Image if request.field("init_image").is_some() => Ok(&IMAGE_TO_IMAGE),
            GenerationKind::Image => Ok(&TEXT_TO_IMAGE),
            GenerationKind::Deepfake => Ok(&FACE_SWAP),
            GenerationKind::ThreeD if request.field("image").is_some() => Ok(&IMAGE_TO_3D),
            GenerationKind::ThreeD => Ok(&TEXT_TO_3D),
            other => Err(JobError::validation(format!(
                "ModelsLab does not serve '{other}' jobs"
            ))),
        }
    }

    /// Request body with the API key merged in.
    fn body_with_key(payload: &Value, credential: &Credential) -> Value {
        let mut body = payload.clone();
        if let Value::Object(map) = &mut body {
            map.insert("key".to_string(), Value::String(credential.secret().to_string()));
        }
        body
    }
}

#[async_trait]
impl ProviderAdapter for ModelsLabAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::ModelsLab
    }

    fn validate(&self, request: &JobRequest) -> Result<(), JobError> {
        let p = &request.payload;
        if !p.is_object() {
            return Err(JobError::validation("ModelsLab payload must be a JSON object"));
        }
        Self::endpoint_for(request)?;

        match request.kind {
            GenerationKind::Image => {
                require_any(p, &["prompt"])?;
                number_in_range(p, "width", 256.0, 1024.0)?;
                number_in_range(p, "height", 256.0, 1024.0)?;
                number_in_range(p, "samples", 1.0, 4.0)?;
                number_in_range(p, "num_inference_steps", 1.0, 50.0)?;
                number_in_range(p, "guidance_scale", 1.0, 20.0)?;
                number_in_range(p, "strength", 0.0, 1.0)?;
            }
            GenerationKind::Deepfake => {
                require_any(p, &["init_image"])?;
                require_any(p, &["target_image"])?;
            }
            GenerationKind::ThreeD => {
                require_any(p, &["prompt", "image"])?;
                number_in_range(p, "guidance_scale", 1.0, 20.0)?;
                number_in_range(p, "num_inference_steps", 1.0, 100.0)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn submit(&self, request: &JobRequest, credential: &Credential) -> SubmitOutcome {
        if let Err(err) = self.validate(request) {
            return SubmitOutcome::Rejected(err);
        }
        let endpoint = match Self::endpoint_for(request) {
            Ok(endpoint) => endpoint,
            Err(err) => return SubmitOutcome::Rejected(err),
        };

        let response = match self
            .client
            .post(resolve_url(&self.base_url, endpoint.submit))
            .json(&Self::body_with_key(&request.payload, credential))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return rejected_from_transport(ProviderId::ModelsLab, e.into()),
        };
        let body = match read_json(response).await {
            Ok(body) => body,
            Err(e) => return rejected_from_transport(ProviderId::ModelsLab, e),
        };

        outcome_from_submit_body(ProviderId::ModelsLab, &body, |body| {
            let id = match body.get("id")? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let target = body
                .get("fetch_result")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| format!("{}/{id}", endpoint.fetch));
            tracing::info!(provider = "models_lab", id = %id, "ModelsLab job queued");
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
            .post(resolve_url(&self.base_url, &handle.poll_target))
            .json(&serde_json::json!({ "key": credential.secret() }))
            .send()
            .await?;
        let body = read_json(response).await?;
        Ok(RawPollResponse {
            provider: ProviderId::ModelsLab,
            body,
        })
    }
}
