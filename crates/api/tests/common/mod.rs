#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use genjob_core::backoff::PollConfig;
use genjob_core::job::{JobError, JobHandle, JobRequest, JobResult};
use genjob_core::provider::ProviderId;
use genjob_engine::{JobOrchestrator, JobService};
use genjob_providers::credentials::{ConfiguredCredentials, StaticKeyCredentials};
use genjob_providers::{
    Credential, CredentialProvider, ProviderAdapter, RawPollResponse, SubmitOutcome,
    TransportError,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use genjob_api::config::ServerConfig;
use genjob_api::router::build_app_router;
use genjob_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        job_retention_secs: 3600,
        minimum_total_duration_ms: None,
    }
}

/// A ModelsLab stand-in that never touches the network.
///
/// Payloads must carry a string `prompt`. `"immediate": true` resolves during
/// submission; otherwise the job reports `processing` for `polls_to_finish - 1`
/// polls and then succeeds. `"submit_delay_secs": n` holds the submit request
/// open for `n` seconds first.
pub struct StubImageProvider {
    polls_to_finish: usize,
    polls: AtomicUsize,
}

impl StubImageProvider {
    pub fn new(polls_to_finish: usize) -> Self {
        Self {
            polls_to_finish,
            polls: AtomicUsize::new(0),
        }
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StubImageProvider {
    fn provider(&self) -> ProviderId {
        ProviderId::ModelsLab
    }

    fn validate(&self, request: &JobRequest) -> Result<(), JobError> {
        match request.field("prompt") {
            Some(Value::String(p)) if !p.trim().is_empty() => Ok(()),
            _ => Err(JobError::validation("prompt is required")),
        }
    }

    async fn submit(&self, request: &JobRequest, _credential: &Credential) -> SubmitOutcome {
        if let Err(err) = self.validate(request) {
            return SubmitOutcome::Rejected(err);
        }
        if let Some(secs) = request.field("submit_delay_secs").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        if request.field("immediate").and_then(Value::as_bool) == Some(true) {
            let result = JobResult::new(vec!["https://cdn.test/now.png".into()])
                .expect("non-empty outputs");
            return SubmitOutcome::Immediate(result);
        }
        SubmitOutcome::Pending {
            handle: JobHandle::new("stub-1", "/fetch/stub-1"),
            eta: None,
        }
    }

    async fn poll(
        &self,
        _handle: &JobHandle,
        _credential: &Credential,
    ) -> Result<RawPollResponse, TransportError> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let body = if n >= self.polls_to_finish {
            json!({"status": "success", "output": ["https://cdn.test/done.png"]})
        } else {
            json!({"status": "processing"})
        };
        Ok(RawPollResponse {
            provider: ProviderId::ModelsLab,
            body,
        })
    }
}

/// Build a job service with `adapter` registered as the only provider,
/// polling every second for at most 20 attempts, configured the way
/// `main.rs` configures it.
pub fn test_service(adapter: Arc<StubImageProvider>) -> Arc<JobService> {
    let credentials: Arc<dyn CredentialProvider> = Arc::new(ConfiguredCredentials::new().with_source(
        ProviderId::ModelsLab,
        StaticKeyCredentials::api_key(Some("test-key".into())),
    ));
    let adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>> =
        HashMap::from([(ProviderId::ModelsLab, adapter as Arc<dyn ProviderAdapter>)]);
    let poll_configs = HashMap::from([(
        ProviderId::ModelsLab,
        PollConfig::fixed(Duration::from_millis(1000), 20),
    )]);

    let orchestrator =
        JobOrchestrator::new(adapters, credentials, poll_configs).expect("valid poll config");
    Arc::new(JobService::new(Arc::new(orchestrator)).with_submit_wait(test_config().submit_wait()))
}

/// Build the full application router around `jobs`.
///
/// Uses the same [`build_app_router`] as `main.rs`, so tests exercise the
/// production middleware stack.
pub fn build_test_app(jobs: Arc<JobService>) -> Router {
    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs,
    };
    build_app_router(state, &config)
}

/// Send a GET request and return the response.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with an empty body and return the response.
pub async fn post(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
