#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use genjob_core::backoff::PollConfig;
use genjob_core::job::{ErrorKind, JobError, JobHandle, JobRequest, JobResult};
use genjob_core::provider::ProviderId;
use genjob_engine::JobOrchestrator;
use genjob_providers::credentials::{ConfiguredCredentials, StaticKeyCredentials};
use genjob_providers::{
    Credential, CredentialProvider, ProviderAdapter, RawPollResponse, SubmitOutcome,
    TransportError,
};
use serde_json::{json, Value};
use tokio::time::Instant;

/// What the scripted provider answers to a submit.
#[derive(Debug, Clone)]
pub enum ScriptedSubmit {
    Pending { eta: Option<Duration> },
    /// Accepts the job after holding the request open this long.
    Slow(Duration),
    Immediate(Vec<String>),
    Reject(ErrorKind),
}

/// What the scripted provider answers to one poll.
#[derive(Debug, Clone)]
pub enum ScriptedPoll {
    Body(Value),
    /// HTTP failure with this status.
    Fail(u16),
}

pub fn processing() -> ScriptedPoll {
    ScriptedPoll::Body(json!({"status": "processing"}))
}

pub fn queued() -> ScriptedPoll {
    ScriptedPoll::Body(json!({"status": "queued"}))
}

pub fn succeeded(url: &str) -> ScriptedPoll {
    ScriptedPoll::Body(json!({"status": "success", "output": [url]}))
}

pub fn failed(message: &str) -> ScriptedPoll {
    ScriptedPoll::Body(json!({"status": "error", "message": message}))
}

/// A provider that replays scripted answers and records when it was polled.
///
/// Submit answers are consumed in order, the last one repeating; the same
/// holds for poll answers. Payloads containing `"invalid": true` fail local
/// validation. Poll bodies use the ModelsLab vocabulary, so `provider` should
/// usually be [`ProviderId::ModelsLab`].
pub struct ScriptedAdapter {
    provider: ProviderId,
    submits: Mutex<VecDeque<ScriptedSubmit>>,
    polls: Mutex<VecDeque<ScriptedPoll>>,
    submit_calls: AtomicUsize,
    poll_times: Mutex<Vec<Instant>>,
    next_id: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(provider: ProviderId, submits: Vec<ScriptedSubmit>, polls: Vec<ScriptedPoll>) -> Self {
        Self {
            provider,
            submits: Mutex::new(submits.into()),
            polls: Mutex::new(polls.into()),
            submit_calls: AtomicUsize::new(0),
            poll_times: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Accepts every submit and answers every poll from `polls`.
    pub fn pending(polls: Vec<ScriptedPoll>) -> Self {
        Self::new(
            ProviderId::ModelsLab,
            vec![ScriptedSubmit::Pending { eta: None }],
            polls,
        )
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> usize {
        self.poll_times.lock().unwrap().len()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.poll_times.lock().unwrap().clone()
    }

    /// Gaps between consecutive polls, the first measured from `origin`.
    pub fn poll_gaps(&self, origin: Instant) -> Vec<Duration> {
        let mut previous = origin;
        self.poll_times()
            .into_iter()
            .map(|t| {
                let gap = t - previous;
                previous = t;
                gap
            })
            .collect()
    }

    fn accept(&self, eta: Option<Duration>) -> SubmitOutcome {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        SubmitOutcome::Pending {
            handle: JobHandle::new(id.to_string(), format!("/fetch/{id}")).with_eta(eta),
            eta,
        }
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> T {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().expect("script must not be empty")
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    fn validate(&self, request: &JobRequest) -> Result<(), JobError> {
        if request.field("invalid").and_then(Value::as_bool) == Some(true) {
            return Err(JobError::validation("payload marked invalid"));
        }
        Ok(())
    }

    async fn submit(&self, request: &JobRequest, _credential: &Credential) -> SubmitOutcome {
        if let Err(err) = self.validate(request) {
            return SubmitOutcome::Rejected(err);
        }
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match Self::next(&self.submits) {
            ScriptedSubmit::Pending { eta } => self.accept(eta),
            ScriptedSubmit::Slow(delay) => {
                tokio::time::sleep(delay).await;
                self.accept(None)
            }
            ScriptedSubmit::Immediate(outputs) => {
                SubmitOutcome::Immediate(JobResult::new(outputs).expect("non-empty outputs"))
            }
            ScriptedSubmit::Reject(kind) => {
                SubmitOutcome::Rejected(JobError::new(kind, format!("scripted {kind:?}")))
            }
        }
    }

    async fn poll(
        &self,
        _handle: &JobHandle,
        _credential: &Credential,
    ) -> Result<RawPollResponse, TransportError> {
        self.poll_times.lock().unwrap().push(Instant::now());
        match Self::next(&self.polls) {
            ScriptedPoll::Body(body) => Ok(RawPollResponse {
                provider: self.provider,
                body,
            }),
            ScriptedPoll::Fail(status) => Err(TransportError::Status {
                status,
                body: "scripted failure".into(),
            }),
        }
    }
}

pub fn credentials() -> Arc<dyn CredentialProvider> {
    Arc::new(ConfiguredCredentials::new().with_source(
        ProviderId::ModelsLab,
        StaticKeyCredentials::api_key(Some("test-key".into())),
    ))
}

/// An orchestrator with one adapter registered under its own provider.
pub fn orchestrator(adapter: Arc<ScriptedAdapter>, config: PollConfig) -> JobOrchestrator {
    orchestrator_with(adapter, config, credentials())
}

pub fn orchestrator_with(
    adapter: Arc<ScriptedAdapter>,
    config: PollConfig,
    credentials: Arc<dyn CredentialProvider>,
) -> JobOrchestrator {
    let provider = adapter.provider();
    let adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>> =
        HashMap::from([(provider, adapter as Arc<dyn ProviderAdapter>)]);
    JobOrchestrator::new(adapters, credentials, HashMap::from([(provider, config)]))
        .expect("valid poll config")
}

pub fn request() -> JobRequest {
    JobRequest::new(
        ProviderId::ModelsLab,
        genjob_core::provider::GenerationKind::Image,
        json!({"prompt": "a lighthouse at dusk"}),
    )
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
