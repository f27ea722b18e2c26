use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::{on, MethodFilter};
use axum::{Json, Router};
use serde_json::Value;

/// One request the stub provider received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub prefer: Option<String>,
    pub body: Value,
}

/// A canned route: each hit returns the next response, the last one repeats.
pub struct Canned {
    pub filter: MethodFilter,
    pub path: String,
    pub responses: Vec<(StatusCode, Value)>,
}

impl Canned {
    pub fn get(path: impl Into<String>, responses: Vec<(StatusCode, Value)>) -> Self {
        Self {
            filter: MethodFilter::GET,
            path: path.into(),
            responses,
        }
    }

    pub fn post(path: impl Into<String>, responses: Vec<(StatusCode, Value)>) -> Self {
        Self {
            filter: MethodFilter::POST,
            path: path.into(),
            responses,
        }
    }
}

/// A local HTTP server standing in for an external provider.
pub struct StubProvider {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubProvider {
    /// Bind to an ephemeral port and serve the routes built by `routes`,
    /// which receives the stub's base URL so bodies can point back at it.
    pub async fn start(routes: impl FnOnce(&str) -> Vec<Canned>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let mut router = Router::new();
        for canned in routes(&base_url) {
            let requests = Arc::clone(&requests);
            let responses = Arc::new(canned.responses);
            let served = Arc::new(AtomicUsize::new(0));
            let handler = move |method: Method, uri: Uri, headers: HeaderMap, bytes: Bytes| {
                let requests = Arc::clone(&requests);
                let responses = Arc::clone(&responses);
                let served = Arc::clone(&served);
                async move {
                    let header = |name: &str| {
                        headers
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(String::from)
                    };
                    requests.lock().unwrap().push(Recorded {
                        method,
                        path: uri.path().to_string(),
                        authorization: header("authorization"),
                        prefer: header("prefer"),
                        body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
                    });
                    let n = served.fetch_add(1, Ordering::SeqCst);
                    let (status, body) = responses[n.min(responses.len() - 1)].clone();
                    (status, Json(body))
                }
            };
            router = router.route(&canned.path, on(canned.filter, handler));
        }

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { base_url, requests }
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn client() -> reqwest::Client {
    genjob_providers::http::build_http_client(std::time::Duration::from_secs(5)).unwrap()
}
