//! Shared HTTP plumbing for provider adapters.
//!
//! Wraps [`reqwest`] response handling so that every adapter classifies
//! failures the same way: network errors and non-2xx statuses become
//! [`TransportError`], bodies are decoded as untyped JSON for the normalizer.

use std::time::Duration;

/// Errors from the provider HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body was not the JSON the adapter expected.
    #[error("Malformed provider response: {0}")]
    Decode(String),

    /// A 2xx response carrying an in-band error the provider expects to
    /// clear on retry (overload, rate limit).
    #[error("Provider error {code}: {message}")]
    Provider { code: String, message: String },
}

impl TransportError {
    /// `true` when the provider refused the request outright.
    ///
    /// Client errors are refusals, except 408 and 429 which say "try later".
    pub fn is_rejection(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }

    /// Short machine-readable cause for [`genjob_core::job::JobError::cause`].
    pub fn cause(&self) -> String {
        match self {
            TransportError::Request(e) if e.is_timeout() => "timeout".to_string(),
            TransportError::Request(_) => "request".to_string(),
            TransportError::Status { status, .. } => format!("http_{status}"),
            TransportError::Decode(_) => "decode".to_string(),
            TransportError::Provider { code, .. } => format!("provider_{code}"),
        }
    }
}

/// Build the HTTP client shared by all adapters.
///
/// Every request carries `timeout`, so a hung provider can never stall a
/// poll loop past its budget.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Join a poll target onto a base URL unless it is already absolute.
pub(crate) fn resolve_url(base_url: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), target)
    }
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`TransportError::Status`] containing the
/// status and body text on failure.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Check the status and decode a JSON body.
pub(crate) async fn read_json(
    response: reqwest::Response,
) -> Result<serde_json::Value, TransportError> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
}
