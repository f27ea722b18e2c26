//! Maps raw provider responses onto the canonical job model.
//!
//! Each provider is described by a static [`ProviderShape`]: where its status
//! lives, how its status vocabulary maps onto [`JobState`] (case-insensitive),
//! where final outputs and provisional preview links live, and where to find
//! error messages, ETAs and timing data. [`normalize`] is a pure function of
//! the provider and the body.
//!
//! Rules that hold for every provider:
//!
//! - Preview / "future" links only ever land in `preview_outputs`; they never
//!   count as outputs and never make a job `Succeeded`.
//! - A success-looking status with no output is still `Processing`.
//! - A canonical snapshot (`status`, `outputs`, `preview_outputs`, `error`)
//!   normalizes to itself for every provider, terminal state and error kind
//!   included. Its `error.kind` outranks the provider's own reading of a
//!   terminal status.

use std::time::Duration;

use genjob_core::job::{ErrorKind, JobError, JobResult, JobState};
use genjob_core::provider::ProviderId;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Shape tables
// ---------------------------------------------------------------------------

/// Where a provider puts its final output URIs.
#[derive(Debug, Clone, Copy)]
pub enum OutputLocation {
    /// Array of objects at `pointer`; each element's `field` is a URI.
    NestedArray {
        pointer: &'static str,
        field: &'static str,
    },
    /// Array of strings, or a single string, at `pointer`.
    Flat { pointer: &'static str },
    /// Array of strings, or a single string, in a top-level field of the
    /// body, ignoring any envelope.
    Root { field: &'static str },
}

/// Where a provider signals errors in-band, outside its task status.
#[derive(Debug, Clone, Copy)]
pub struct ErrorCode {
    /// Integer code at the body root; zero means success.
    pub code: &'static str,
    pub message: &'static str,
}

/// Declarative description of one provider's response layout.
///
/// Pointers are JSON pointers, resolved first inside the envelope (when the
/// provider wraps its payload and the envelope is present) and then against
/// the body root.
#[derive(Debug)]
pub struct ProviderShape {
    pub envelope: Option<&'static str>,
    /// A non-zero code fails the job whatever the status says.
    pub error_code: Option<ErrorCode>,
    pub status: &'static [&'static str],
    /// Raw status (compared case-insensitively) to canonical state.
    pub synonyms: &'static [(&'static str, JobState)],
    /// Checked in order; the first location yielding outputs wins.
    pub outputs: &'static [OutputLocation],
    pub previews: &'static [&'static str],
    pub error_message: &'static [&'static str],
    pub job_id: &'static [&'static str],
    pub eta_secs: &'static [&'static str],
    pub generation_time_secs: &'static [&'static str],
}

static KLING_SHAPE: ProviderShape = ProviderShape {
    envelope: Some("/data"),
    error_code: Some(ErrorCode {
        code: "/code",
        message: "/message",
    }),
    status: &["/task_status", "/status"],
    synonyms: &[
        ("submitted", JobState::Queued),
        ("queued", JobState::Queued),
        ("processing", JobState::Processing),
        ("succeed", JobState::Succeeded),
        ("success", JobState::Succeeded),
        ("failed", JobState::Failed),
        ("error", JobState::Failed),
    ],
    outputs: &[
        OutputLocation::NestedArray {
            pointer: "/task_result/videos",
            field: "url",
        },
        OutputLocation::NestedArray {
            pointer: "/task_result/images",
            field: "url",
        },
    ],
    previews: &[],
    // The envelope `message` describes the request, not the task.
    error_message: &["/task_status_msg"],
    job_id: &["/task_id"],
    eta_secs: &[],
    generation_time_secs: &[],
};

static MODELS_LAB_SHAPE: ProviderShape = ProviderShape {
    envelope: None,
    error_code: None,
    status: &["/status"],
    synonyms: &[
        ("queued", JobState::Queued),
        ("pending", JobState::Queued),
        ("processing", JobState::Processing),
        ("success", JobState::Succeeded),
        ("succeeded", JobState::Succeeded),
        ("error", JobState::Failed),
        ("failed", JobState::Failed),
    ],
    outputs: &[
        OutputLocation::Root { field: "output" },
        OutputLocation::Root {
            field: "proxy_links",
        },
    ],
    previews: &["/future_links"],
    // "messege" is how the API spells it on some endpoints.
    error_message: &["/message", "/messege", "/error"],
    job_id: &["/id"],
    eta_secs: &["/eta"],
    generation_time_secs: &["/generationTime"],
};

static REPLICATE_SHAPE: ProviderShape = ProviderShape {
    envelope: None,
    error_code: None,
    status: &["/status"],
    synonyms: &[
        ("starting", JobState::Queued),
        ("processing", JobState::Processing),
        ("succeeded", JobState::Succeeded),
        ("failed", JobState::Failed),
        // Cancelled on the provider side, not by our caller.
        ("canceled", JobState::Failed),
        ("cancelled", JobState::Failed),
        ("aborted", JobState::Failed),
    ],
    outputs: &[OutputLocation::Flat { pointer: "/output" }],
    previews: &["/urls/stream"],
    error_message: &["/error"],
    job_id: &["/id"],
    eta_secs: &[],
    generation_time_secs: &["/metrics/predict_time"],
};

/// Canonical locations, tried after every provider-specific one.
const CANONICAL_OUTPUTS: OutputLocation = OutputLocation::Root { field: "outputs" };
const CANONICAL_PREVIEWS: &str = "/preview_outputs";
const CANONICAL_ERROR: &str = "/error";

/// Shape table for `provider`.
pub fn shape(provider: ProviderId) -> &'static ProviderShape {
    match provider {
        ProviderId::Kling => &KLING_SHAPE,
        ProviderId::ModelsLab => &MODELS_LAB_SHAPE,
        ProviderId::Replicate => &REPLICATE_SHAPE,
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Canonical reading of one provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub state: JobState,
    /// Present iff `state` is `Succeeded`.
    pub result: Option<JobResult>,
    /// Present iff `state` is `Failed`, `TimedOut` or `Canceled`; its kind
    /// maps back onto `state`.
    pub error: Option<JobError>,
    pub preview_outputs: Vec<String>,
    pub eta: Option<Duration>,
    /// The status string exactly as the provider sent it.
    pub raw_status: Option<String>,
    pub provider_job_id: Option<String>,
}

/// Normalize a raw provider body into a canonical state.
pub fn normalize(provider: ProviderId, raw: &Value) -> Normalized {
    let shape = shape(provider);
    let scope = shape
        .envelope
        .and_then(|p| raw.pointer(p))
        .filter(|v| v.is_object())
        .unwrap_or(raw);

    let raw_status = first_str(scope, raw, shape.status);
    let preview_outputs = shape
        .previews
        .iter()
        .chain([&CANONICAL_PREVIEWS])
        .flat_map(|p| lookup(scope, raw, p).map(collect_urls).unwrap_or_default())
        .collect::<Vec<_>>();
    let eta = first_number(scope, raw, shape.eta_secs)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64);
    let provider_job_id = first_str(scope, raw, shape.job_id);

    if let Some(err) = in_band_error(shape, raw) {
        return Normalized {
            state: JobState::Failed,
            result: None,
            error: Some(err),
            preview_outputs,
            eta,
            raw_status,
            provider_job_id,
        };
    }

    let mut state = match raw_status.as_deref() {
        Some(status) => classify(shape, status).unwrap_or_else(|| {
            tracing::warn!(
                provider = %provider,
                status,
                "Unknown provider status, treating as processing",
            );
            JobState::Processing
        }),
        None => JobState::Processing,
    };

    let mut result = None;
    let mut error = None;

    match state {
        JobState::Succeeded => {
            let outputs = extract_outputs(shape, scope, raw);
            match JobResult::new(outputs) {
                Some(r) => {
                    let meta = serde_json::json!({
                        "provider": provider.as_str(),
                        "provider_job_id": provider_job_id,
                        "status": raw_status,
                    });
                    result = Some(
                        r.with_preview_outputs(preview_outputs.clone())
                            .with_generation_time(first_number(
                                scope,
                                raw,
                                shape.generation_time_secs,
                            ))
                            .with_provider_meta(meta),
                    );
                }
                None => {
                    tracing::debug!(
                        provider = %provider,
                        status = ?raw_status,
                        "Success status without outputs, still processing",
                    );
                    state = JobState::Processing;
                }
            }
        }
        JobState::Failed | JobState::TimedOut | JobState::Canceled => {
            let err = terminal_error(shape, scope, raw, state, raw_status.as_deref());
            state = err.state();
            error = Some(err);
        }
        JobState::Queued | JobState::Processing => {}
    }

    Normalized {
        state,
        result,
        error,
        preview_outputs,
        eta,
        raw_status,
        provider_job_id,
    }
}

/// Error for a terminal non-success state.
///
/// Provider message fields win; a canonical `error` object fills the gaps
/// and, when it names a kind, sets the final state.
fn terminal_error(
    shape: &ProviderShape,
    scope: &Value,
    raw: &Value,
    state: JobState,
    raw_status: Option<&str>,
) -> JobError {
    let canonical = lookup(scope, raw, CANONICAL_ERROR).filter(|v| v.is_object());
    let field = |name: &str| {
        canonical
            .and_then(|e| e.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    };

    let kind = field("kind")
        .and_then(|k| serde_json::from_value::<ErrorKind>(Value::from(k)).ok())
        .unwrap_or(match state {
            JobState::TimedOut => ErrorKind::TimedOut,
            JobState::Canceled => ErrorKind::Canceled,
            _ => ErrorKind::ProviderFailed,
        });
    let message = first_str(scope, raw, shape.error_message)
        .or_else(|| field("message").map(String::from))
        .unwrap_or_else(|| {
            format!(
                "Provider reported status '{}'",
                raw_status.unwrap_or("unknown")
            )
        });

    let mut err = JobError::new(kind, message);
    if let Some(cause) = field("cause").or(raw_status) {
        err = err.with_cause(cause);
    }
    err
}

/// A non-zero in-band error code, read from the body root.
fn in_band_error(shape: &ProviderShape, raw: &Value) -> Option<JobError> {
    let location = shape.error_code?;
    let code = raw
        .pointer(location.code)
        .and_then(Value::as_i64)
        .filter(|code| *code != 0)?;
    let message = raw
        .pointer(location.message)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("Provider returned error code {code}"));
    Some(JobError::new(ErrorKind::ProviderFailed, message).with_cause(code.to_string()))
}

/// Map a raw status onto a canonical state.
///
/// Canonical state names are accepted for every provider, so a body that
/// already speaks the canonical vocabulary normalizes to itself.
fn classify(shape: &ProviderShape, status: &str) -> Option<JobState> {
    let status = status.trim();
    shape
        .synonyms
        .iter()
        .find(|(raw, _)| raw.eq_ignore_ascii_case(status))
        .map(|(_, state)| *state)
        .or_else(|| JobState::from_canonical(status))
}

fn extract_outputs(shape: &ProviderShape, scope: &Value, raw: &Value) -> Vec<String> {
    for location in shape.outputs.iter().chain([&CANONICAL_OUTPUTS]) {
        let urls = match location {
            OutputLocation::NestedArray { pointer, field } => lookup(scope, raw, pointer)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| match item {
                            Value::String(s) => Some(s.as_str()),
                            other => other.get(*field).and_then(Value::as_str),
                        })
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            OutputLocation::Flat { pointer } => {
                lookup(scope, raw, pointer).map(collect_urls).unwrap_or_default()
            }
            OutputLocation::Root { field } => raw.get(*field).map(collect_urls).unwrap_or_default(),
        };
        if !urls.is_empty() {
            return urls;
        }
    }
    Vec::new()
}

/// Non-empty strings from a string or an array of strings.
fn collect_urls(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn lookup<'a>(scope: &'a Value, raw: &'a Value, pointer: &str) -> Option<&'a Value> {
    scope
        .pointer(pointer)
        .or_else(|| raw.pointer(pointer))
        .filter(|v| !v.is_null())
}

fn first_str(scope: &Value, raw: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match lookup(scope, raw, p)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_number(scope: &Value, raw: &Value, pointers: &[&str]) -> Option<f64> {
    pointers.iter().find_map(|p| match lookup(scope, raw, p)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
