//! Per-provider configuration: base URLs, credential material, and poll
//! budgets.
//!
//! Observed provider limits differ materially, so every poll setting is
//! overridable per provider through environment variables.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use genjob_core::backoff::{BackoffPolicy, PollConfig};
use genjob_core::provider::ProviderId;

use crate::adapter::ProviderAdapter;
use crate::http::build_http_client;
use crate::kling::KlingAdapter;
use crate::models_lab::ModelsLabAdapter;
use crate::replicate::ReplicateAdapter;

/// Default HTTP timeout for a single provider request.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Kling connection and credential settings.
#[derive(Debug, Clone)]
pub struct KlingConfig {
    pub base_url: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub poll: PollConfig,
}

/// ModelsLab connection and credential settings.
#[derive(Debug, Clone)]
pub struct ModelsLabConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub poll: PollConfig,
}

/// Replicate connection and credential settings.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub poll: PollConfig,
}

/// Configuration for every provider the orchestrator can reach.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub kling: KlingConfig,
    pub models_lab: ModelsLabConfig,
    pub replicate: ReplicateConfig,
    /// Timeout applied to every outbound HTTP request.
    pub request_timeout: Duration,
}

impl ProvidersConfig {
    /// Load provider configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                       |
    /// |---------------------------------|-------------------------------|
    /// | `KLING_BASE_URL`                | `https://api.klingai.com`     |
    /// | `KLING_ACCESS_KEY`              | -- (required to use Kling)    |
    /// | `KLING_SECRET_KEY`              | -- (required to use Kling)    |
    /// | `MODELSLAB_BASE_URL`            | `https://modelslab.com/api`   |
    /// | `MODELSLAB_API_KEY`             | -- (required to use ModelsLab)|
    /// | `REPLICATE_BASE_URL`            | `https://api.replicate.com`   |
    /// | `REPLICATE_API_TOKEN`           | -- (required to use Replicate)|
    /// | `PROVIDER_REQUEST_TIMEOUT_SECS` | `30`                          |
    ///
    /// Poll settings use the provider prefix (`KLING`, `MODELSLAB`,
    /// `REPLICATE`) followed by:
    ///
    /// | Suffix                     | Kling  | ModelsLab | Replicate |
    /// |----------------------------|--------|-----------|-----------|
    /// | `_POLL_BASE_DELAY_MS`      | `5000` | `5000`    | `2000`    |
    /// | `_POLL_MAX_ATTEMPTS`       | `60`   | `100`     | `30`      |
    /// | `_POLL_MAX_ELAPSED_SECS`   | unset  | unset     | unset     |
    /// | `_POLL_BACKOFF_FACTOR`     | `1.5`  | fixed     | fixed     |
    /// | `_POLL_BACKOFF_CAP`        | `3`    | fixed     | fixed     |
    /// | `_SUBMIT_RETRIES`          | `0`    | `0`       | `0`       |
    ///
    /// Missing credentials are not an error here; a job against that
    /// provider fails with `CredentialUnavailable` instead.
    ///
    /// # Panics
    ///
    /// Panics if a numeric variable is set but cannot be parsed.
    pub fn from_env() -> Self {
        Self {
            kling: KlingConfig {
                base_url: env_or("KLING_BASE_URL", "https://api.klingai.com"),
                access_key: env_secret("KLING_ACCESS_KEY"),
                secret_key: env_secret("KLING_SECRET_KEY"),
                poll: poll_config_from_env(
                    "KLING",
                    PollConfig::bounded(Duration::from_millis(5000), 60, 1.5, 3.0),
                ),
            },
            models_lab: ModelsLabConfig {
                base_url: env_or("MODELSLAB_BASE_URL", "https://modelslab.com/api"),
                api_key: env_secret("MODELSLAB_API_KEY"),
                poll: poll_config_from_env(
                    "MODELSLAB",
                    PollConfig::fixed(Duration::from_millis(5000), 100),
                ),
            },
            replicate: ReplicateConfig {
                base_url: env_or("REPLICATE_BASE_URL", "https://api.replicate.com"),
                api_token: env_secret("REPLICATE_API_TOKEN"),
                poll: poll_config_from_env(
                    "REPLICATE",
                    PollConfig::fixed(Duration::from_millis(2000), 30),
                ),
            },
            request_timeout: Duration::from_secs(env_parse(
                "PROVIDER_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
        }
    }

    /// Poll budgets keyed by provider.
    pub fn poll_configs(&self) -> HashMap<ProviderId, PollConfig> {
        HashMap::from([
            (ProviderId::Kling, self.kling.poll.clone()),
            (ProviderId::ModelsLab, self.models_lab.poll.clone()),
            (ProviderId::Replicate, self.replicate.poll.clone()),
        ])
    }

    /// Build one adapter per provider, sharing a single HTTP client.
    pub fn build_adapters(
        &self,
    ) -> Result<HashMap<ProviderId, Arc<dyn ProviderAdapter>>, reqwest::Error> {
        let client = build_http_client(self.request_timeout)?;

        let adapters: [Arc<dyn ProviderAdapter>; 3] = [
            Arc::new(KlingAdapter::with_client(
                client.clone(),
                self.kling.base_url.clone(),
            )),
            Arc::new(ModelsLabAdapter::with_client(
                client.clone(),
                self.models_lab.base_url.clone(),
            )),
            Arc::new(ReplicateAdapter::with_client(
                client,
                self.replicate.base_url.clone(),
            )),
        ];

        Ok(adapters
            .into_iter()
            .map(|adapter| (adapter.provider(), adapter))
            .collect())
    }
}

/// Apply `{PREFIX}_POLL_*` overrides on top of a provider default.
fn poll_config_from_env(prefix: &str, default: PollConfig) -> PollConfig {
    let base_delay = Duration::from_millis(env_parse(
        &format!("{prefix}_POLL_BASE_DELAY_MS"),
        default.base_delay.as_millis() as u64,
    ));
    let max_attempts = env_opt::<u32>(&format!("{prefix}_POLL_MAX_ATTEMPTS")).or(default.max_attempts);
    let max_elapsed = env_opt::<u64>(&format!("{prefix}_POLL_MAX_ELAPSED_SECS"))
        .map(Duration::from_secs)
        .or(default.max_elapsed);

    let factor = env_opt::<f64>(&format!("{prefix}_POLL_BACKOFF_FACTOR"));
    let cap = env_opt::<f64>(&format!("{prefix}_POLL_BACKOFF_CAP"));
    let backoff = match (default.backoff, factor, cap) {
        (BackoffPolicy::Fixed, None, None) => BackoffPolicy::Fixed,
        (BackoffPolicy::Fixed, factor, cap) => BackoffPolicy::Bounded {
            factor: factor.unwrap_or(1.0),
            cap_multiplier: cap.unwrap_or(1.0),
        },
        (
            BackoffPolicy::Bounded {
                factor: default_factor,
                cap_multiplier: default_cap,
            },
            factor,
            cap,
        ) => BackoffPolicy::Bounded {
            factor: factor.unwrap_or(default_factor),
            cap_multiplier: cap.unwrap_or(default_cap),
        },
    };

    PollConfig {
        base_delay,
        max_attempts,
        max_elapsed,
        backoff,
        eta_cap: default.eta_cap,
        submit_retries: env_parse(&format!("{prefix}_SUBMIT_RETRIES"), default.submit_retries),
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read a secret, treating an empty value as absent.
fn env_secret(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_opt<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => panic!("{name} must be a valid {}", std::any::type_name::<T>()),
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    env_opt(name).unwrap_or(default)
}
