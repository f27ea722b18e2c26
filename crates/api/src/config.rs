use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. Provider
/// settings live in [`genjob_providers::ProvidersConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long finished jobs stay queryable, in seconds (default: `3600`).
    pub job_retention_secs: u64,
    /// Successful jobs never resolve faster than this (default: unset).
    pub minimum_total_duration_ms: Option<u64>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `HOST`                      | `0.0.0.0`               |
    /// | `PORT`                      | `3000`                  |
    /// | `CORS_ORIGINS`              | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                    |
    /// | `JOB_RETENTION_SECS`        | `3600`                  |
    /// | `MINIMUM_TOTAL_DURATION_MS` | unset                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let job_retention_secs: u64 = std::env::var("JOB_RETENTION_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("JOB_RETENTION_SECS must be a valid u64");

        let minimum_total_duration_ms = std::env::var("MINIMUM_TOTAL_DURATION_MS")
            .ok()
            .map(|v| {
                v.parse::<u64>()
                    .expect("MINIMUM_TOTAL_DURATION_MS must be a valid u64")
            });

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            job_retention_secs,
            minimum_total_duration_ms,
        }
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    /// How long `POST /jobs` waits on the provider before answering with the
    /// job id: half the request timeout.
    pub fn submit_wait(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs) / 2
    }

    pub fn minimum_total_duration(&self) -> Option<Duration> {
        self.minimum_total_duration_ms.map(Duration::from_millis)
    }
}
