//! Provider credentials: short-lived signed JWTs and static API keys.
//!
//! Kling authenticates with an HS256 JWT minted from an access key / secret
//! key pair. The token is valid for 30 minutes and its `nbf` claim is set a
//! few seconds in the past to tolerate clock skew between us and the
//! provider. Other providers use a static key.
//!
//! Every [`CredentialProvider`] is a pure function of configuration plus the
//! current time, so a single instance is shared across all running jobs.

use std::collections::HashMap;
use std::fmt;

use genjob_core::job::{ErrorKind, JobError};
use genjob_core::provider::ProviderId;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config::ProvidersConfig;

/// Default JWT lifetime in seconds (30 minutes).
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 1800;
/// How far in the past the `nbf` claim is placed, in seconds.
pub const DEFAULT_NOT_BEFORE_SKEW_SECS: i64 = 5;

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Auth material attached to provider requests.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Sent as `Authorization: Bearer <token>`.
    Bearer(String),
    /// Sent inside the request body.
    ApiKey(String),
}

impl Credential {
    pub fn secret(&self) -> &str {
        match self {
            Credential::Bearer(s) | Credential::ApiKey(s) => s,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Credential::Bearer(<redacted>)"),
            Credential::ApiKey(_) => f.write_str("Credential::ApiKey(<redacted>)"),
        }
    }
}

/// Errors raised while producing a credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Required secret material is missing from configuration.
    #[error("Credential unavailable for {provider}: {reason}")]
    Unavailable {
        provider: ProviderId,
        reason: String,
    },

    /// The JWT could not be signed.
    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl From<CredentialError> for JobError {
    fn from(err: CredentialError) -> Self {
        JobError::new(ErrorKind::CredentialUnavailable, err.to_string())
    }
}

/// Source of auth material for a provider.
pub trait CredentialProvider: Send + Sync {
    fn get_credential(&self, provider: ProviderId) -> Result<Credential, CredentialError>;
}

// ---------------------------------------------------------------------------
// JWT credentials
// ---------------------------------------------------------------------------

/// Claims embedded in a provider access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderClaims {
    /// Issuer -- the provider access key.
    pub iss: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Not-before time (UTC Unix timestamp).
    pub nbf: i64,
}

/// Mints a fresh HS256 bearer token on every call.
#[derive(Clone)]
pub struct JwtCredentials {
    access_key: Option<String>,
    secret_key: Option<String>,
    ttl_secs: i64,
    not_before_skew_secs: i64,
}

impl JwtCredentials {
    pub fn new(access_key: Option<String>, secret_key: Option<String>) -> Self {
        Self {
            access_key,
            secret_key,
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            not_before_skew_secs: DEFAULT_NOT_BEFORE_SKEW_SECS,
        }
    }

    /// Sign a token valid from `now - skew` until `now + ttl`.
    pub fn mint_at(&self, provider: ProviderId, now: i64) -> Result<String, CredentialError> {
        let (Some(access_key), Some(secret_key)) = (&self.access_key, &self.secret_key) else {
            return Err(CredentialError::Unavailable {
                provider,
                reason: "access key and secret key must both be configured".to_string(),
            });
        };

        let claims = ProviderClaims {
            iss: access_key.clone(),
            exp: now + self.ttl_secs,
            nbf: now - self.not_before_skew_secs,
        };

        Ok(encode(
            &Header::default(), // HS256
            &claims,
            &EncodingKey::from_secret(secret_key.as_bytes()),
        )?)
    }
}

impl CredentialProvider for JwtCredentials {
    fn get_credential(&self, provider: ProviderId) -> Result<Credential, CredentialError> {
        let token = self.mint_at(provider, chrono::Utc::now().timestamp())?;
        Ok(Credential::Bearer(token))
    }
}

// ---------------------------------------------------------------------------
// Static keys
// ---------------------------------------------------------------------------

/// Returns a configured key unchanged.
#[derive(Clone)]
pub struct StaticKeyCredentials {
    key: Option<String>,
    as_bearer: bool,
}

impl StaticKeyCredentials {
    /// A key sent in the request body.
    pub fn api_key(key: Option<String>) -> Self {
        Self {
            key,
            as_bearer: false,
        }
    }

    /// A key sent as a bearer token.
    pub fn bearer(key: Option<String>) -> Self {
        Self {
            key,
            as_bearer: true,
        }
    }
}

impl CredentialProvider for StaticKeyCredentials {
    fn get_credential(&self, provider: ProviderId) -> Result<Credential, CredentialError> {
        let key = self.key.clone().ok_or_else(|| CredentialError::Unavailable {
            provider,
            reason: "API key is not configured".to_string(),
        })?;
        Ok(if self.as_bearer {
            Credential::Bearer(key)
        } else {
            Credential::ApiKey(key)
        })
    }
}

// ---------------------------------------------------------------------------
// Per-provider routing
// ---------------------------------------------------------------------------

/// Routes each provider to its own credential source.
#[derive(Default)]
pub struct ConfiguredCredentials {
    sources: HashMap<ProviderId, Box<dyn CredentialProvider>>,
}

impl ConfiguredCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(
        mut self,
        provider: ProviderId,
        source: impl CredentialProvider + 'static,
    ) -> Self {
        self.sources.insert(provider, Box::new(source));
        self
    }

    /// Wire up every provider from loaded configuration.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        Self::new()
            .with_source(
                ProviderId::Kling,
                JwtCredentials::new(
                    config.kling.access_key.clone(),
                    config.kling.secret_key.clone(),
                ),
            )
            .with_source(
                ProviderId::ModelsLab,
                StaticKeyCredentials::api_key(config.models_lab.api_key.clone()),
            )
            .with_source(
                ProviderId::Replicate,
                StaticKeyCredentials::bearer(config.replicate.api_token.clone()),
            )
    }
}

impl CredentialProvider for ConfiguredCredentials {
    fn get_credential(&self, provider: ProviderId) -> Result<Credential, CredentialError> {
        match self.sources.get(&provider) {
            Some(source) => source.get_credential(provider),
            None => Err(CredentialError::Unavailable {
                provider,
                reason: "no credential source registered".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    use super::*;

    const SECRET: &str = "kling-secret-that-is-long-enough";

    fn jwt() -> JwtCredentials {
        JwtCredentials::new(Some("ak-123".into()), Some(SECRET.into()))
    }

    #[test]
    fn minted_token_has_expected_window() {
        let now = chrono::Utc::now().timestamp();
        let token = jwt().mint_at(ProviderId::Kling, now).unwrap();

        let mut validation = Validation::default();
        validation.set_issuer(&["ak-123"]);
        let data = decode::<ProviderClaims>(
            &token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &validation,
        )
        .expect("token should validate");

        assert_eq!(data.claims.iss, "ak-123");
        assert_eq!(data.claims.exp, now + 1800);
        assert_eq!(data.claims.nbf, now - 5);
    }

    #[test]
    fn get_credential_returns_bearer() {
        let credential = jwt().get_credential(ProviderId::Kling).unwrap();
        assert_matches!(credential, Credential::Bearer(token) if token.split('.').count() == 3);
    }

    #[test]
    fn missing_secret_key_is_unavailable() {
        let creds = JwtCredentials::new(Some("ak".into()), None);
        let err = creds.get_credential(ProviderId::Kling).unwrap_err();
        assert_matches!(err, CredentialError::Unavailable { provider: ProviderId::Kling, .. });
    }

    #[test]
    fn static_key_modes() {
        let body = StaticKeyCredentials::api_key(Some("k".into()));
        assert_eq!(
            body.get_credential(ProviderId::ModelsLab).unwrap(),
            Credential::ApiKey("k".into())
        );
        let bearer = StaticKeyCredentials::bearer(Some("t".into()));
        assert_eq!(
            bearer.get_credential(ProviderId::Replicate).unwrap(),
            Credential::Bearer("t".into())
        );
        assert!(StaticKeyCredentials::api_key(None)
            .get_credential(ProviderId::ModelsLab)
            .is_err());
    }

    #[test]
    fn unregistered_provider_is_unavailable() {
        let creds = ConfiguredCredentials::new()
            .with_source(ProviderId::ModelsLab, StaticKeyCredentials::api_key(Some("k".into())));
        assert!(creds.get_credential(ProviderId::ModelsLab).is_ok());
        assert_matches!(
            creds.get_credential(ProviderId::Replicate),
            Err(CredentialError::Unavailable { .. })
        );
    }

    #[test]
    fn credential_error_maps_to_job_error() {
        let err: JobError = CredentialError::Unavailable {
            provider: ProviderId::Kling,
            reason: "missing".into(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::CredentialUnavailable);
    }

    #[test]
    fn debug_output_is_redacted() {
        let credential = Credential::Bearer("super-secret".into());
        assert!(!format!("{credential:?}").contains("super-secret"));
    }
}
