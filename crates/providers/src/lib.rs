//! Provider adapters for external generation services.
//!
//! Each adapter knows one provider's submit and poll endpoints, its wire
//! shapes, and its local validation rules. Raw poll responses are reduced to
//! canonical [`genjob_core::job::JobState`]s by [`normalizer::normalize`];
//! nothing outside this crate inspects provider fields.

pub mod adapter;
pub mod config;
pub mod credentials;
pub mod http;
pub mod kling;
pub mod models_lab;
pub mod normalizer;
pub mod replicate;

mod validation;

pub use adapter::{ProviderAdapter, RawPollResponse, SubmitOutcome};
pub use config::ProvidersConfig;
pub use credentials::{Credential, CredentialError, CredentialProvider};
pub use http::TransportError;
