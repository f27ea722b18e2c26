//! Provider identifiers and generation kinds.
//!
//! A [`GenerationKind`] is what the caller asks for; a [`ProviderId`] is who
//! fulfils it. [`GenerationKind::default_provider`] routes a kind to the
//! provider that serves it when the caller does not pick one explicitly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Provider identifiers
// ---------------------------------------------------------------------------

/// External generation providers known to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Kling video generation (JWT-authenticated).
    Kling,
    /// ModelsLab image, deepfake and 3D generation (static key in body).
    ModelsLab,
    /// Replicate predictions API, used for music generation.
    Replicate,
}

/// All providers, in a stable order.
pub const ALL_PROVIDERS: &[ProviderId] =
    &[ProviderId::Kling, ProviderId::ModelsLab, ProviderId::Replicate];

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Kling => "kling",
            ProviderId::ModelsLab => "models_lab",
            ProviderId::Replicate => "replicate",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_PROVIDERS
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Unknown provider '{s}'. Must be one of: {}",
                    ALL_PROVIDERS
                        .iter()
                        .map(|p| p.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Generation kinds
// ---------------------------------------------------------------------------

/// The kind of artifact a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Image,
    Video,
    Deepfake,
    #[serde(rename = "3d")]
    ThreeD,
    Music,
}

impl GenerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationKind::Image => "image",
            GenerationKind::Video => "video",
            GenerationKind::Deepfake => "deepfake",
            GenerationKind::ThreeD => "3d",
            GenerationKind::Music => "music",
        }
    }

    /// Provider used for this kind when the caller does not name one.
    pub fn default_provider(self) -> ProviderId {
        match self {
            GenerationKind::Video => ProviderId::Kling,
            GenerationKind::Image | GenerationKind::Deepfake | GenerationKind::ThreeD => {
                ProviderId::ModelsLab
            }
            GenerationKind::Music => ProviderId::Replicate,
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
