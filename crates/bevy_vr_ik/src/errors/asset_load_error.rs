use bevy_vr_ik_core::errors::ConfigurationError;
use thiserror::Error;

/// Errors produced while reading settings or skeleton files.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AssetLoadError {
    /// An [IO](std::io) Error
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    /// A [RON](ron) Error
    #[error("could not parse RON: {0}")]
    RonSpannedError(#[from] ron::error::SpannedError),
    #[error("could not serialize RON: {0}")]
    RonError(#[from] ron::Error),
    #[error("loaded data is not a valid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
}
