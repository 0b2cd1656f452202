//! Error taxonomy for a layercake run.
//!
//! Every failure is fatal: configuration problems abort before the first build,
//! build and export problems abort the remaining schedule. Library code returns
//! [`anyhow::Result`] with a [`LayercakeError`] at the root of the chain, so callers
//! can classify a failure with `err.downcast_ref::<LayercakeError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayercakeError {
    #[error("image {image:?} imports undefined image {import:?}")]
    UndefinedReference { image: String, import: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed build script: {0}")]
    MalformedScript(String),

    #[error("unknown build target {0:?}")]
    UnknownTarget(String),

    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("import cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    #[error("failed to build image {image:?}: {reason}")]
    BuildFailed { image: String, reason: String },

    #[error("manifest.json not found in the saved image archive")]
    ManifestMissing,

    #[error("layer {0:?} referenced by the manifest was not found in the archive")]
    LayerNotFound(String),

    #[error("exports of image {0:?} were already recorded")]
    DuplicateExport(String),

    #[error("build cancelled")]
    Cancelled,
}

impl LayercakeError {
    /// Configuration errors are detected before any image is built.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LayercakeError::UndefinedReference { .. }
                | LayercakeError::InvalidConfig(_)
                | LayercakeError::MalformedScript(_)
                | LayercakeError::UnknownTarget(_)
                | LayercakeError::ConfigNotFound(_)
        )
    }
}
