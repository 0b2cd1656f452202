//! Container engine seam.
//!
//! The orchestrator only needs three operations from an engine: build an
//! image from a context archive, tag it, and save it as an image archive.
//! [`DockerEngine`] talks to a Docker daemon; tests substitute their own.

mod docker;

pub use docker::{split_reference, DockerEngine};

use anyhow::Result;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Options for a single image build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
    /// Dockerfile path inside the context archive.
    pub dockerfile: String,
    pub build_args: HashMap<String, String>,
    /// References to apply to the built image, first one at build time.
    pub tags: Vec<String>,
    pub labels: HashMap<String, String>,
    pub cache_from: Vec<String>,
    pub no_cache: bool,
    pub pull: bool,
    /// Remove intermediate containers after a successful build.
    pub remove: bool,
    /// Always remove intermediate containers, even after a failure.
    pub force_rm: bool,
    pub memory: Option<u64>,
    pub cpu_shares: Option<u64>,
}

/// One message of a build progress stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildMessage {
    /// Build output text, possibly spanning several lines.
    pub stream: Option<String>,
    pub status: Option<String>,
    /// Set when the build failed. No further messages follow.
    pub error: Option<String>,
    /// Identifier of the built image, reported near the end of a build.
    pub aux_id: Option<String>,
}

impl BuildMessage {
    pub fn stream(text: &str) -> Self {
        Self {
            stream: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn error(text: &str) -> Self {
        Self {
            error: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn image_id(id: &str) -> Self {
        Self {
            aux_id: Some(id.to_string()),
            ..Default::default()
        }
    }
}

/// Lazily pulled build progress.
pub type BuildStream<'a> = Box<dyn Iterator<Item = Result<BuildMessage>> + 'a>;

pub trait Engine {
    /// Returns the name of the engine for log messages
    fn name(&self) -> &str;

    /// Starts a build from the tar archive at `context`.
    fn build(&self, context: &Path, options: &BuildOptions) -> Result<BuildStream<'_>>;

    /// Applies `reference` (`repo[:tag]`) to an existing image.
    fn tag(&self, image_id: &str, reference: &str) -> Result<()>;

    /// Saves an image as a tar archive, streamed as it is produced.
    fn save(&self, image_id: &str) -> Result<Box<dyn Read + '_>>;
}

impl<E: Engine + ?Sized> Engine for &E {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn build(&self, context: &Path, options: &BuildOptions) -> Result<BuildStream<'_>> {
        (**self).build(context, options)
    }

    fn tag(&self, image_id: &str, reference: &str) -> Result<()> {
        (**self).tag(image_id, reference)
    }

    fn save(&self, image_id: &str) -> Result<Box<dyn Read + '_>> {
        (**self).save(image_id)
    }
}
