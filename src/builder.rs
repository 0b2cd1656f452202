//! End-to-end build orchestrator.
//!
//! [`Builder`] turns a loaded [`Config`] into a sequence of engine builds:
//! - resolves the import graph and the build order up front, so configuration
//!   errors surface before anything is built,
//! - for each scheduled image synthesizes a Dockerfile against the exports
//!   recorded so far, ships it with the working directory as build context,
//!   and follows the build to its image id,
//! - applies extra tags, and records the exported files of every image that
//!   a later scheduled image imports.
//!
//! The first failure stops the run. Images already built stay in the engine.
//! A dry run only renders the Dockerfiles and needs no engine at all.

use crate::config::{Config, ImageSpec};
use crate::context::{self, DOCKERFILE_PATH};
use crate::dockerfile;
use crate::engine::{BuildOptions, Engine};
use crate::error::LayercakeError;
use crate::exporter;
use crate::graph::{Graph, VertexId};
use crate::ignore::{IgnoreRules, IGNORE_FILE};
use crate::notifier::Notifier;
use crate::progress;
use crate::registry::ExportRegistry;
use crate::scheduler;
use anyhow::{Context, Result};
use indicatif::HumanDuration;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

/// Shared flag checked before each image is started.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Creates the run-scoped directory holding build context archives.
pub fn scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(".layercake-")
        .tempdir()
        .context("Failed to create scratch directory")
}

/// Orchestrates one run over the scheduled images.
pub struct Builder<'a> {
    config: &'a Config,
    notifier: &'a Notifier,
    graph: Graph<'a>,
    order: Vec<VertexId>,
    ignore: IgnoreRules,
    registry: ExportRegistry,
    scratch: Option<PathBuf>,
}

impl<'a> Builder<'a> {
    /// Validates the config and computes the build order for `targets`
    /// (every declared image when empty).
    pub fn new(config: &'a Config, notifier: &'a Notifier, targets: &[String]) -> Result<Self> {
        let graph = Graph::from_images(&config.build.images)?;
        if graph.is_empty() {
            notifier.warn("No images declared under build.images");
        }
        let order = scheduler::schedule(&graph, targets)?;
        let ignore = IgnoreRules::from_file(&config.cwd.join(IGNORE_FILE))?;

        Ok(Self {
            config,
            notifier,
            graph,
            order,
            ignore,
            registry: ExportRegistry::new(),
            scratch: None,
        })
    }

    /// Writes context archives under `dir` instead of a directory owned by
    /// the run. The caller is responsible for removing it.
    pub fn with_scratch_dir(mut self, dir: &Path) -> Self {
        self.scratch = Some(dir.to_path_buf());
        self
    }

    /// Names of the scheduled images, in build order.
    pub fn order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&id| self.graph.vertex(id).name.as_str())
            .collect()
    }

    pub fn registry(&self) -> &ExportRegistry {
        &self.registry
    }

    /// Dockerfiles of the scheduled images, in build order, rendered
    /// against the exports recorded so far.
    pub fn render(&self) -> Vec<(&str, String)> {
        self.order
            .iter()
            .map(|&id| {
                let vertex = self.graph.vertex(id);
                (
                    vertex.name.as_str(),
                    dockerfile::compile(vertex.image, &self.registry),
                )
            })
            .collect()
    }

    /// Prints every scheduled Dockerfile to stdout without building.
    pub fn dry_run(&self) {
        for (name, dockerfile) in self.render() {
            self.notifier
                .println_above(format!("# Dockerfile for {}\n{}\n", name, dockerfile));
        }
        self.notifier.finish();
    }

    /// Builds every scheduled image in order. Falls back to [`Builder::dry_run`]
    /// when the config asks for one.
    pub fn run<E: Engine + ?Sized>(&mut self, engine: &E, cancel: &CancelFlag) -> Result<()> {
        if self.config.build.dry_run {
            self.dry_run();
            return Ok(());
        }

        let started = Instant::now();
        self.notifier.info(&format!(
            "Building {} images with {}",
            self.order.len(),
            engine.name()
        ));
        self.notifier
            .debug(&format!("Build order: {}", self.order().join(", ")));

        let owned_scratch;
        let scratch = match &self.scratch {
            Some(dir) => dir.clone(),
            None => {
                owned_scratch = scratch_dir()?;
                owned_scratch.path().to_path_buf()
            }
        };

        for (pos, id) in self.order.clone().into_iter().enumerate() {
            if cancel.is_cancelled() {
                self.notifier.warn("Cancellation requested, stopping");
                return Err(LayercakeError::Cancelled.into());
            }

            let vertex = self.graph.vertex(id);
            let name = vertex.name.as_str();
            let image = vertex.image;

            self.notifier.info(&format!("Building image {}", name));
            let dockerfile = dockerfile::compile(image, &self.registry);
            self.notifier
                .trace(&format!("Dockerfile for {}:\n{}", name, dockerfile));

            let image_id = self.build_image(engine, name, image, &dockerfile, &scratch)?;
            self.notifier
                .info(&format!("Built image {} ({})", name, image_id));

            let imported_later = self
                .graph
                .children_of(id)
                .iter()
                .any(|child| self.order[pos + 1..].contains(child));
            if imported_later {
                let record = exporter::export(engine, &image_id, self.notifier)
                    .with_context(|| format!("Failed to export files of image {}", name))?;
                self.registry.insert(name, record)?;
            }
        }

        self.notifier.info(&format!(
            "Built {} images in {}",
            self.order.len(),
            HumanDuration(started.elapsed())
        ));
        self.notifier.finish();
        Ok(())
    }

    fn build_image<E: Engine + ?Sized>(
        &self,
        engine: &E,
        name: &str,
        image: &ImageSpec,
        dockerfile: &str,
        scratch: &Path,
    ) -> Result<String> {
        let context_path = scratch.join(format!("{}.tar", sanitize(name)));
        let entries = context::write_context(&self.config.cwd, &self.ignore, dockerfile, &context_path)
            .with_context(|| format!("Failed to prepare build context for image {}", name))?;
        self.notifier.debug(&format!(
            "Build context for {} has {} entries",
            name, entries
        ));

        let options = self.build_options(image);
        let messages = engine.build(&context_path, &options).map_err(|e| {
            LayercakeError::BuildFailed {
                image: name.to_string(),
                reason: format!("{:#}", e),
            }
        })?;
        let image_id = progress::follow(name, messages, self.notifier)?;

        for reference in options.tags.iter().skip(1) {
            self.notifier
                .debug(&format!("Tagging {} as {}", image_id, reference));
            engine.tag(&image_id, reference)?;
        }

        if let Err(e) = fs::remove_file(&context_path) {
            self.notifier.trace(&format!(
                "Failed to remove build context {}: {}",
                context_path.display(),
                e
            ));
        }

        Ok(image_id)
    }

    /// Global settings with per-image args taking precedence.
    fn build_options(&self, image: &ImageSpec) -> BuildOptions {
        let build = &self.config.build;
        let mut build_args = build.args.clone();
        build_args.extend(image.args.clone());

        BuildOptions {
            dockerfile: DOCKERFILE_PATH.to_string(),
            build_args,
            tags: image.tags.clone(),
            labels: image.labels.clone(),
            cache_from: image.cache_from.clone(),
            no_cache: build.no_cache,
            pull: build.pull,
            remove: true,
            force_rm: build.force_rm,
            memory: build.memory,
            cpu_shares: build.cpu_shares,
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
