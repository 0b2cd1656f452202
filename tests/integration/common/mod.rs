//! Common utilities for integration tests

use anyhow::{anyhow, Result};
use layercake::context::DOCKERFILE_PATH;
use layercake::engine::BuildStream;
use layercake::{BuildMessage, BuildOptions, CancelFlag, Config, Engine};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::Path;
use tar_rs as tar;
use tempfile::TempDir;

/// One build request as seen by [`FakeEngine`].
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedBuild {
    pub options: BuildOptions,
    pub dockerfile: String,
    /// Paths of the context archive, Dockerfile excluded.
    pub context: Vec<String>,
}

impl RecordedBuild {
    /// The image name, taken from the repository part of the first tag.
    pub fn name(&self) -> &str {
        let tag = self.options.tags.first().map(String::as_str).unwrap_or("");
        tag.split(':').next().unwrap_or(tag)
    }
}

/// In-memory engine: every image gets the id `sha256:<name>` and its
/// saved archive has a shared base layer plus a top layer holding the
/// files registered with [`FakeEngine::with_files`].
#[derive(Default)]
pub struct FakeEngine {
    pub builds: RefCell<Vec<RecordedBuild>>,
    pub tags: RefCell<Vec<(String, String)>>,
    pub saves: RefCell<Vec<String>>,
    files: HashMap<String, Vec<String>>,
    failing: Option<String>,
    cancel_after: Option<(String, CancelFlag)>,
}

#[allow(dead_code)]
impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(mut self, image: &str, files: &[&str]) -> Self {
        self.files.insert(
            image.to_string(),
            files.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    pub fn failing(mut self, image: &str) -> Self {
        self.failing = Some(image.to_string());
        self
    }

    pub fn cancel_after(mut self, image: &str, flag: CancelFlag) -> Self {
        self.cancel_after = Some((image.to_string(), flag));
        self
    }

    pub fn built(&self) -> Vec<String> {
        self.builds
            .borrow()
            .iter()
            .map(|b| b.name().to_string())
            .collect()
    }

    pub fn dockerfile_of(&self, image: &str) -> Option<String> {
        self.builds
            .borrow()
            .iter()
            .find(|b| b.name() == image)
            .map(|b| b.dockerfile.clone())
    }
}

impl Engine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn build(&self, context: &Path, options: &BuildOptions) -> Result<BuildStream<'_>> {
        let (dockerfile, entries) = read_context(context)?;
        let build = RecordedBuild {
            options: options.clone(),
            dockerfile,
            context: entries,
        };
        let name = build.name().to_string();
        self.builds.borrow_mut().push(build);

        if let Some((image, flag)) = &self.cancel_after {
            if *image == name {
                flag.cancel();
            }
        }

        let mut messages = vec![Ok(BuildMessage::stream("Step 1/1 : FROM scratch\n"))];
        if self.failing.as_deref() == Some(name.as_str()) {
            messages.push(Ok(BuildMessage::error("The command returned a non-zero code: 1")));
        } else {
            messages.push(Ok(BuildMessage::image_id(&format!("sha256:{}", name))));
        }

        Ok(Box::new(messages.into_iter()))
    }

    fn tag(&self, image_id: &str, reference: &str) -> Result<()> {
        self.tags
            .borrow_mut()
            .push((image_id.to_string(), reference.to_string()));
        Ok(())
    }

    fn save(&self, image_id: &str) -> Result<Box<dyn Read + '_>> {
        self.saves.borrow_mut().push(image_id.to_string());

        let name = image_id
            .strip_prefix("sha256:")
            .ok_or_else(|| anyhow!("unknown image {}", image_id))?;
        let files: Vec<&str> = self
            .files
            .get(name)
            .map(|f| f.iter().map(String::as_str).collect())
            .unwrap_or_default();

        Ok(Box::new(Cursor::new(saved_image(&files)?)))
    }
}

/// Builds a legacy `docker save` archive with a base layer and one top layer.
pub fn saved_image(top_files: &[&str]) -> Result<Vec<u8>> {
    let manifest = serde_json::to_vec(&serde_json::json!([{
        "Config": "config.json",
        "RepoTags": [],
        "Layers": ["base/layer.tar", "top/layer.tar"],
    }]))?;

    let mut archive = tar::Builder::new(Vec::new());
    append(&mut archive, "base/layer.tar", &layer(&["bin/sh", "etc/os-release"])?)?;
    append(&mut archive, "top/layer.tar", &layer(top_files)?)?;
    append(&mut archive, "manifest.json", &manifest)?;
    Ok(archive.into_inner()?)
}

fn layer(files: &[&str]) -> Result<Vec<u8>> {
    let mut layer = tar::Builder::new(Vec::new());
    for file in files {
        append(&mut layer, file.trim_start_matches('/'), b"content")?;
    }
    Ok(layer.into_inner()?)
}

fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_mode(0o644);
    header.set_size(data.len() as u64);
    header.set_cksum();
    builder.append_data(&mut header, path, data)?;
    Ok(())
}

fn read_context(context: &Path) -> Result<(String, Vec<String>)> {
    let mut archive = tar::Archive::new(File::open(context)?);
    let mut dockerfile = None;
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        if path == DOCKERFILE_PATH {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            dockerfile = Some(content);
        } else {
            entries.push(path.trim_end_matches('/').to_string());
        }
    }

    let dockerfile = dockerfile.ok_or_else(|| anyhow!("context has no Dockerfile"))?;
    Ok((dockerfile, entries))
}

/// A project directory holding `layercake.yml` plus extra files.
pub struct Project {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Project {
    pub fn new(config: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("layercake.yml"), config)?;
        Ok(Self { dir })
    }

    pub fn with_file(self, path: &str, content: &str) -> Result<Self> {
        let path = self.dir.path().join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(self)
    }

    pub fn config(&self) -> Result<Config> {
        Config::load(None, self.dir.path())
    }
}
