//! Discovers the files an image exports from its saved archive.
//!
//! An image's exports are the regular files added by its last layer, which
//! is the layer its own build script produced. The saved archive is read in
//! a single forward pass: every layer is listed as it streams by, and the
//! manifest (which may come before or after the layers) picks the last one
//! once the pass is over. Layer contents are never written to disk.
//!
//! Both the legacy `docker save` layout (`<id>/layer.tar`) and the OCI
//! layout (`blobs/sha256/<digest>`, plain or gzip) are understood.

use crate::engine::Engine;
use crate::error::LayercakeError;
use crate::notifier::Notifier;
use crate::registry::ExportRecord;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar_rs as tar;

const MANIFEST_PATH: &str = "manifest.json";
const LAYER_SUFFIX: &str = "/layer.tar";
const BLOB_PREFIX: &str = "blobs/";
const WHITEOUT_PREFIX: &str = ".wh.";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One image entry of a saved archive's `manifest.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageManifest {
    pub config: String,
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,
    pub layers: Vec<String>,
}

/// Saves `image_id` through the engine and records its exported files.
pub fn export<E: Engine + ?Sized>(
    engine: &E,
    image_id: &str,
    notifier: &Notifier,
) -> Result<ExportRecord> {
    notifier.debug(&format!("Saving image {} from {}", image_id, engine.name()));
    let archive = engine
        .save(image_id)
        .with_context(|| format!("Failed to save image {}", image_id))?;

    let files = exported_files(archive, notifier)
        .with_context(|| format!("Failed to read exported files of image {}", image_id))?;
    notifier.debug(&format!("Image {} exports {} files", image_id, files.len()));

    Ok(ExportRecord {
        image_id: image_id.to_string(),
        files,
    })
}

/// Lists the files added by the last layer of a saved image archive.
///
/// Files are returned as absolute in-image paths in archive order. Only
/// regular files and hard links count; directories, symlinks, devices and
/// whiteout markers do not.
pub fn exported_files<R: Read>(archive: R, notifier: &Notifier) -> Result<Vec<String>> {
    let mut archive = tar::Archive::new(archive);
    let mut manifests: Option<Vec<ImageManifest>> = None;
    let mut listings: HashMap<String, Vec<String>> = HashMap::new();
    let mut aliases: HashMap<String, String> = HashMap::new();

    for entry in archive.entries().context("Failed to read image archive")? {
        let mut entry = entry.context("Failed to read image archive entry")?;
        let path = normalize_archive_path(&entry.path().context("Invalid entry path")?);
        let name = path.to_string_lossy().into_owned();
        let entry_type = entry.header().entry_type();

        if name == MANIFEST_PATH {
            let decoded = serde_json::from_reader(&mut entry)
                .context("Failed to decode manifest.json")?;
            manifests = Some(decoded);
        } else if name.ends_with(LAYER_SUFFIX) {
            if entry_type.is_symlink() {
                // Identical layers are saved once and linked from the others.
                if let Some(target) = entry.link_name().context("Invalid layer link")? {
                    let parent = path.parent().unwrap_or_else(|| Path::new(""));
                    let target = normalize_archive_path(&parent.join(target));
                    aliases.insert(name, target.to_string_lossy().into_owned());
                }
            } else {
                let files = list_layer(&mut entry)
                    .with_context(|| format!("Failed to list layer {}", name))?;
                notifier.trace(&format!("Listed layer {} ({} files)", name, files.len()));
                listings.insert(name, files);
            }
        } else if name.starts_with(BLOB_PREFIX) && entry_type.is_file() {
            // Config and index blobs share the directory with layers and
            // simply fail to parse as tar.
            match list_layer(&mut entry) {
                Ok(files) => {
                    notifier.trace(&format!("Listed blob {} ({} files)", name, files.len()));
                    listings.insert(name, files);
                }
                Err(e) => notifier.trace(&format!("Blob {} is not a layer: {:#}", name, e)),
            }
        }
    }

    let manifests = manifests.ok_or(LayercakeError::ManifestMissing)?;
    let manifest = manifests.first().ok_or(LayercakeError::ManifestMissing)?;
    let last = manifest
        .layers
        .last()
        .ok_or_else(|| LayercakeError::LayerNotFound("<no layers>".to_string()))?;

    let key = normalize_archive_path(Path::new(last))
        .to_string_lossy()
        .into_owned();
    let key = aliases.get(&key).cloned().unwrap_or(key);

    listings
        .remove(&key)
        .ok_or_else(|| LayercakeError::LayerNotFound(last.clone()).into())
}

/// Lists the exported files of one layer archive, gzip or plain.
fn list_layer<R: Read>(layer: R) -> Result<Vec<String>> {
    let mut reader = BufReader::new(layer);
    let compressed = reader.fill_buf()?.starts_with(&GZIP_MAGIC);

    let reader: Box<dyn Read + '_> = if compressed {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let mut archive = tar::Archive::new(reader);
    let mut files = Vec::new();

    for entry in archive.entries()? {
        let entry = entry?;
        let entry_type = entry.header().entry_type();
        if !(entry_type.is_file() || entry_type.is_hard_link() || entry_type.is_gnu_sparse()) {
            continue;
        }

        let path = normalize_archive_path(&entry.path()?);
        let whiteout = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(WHITEOUT_PREFIX));
        if whiteout || path.as_os_str().is_empty() {
            continue;
        }

        files.push(format!("/{}", path.to_string_lossy()));
    }

    Ok(files)
}

/// Strips `.`/`/` prefixes and resolves `..` without leaving the archive root.
fn normalize_archive_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(c) => out.push(c),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }

    out
}
