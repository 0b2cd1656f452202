//! Build context archive sent to the engine.
//!
//! The synthesized Dockerfile is written first at [`DOCKERFILE_PATH`],
//! followed by the working directory minus `.dockerignore` exclusions.

use crate::ignore::IgnoreRules;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tar_rs as tar;
use walkdir::WalkDir;

/// Context-relative path of the generated Dockerfile.
pub const DOCKERFILE_PATH: &str = ".layercake/Dockerfile";

/// Writes the build context for one image to `dest`.
///
/// Returns the number of working-directory entries archived next to the
/// Dockerfile. A user file at [`DOCKERFILE_PATH`] is shadowed and skipped.
pub fn write_context(
    cwd: &Path,
    ignore: &IgnoreRules,
    dockerfile: &str,
    dest: &Path,
) -> Result<usize> {
    let file = File::create(dest)
        .with_context(|| format!("Failed to create context archive: {}", dest.display()))?;
    let mut builder = tar::Builder::new(BufWriter::new(file));
    builder.follow_symlinks(false);

    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, DOCKERFILE_PATH, dockerfile.as_bytes())
        .context("Failed to add Dockerfile to the build context")?;

    let prune_ignored = !ignore.has_exceptions();
    let walker = WalkDir::new(cwd)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !prune_ignored || !entry.file_type().is_dir() {
                return true;
            }
            match entry.path().strip_prefix(cwd) {
                Ok(rel) => !ignore.is_ignored(rel),
                Err(_) => true,
            }
        });

    let mut count = 0;
    for entry in walker {
        let entry = entry.context("Failed to walk the working directory")?;
        let path = entry.path();
        if path == dest {
            continue;
        }

        let rel = path
            .strip_prefix(cwd)
            .with_context(|| format!("Path outside of the build context: {}", path.display()))?;
        if rel == Path::new(DOCKERFILE_PATH) || ignore.is_ignored(rel) {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder
                .append_dir(rel, path)
                .with_context(|| format!("Failed to archive directory: {}", path.display()))?;
        } else if file_type.is_file() || file_type.is_symlink() {
            builder
                .append_path_with_name(path, rel)
                .with_context(|| format!("Failed to archive file: {}", path.display()))?;
        } else {
            // Sockets, fifos and devices cannot be shipped to the engine
            continue;
        }
        count += 1;
    }

    builder
        .into_inner()
        .context("Failed to finish context archive")?
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush context archive")?;

    Ok(count)
}
