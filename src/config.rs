//! Declarative build configuration (`layercake.yml`).
//!
//! The file maps image names to [`ImageSpec`]s under `build.images`, plus
//! run-wide build settings and the log level. Command-line overrides are
//! merged on top with [`Config::apply_overrides`].

use crate::error::LayercakeError;
use crate::script::BuildScript;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// File names searched in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["layercake.yml", "layercake.yaml"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Working directory used as the build context. Not part of the file.
    #[serde(skip)]
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildConfig {
    /// Declared images keyed by name, iterated in name order.
    #[serde(default)]
    pub images: BTreeMap<String, ImageSpec>,
    /// Global build args; per-image args take precedence.
    #[serde(default)]
    pub args: HashMap<String, String>,
    #[serde(default)]
    pub no_cache: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub pull: bool,
    #[serde(default)]
    pub force_rm: bool,
    /// Memory limit for build containers, in bytes.
    pub memory: Option<u64>,
    pub cpu_shares: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageSpec {
    pub from: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub args: HashMap<String, String>,
    #[serde(default)]
    pub scripts: Vec<BuildScript>,
    #[serde(default)]
    pub cache_from: Vec<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ImageSpec {
    /// Names of the images this one imports, in script order.
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().filter_map(BuildScript::import_name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// One of `error`, `warn`, `info`, `debug`, `trace`.
    pub level: Option<String>,
}

impl LogConfig {
    /// Maps the configured level onto the notifier's verbosity scale.
    pub fn verbosity(&self) -> u8 {
        match self.level.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("info") => 1,
            Some("debug") => 2,
            Some("trace") => 3,
            _ => 0,
        }
    }
}

/// Settings given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub args: Vec<(String, String)>,
    pub dry_run: bool,
    pub no_cache: bool,
    pub pull: bool,
    pub force_rm: bool,
}

impl Config {
    /// Loads the config from `path`, or from the first default file found in `cwd`.
    pub fn load(path: Option<&Path>, cwd: &Path) -> Result<Self> {
        let path = match path {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => cwd.join(p),
            None => DEFAULT_CONFIG_FILES
                .iter()
                .map(|name| cwd.join(name))
                .find(|p| p.exists())
                .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_FILES[0])),
        };

        if !path.exists() {
            return Err(LayercakeError::ConfigNotFound(path).into());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.cwd = cwd.to_path_buf();
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| LayercakeError::InvalidConfig(e.to_string()).into())
    }

    pub fn apply_overrides(&mut self, overrides: BuildOverrides) {
        for (key, value) in overrides.args {
            self.build.args.insert(key, value);
        }

        self.build.dry_run |= overrides.dry_run;
        self.build.no_cache |= overrides.no_cache;
        self.build.pull |= overrides.pull;
        self.build.force_rm |= overrides.force_rm;
    }
}

/// Parses a `KEY=VALUE` command-line build arg.
pub fn parse_build_arg(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid build arg {:?}, expected KEY=VALUE", s)),
    }
}
