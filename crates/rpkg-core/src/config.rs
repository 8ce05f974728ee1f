//! Project configuration (`rpkg.toml`).
//!
//! The loader validates once; the rest of the crate treats the result as an
//! immutable snapshot for the whole run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::repo::RepoUrl;

/// Configuration loading errors. Unreadable or unparseable configuration is
/// fatal; nothing is scheduled afterwards.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level project configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Packages the user asked for (dependencies are resolved on top).
    #[serde(default)]
    pub packages: Vec<String>,

    /// Upstream repositories, in priority order.
    #[serde(default)]
    pub repos: Vec<RepoEntry>,

    /// Lockfile convention in effect for this project.
    #[serde(default)]
    pub lockfile: Lockfile,

    /// Per-package build customizations, keyed by package name.
    #[serde(default)]
    pub customizations: HashMap<String, PkgConfig>,

    /// Worker threads; 0 means one per CPU.
    #[serde(default)]
    pub threads: usize,

    /// Install library directory for native (no-lockfile) projects.
    #[serde(default = "default_library")]
    pub library: String,

    /// Artifact cache root; defaults to the shared per-user cache.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

/// One `[[repos]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoEntry {
    /// Repository name referenced by record `Source` fields.
    pub name: String,
    /// Repository base URL.
    pub url: String,
}

impl RepoEntry {
    /// Convert to the core repository type.
    pub fn to_repo(&self) -> RepoUrl {
        RepoUrl::new(&self.name, &self.url)
    }
}

/// `[lockfile]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct Lockfile {
    /// `renv`, `packrat`, or empty for a native library.
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Record file holding the pinned package blocks.
    #[serde(default = "default_lockfile_path")]
    pub path: PathBuf,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self {
            kind: String::new(),
            path: default_lockfile_path(),
        }
    }
}

/// Per-package customization: `[customizations.<pkg>]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PkgConfig {
    /// Environment overrides applied only to this package's build.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_library() -> String {
    "library".to_string()
}

fn default_lockfile_path() -> PathBuf {
    PathBuf::from("rpkg.lock")
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Configured repositories as core types, preserving priority order.
    pub fn repo_urls(&self) -> Vec<RepoUrl> {
        self.repos.iter().map(RepoEntry::to_repo).collect()
    }

    /// Effective worker count: the configured value, or one per CPU.
    pub fn worker_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}
