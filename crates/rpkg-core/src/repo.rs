//! Repository identity.
//!
//! Each configured repository gets a stable, path-safe identifier used as a
//! cache namespace, so caches can be shared across runs and across hosts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A named upstream package repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoUrl {
    /// Configured repository name, e.g. `CRAN`.
    pub name: String,
    /// Repository base URL.
    pub url: String,
}

impl RepoUrl {
    /// Create a new repository reference.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Stable identifier for this repository: `Name-<12 hex chars>`.
    ///
    /// The suffix is a truncated SHA-256 of the URL, so the same URL always
    /// maps to the same cache directory no matter which machine computed it.
    /// The name is kept as a prefix so cache directories stay recognizable.
    pub fn identity(&self) -> String {
        let digest = Sha256::digest(self.url.as_bytes());
        let hash = hex::encode(digest);
        format!("{}-{}", self.name, &hash[..12])
    }
}

impl std::fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}
