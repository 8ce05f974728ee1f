//! Shared artifact cache.
//!
//! Artifacts are cached under `<root>/<repo identity>/<kind>/<file>`, so two
//! repositories carrying the same package/version never collide, and the
//! same layout can be shared across runs and hosts. A hit short-circuits
//! both fetch and build; the scheduler never invokes the build tool for one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::artifact::ArtifactKind;
use crate::repo::RepoUrl;
use crate::types::{PackageName, Version};

/// Cache access errors.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Underlying filesystem failure.
    #[error("cache IO error: {0}")]
    Io(#[from] io::Error),

    /// The artifact being stored does not exist.
    #[error("no artifact to store at {0}")]
    MissingArtifact(PathBuf),
}

/// Deterministic identity of one cacheable artifact.
///
/// Two artifacts with equal keys are interchangeable. Repository identity is
/// part of the key so equal package/version pairs from different upstreams
/// stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    repo_id: String,
    package: PackageName,
    version: Version,
    kind: ArtifactKind,
}

impl CacheKey {
    /// Build a key from the artifact's coordinates.
    pub fn new(repo: &RepoUrl, package: &PackageName, version: &Version, kind: ArtifactKind) -> Self {
        Self {
            repo_id: repo.identity(),
            package: package.clone(),
            version: version.clone(),
            kind,
        }
    }

    /// Relative location of this entry inside a cache root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.repo_id)
            .join(self.kind.as_str())
            .join(format!("{}_{}", self.package, self.version))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}_{}",
            self.repo_id, self.kind, self.package, self.version
        )
    }
}

/// On-disk artifact cache.
#[derive(Debug)]
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The shared per-user cache root: `$RPKG_HOME/cache` or `~/.rpkg/cache`.
    pub fn default_root() -> PathBuf {
        crate::rpkg_home().join("cache")
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look an artifact up; `Some(path)` on a hit.
    pub fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.root.join(key.relative_path());
        if path.exists() {
            tracing::debug!(%key, "cache hit");
            Some(path)
        } else {
            None
        }
    }

    /// Store a built artifact under `key`, returning its cached path.
    ///
    /// The write goes through a temp sibling and a `rename`, so concurrent
    /// readers of other keys are unaffected and a near-simultaneous
    /// duplicate store of the same key can never leave a torn entry: the
    /// rename swaps in one complete file, and by key-equality both writers
    /// carried interchangeable content.
    pub fn store(&self, key: &CacheKey, artifact: &Path) -> Result<PathBuf, CacheError> {
        if !artifact.exists() {
            return Err(CacheError::MissingArtifact(artifact.to_path_buf()));
        }

        let dest = self.root.join(key.relative_path());
        let parent = dest.parent().expect("cache entries sit under the root");
        fs::create_dir_all(parent)?;

        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        fs::copy(artifact, tmp.path())?;
        tmp.persist(&dest).map_err(|e| CacheError::Io(e.error))?;

        tracing::debug!(%key, path = %dest.display(), "stored artifact");
        Ok(dest)
    }
}
