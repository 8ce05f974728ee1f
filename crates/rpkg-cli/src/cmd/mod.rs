//! Command modules - one file per CLI command, plus the shared planning
//! context they both build.

pub mod install;
pub mod plan;

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

use rpkg_core::config::Config;
use rpkg_core::graph::{DependencyGraph, base_packages};
use rpkg_core::library::library_path;
use rpkg_core::lockfile::parse_records;
use rpkg_core::platform::Platform;
use rpkg_core::types::{PackageName, RVersion};
use rpkg_core::{PackageCache, RepoUrl};

/// Everything both `plan` and `install` need, loaded and validated once.
pub(crate) struct PlanContext {
    pub config: Config,
    pub graph: DependencyGraph,
    pub platform: Platform,
    pub repos: Vec<RepoUrl>,
    pub rv: RVersion,
    pub library: String,
    pub workers: usize,
}

impl PlanContext {
    /// Load configuration and records, validate the graph, and snapshot the
    /// platform. Any error here is fatal: nothing gets scheduled after it.
    pub(crate) fn load(config_path: &Path, threads: Option<usize>) -> Result<Self> {
        let config = Config::load(config_path)?;

        let record_text = std::fs::read_to_string(&config.lockfile.path).with_context(|| {
            format!("could not read lockfile {}", config.lockfile.path.display())
        })?;
        let records = parse_records(&record_text);

        for requested in &config.packages {
            let name = PackageName::new(requested);
            if !records.iter().any(|r| r.package == name) {
                tracing::warn!(package = %requested, "requested package has no lockfile record");
            }
        }

        let graph = DependencyGraph::build(records, &base_packages())?;
        let platform = Platform::detect();
        let rv = detect_r_version("R").unwrap_or_else(|| {
            tracing::warn!("could not determine the R version, assuming 4.1.0");
            RVersion::new(4, 1, 0)
        });

        let library = library_path(
            &config.lockfile.kind,
            &rv,
            &platform_string(),
            &config.library,
        );

        let workers = threads.unwrap_or_else(|| config.worker_count());
        let repos = config.repo_urls();

        Ok(Self {
            config,
            graph,
            platform,
            repos,
            rv,
            library,
            workers,
        })
    }

    pub(crate) fn open_cache(&self) -> Result<PackageCache> {
        let root = self
            .config
            .cache_dir
            .clone()
            .unwrap_or_else(PackageCache::default_root);
        PackageCache::new(root).context("could not open the package cache")
    }

    /// Whether a package was asked for by name, as opposed to pulled in as
    /// a dependency.
    pub(crate) fn is_user_defined(&self, pkg: &PackageName) -> bool {
        self.config.packages.iter().any(|p| pkg == p.as_str())
    }
}

/// The platform label used in library layouts, e.g. `x86_64-linux`.
pub(crate) fn platform_string() -> String {
    format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS)
}

/// Ask the external tool for its version: the first `major.minor.patch`
/// token in `R --version` output.
fn detect_r_version(program: &str) -> Option<RVersion> {
    let output = Command::new(program).arg("--version").output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    for token in text.split_whitespace() {
        let mut parts = token.split('.');
        if let (Some(major), Some(minor), Some(patch)) =
            (parts.next(), parts.next(), parts.next())
        {
            if let (Ok(major), Ok(minor), Ok(patch)) =
                (major.parse(), minor.parse(), patch.parse())
            {
                return Some(RVersion::new(major, minor, patch));
            }
        }
    }
    None
}
