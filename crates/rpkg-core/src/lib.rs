//! rpkg-core - the planning and scheduling engine behind rpkg.
//!
//! Given a set of requested packages and a collection of upstream
//! repositories, this crate resolves a full dependency graph, decides per
//! package whether a prebuilt binary or a source build applies, routes
//! artifacts through a shared cache, and drives a bounded pool of worker
//! threads that invoke the external build tool in dependency order.
//!
//! # Architecture
//!
//! - **Pure planning, explicit execution**: everything up to the
//!   [`scheduler::Scheduler`] is a pure function of its inputs (platform
//!   snapshot, records, config); only the scheduler performs I/O, and only
//!   through the [`runner::ProcessRunner`] capability.
//! - **Immutable snapshots**: the scheduler runs against a frozen
//!   [`graph::DependencyGraph`], [`platform::Platform`], and
//!   [`settings::BuildSettings`]; nothing global mutates mid-run.
//! - **Newtypes**: [`types::PackageName`] and [`types::Version`] keep
//!   identifiers from mixing.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.rpkg/
//! └── cache/                      # Shared artifact cache
//!     └── CRAN-abc123def456/      # One namespace per repository identity
//!         ├── binary/
//!         └── source/
//! ```

pub mod artifact;
pub mod cache;
pub mod config;
pub mod graph;
pub mod library;
pub mod lockfile;
pub mod platform;
pub mod repo;
pub mod runner;
pub mod scheduler;
pub mod settings;
pub mod types;

// Re-exports for convenience
pub use cache::PackageCache;
pub use config::Config;
pub use graph::DependencyGraph;
pub use platform::Platform;
pub use repo::RepoUrl;
pub use runner::{ProcessRunner, SystemRunner};
pub use scheduler::{InstallReport, Scheduler};
pub use types::{PackageName, RVersion, Version};

use std::path::PathBuf;

/// The per-user rpkg directory, or `None` if home cannot be resolved.
pub fn try_rpkg_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("RPKG_HOME") {
        return Some(PathBuf::from(val));
    }
    dirs::home_dir().map(|h| h.join(".rpkg"))
}

/// The per-user rpkg directory (`~/.rpkg`, or `$RPKG_HOME`).
///
/// # Panics
/// Panics if the home directory cannot be determined.
pub fn rpkg_home() -> PathBuf {
    try_rpkg_home().expect("could not determine home directory")
}
