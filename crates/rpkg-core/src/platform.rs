//! Platform capability detection.
//!
//! Whether prebuilt binaries can be used, and how artifacts are named,
//! depends on the operating system family. All of that lives here: adding a
//! platform means adding a variant, not another branch at a call site.

use std::process::Command;

use crate::artifact::ArtifactKind;
use crate::types::RVersion;

/// Linux distributions with published binary packages.
const SUPPORTED_CODENAMES: &[&str] = &["bionic", "xenial"];

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
    /// Linux, any distribution.
    Linux,
}

impl Os {
    /// The family this build of rpkg is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

/// An immutable snapshot of the running platform's capabilities.
///
/// Built once at startup; everything downstream derives its decisions purely
/// from this value, so the resolver can be called repeatedly and
/// concurrently with identical results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system family.
    pub os: Os,
    /// Distribution codename, Linux only (`bionic`, `focal`, ...).
    pub codename: Option<String>,
}

impl Platform {
    /// Snapshot the current platform, probing the distribution codename on
    /// Linux.
    pub fn detect() -> Self {
        let os = Os::current();
        let codename = match os {
            Os::Linux => probe_codename(),
            _ => None,
        };
        Self { os, codename }
    }

    /// Construct a platform snapshot explicitly (tests, cross-planning).
    pub fn new(os: Os, codename: Option<&str>) -> Self {
        Self {
            os,
            codename: codename.map(str::to_string),
        }
    }

    /// Whether prebuilt binary packages can be installed on this platform.
    ///
    /// macOS and Windows always can. Linux only for the distributions on the
    /// published allow-list; anything else, including an undetermined
    /// codename, falls back to source builds.
    pub fn supports_binary(&self) -> bool {
        match self.os {
            Os::MacOs | Os::Windows => true,
            Os::Linux => match &self.codename {
                Some(codename) if SUPPORTED_CODENAMES.contains(&codename.as_str()) => true,
                Some(codename) => {
                    tracing::warn!(
                        %codename,
                        "this version of Linux does not support binary packages"
                    );
                    false
                }
                None => false,
            },
        }
    }

    /// The artifact kind preferred on this platform when both are available.
    pub fn default_kind(&self) -> ArtifactKind {
        match self.os {
            Os::MacOs | Os::Windows => ArtifactKind::Binary,
            Os::Linux => ArtifactKind::Source,
        }
    }

    /// File name of a prebuilt binary artifact for this platform.
    pub fn binary_name(&self, pkg: &str, version: &str) -> String {
        match self.os {
            Os::MacOs => format!("{pkg}_{version}.tgz"),
            Os::Windows => format!("{pkg}_{version}.zip"),
            Os::Linux => format!("{pkg}_{version}_R_x86_64-pc-linux-gnu.tar.gz"),
        }
    }

    /// File name of a source artifact. Identical on every platform.
    pub fn source_name(pkg: &str, version: &str) -> String {
        format!("{pkg}_{version}.tar.gz")
    }

    /// The repository sub-path binaries are published under, or `None` when
    /// the platform has no binary area (Linux with no known codename).
    pub fn binary_subpath(&self, rv: &RVersion) -> Option<String> {
        match self.os {
            Os::MacOs => {
                if rv.major >= 4 {
                    Some("macosx".to_string())
                } else {
                    Some("macosx/el-capitan".to_string())
                }
            }
            Os::Windows => Some("windows".to_string()),
            Os::Linux => self.codename.clone(),
        }
    }
}

/// Ask `lsb_release` for the distribution codename.
///
/// An absent tool or a failed invocation is not an error: it just means we
/// cannot prove binary support, so the caller falls back to source builds.
fn probe_codename() -> Option<String> {
    if which::which("lsb_release").is_err() {
        tracing::warn!("lsb_release is not installed and is needed for binary detection");
        return None;
    }
    let output = match Command::new("lsb_release").arg("-cs").output() {
        Ok(out) if out.status.success() => out,
        Ok(out) => {
            tracing::warn!(status = ?out.status, "lsb_release failed");
            return None;
        }
        Err(err) => {
            tracing::warn!(%err, "could not run lsb_release");
            return None;
        }
    };
    let codename = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if codename.is_empty() {
        None
    } else {
        Some(codename)
    }
}
