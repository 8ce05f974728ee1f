//! Artifact resolution: binary or source, and where it lives.

use crate::platform::Platform;
use crate::repo::RepoUrl;
use crate::types::{PackageName, RVersion, Version};

/// The concrete installable unit for a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A prebuilt binary for the running platform.
    Binary,
    /// A source distribution that must be built.
    Source,
}

impl ArtifactKind {
    /// Path-safe label, used in cache layouts and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Source => "source",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved artifact: what to install and where to get it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Binary or source.
    pub kind: ArtifactKind,
    /// Full locator within the repository.
    pub locator: String,
    /// Artifact file name, also the cache entry name.
    pub file_name: String,
}

/// Decide binary vs. source for one package and construct its locator.
///
/// The decision is a pure function of (platform, package, version, repo):
/// the scheduler calls this repeatedly and concurrently and must always get
/// the same answer. Binaries are used whenever the platform supports them
/// and has a binary area for this interpreter version; everything else falls
/// back to a source build.
pub fn resolve(
    pkg: &PackageName,
    version: &Version,
    platform: &Platform,
    repo: &RepoUrl,
    rv: &RVersion,
) -> Artifact {
    if platform.supports_binary() {
        if let Some(subpath) = platform.binary_subpath(rv) {
            let file_name = platform.binary_name(pkg.as_str(), version.as_str());
            let locator = format!(
                "{}/bin/{}/contrib/{}/{}",
                repo.url,
                subpath,
                rv.short(),
                file_name
            );
            return Artifact {
                kind: ArtifactKind::Binary,
                locator,
                file_name,
            };
        }
        tracing::debug!(%pkg, "platform supports binaries but has no binary area, using source");
    }

    let file_name = Platform::source_name(pkg.as_str(), version.as_str());
    let locator = format!("{}/src/contrib/{}", repo.url, file_name);
    Artifact {
        kind: ArtifactKind::Source,
        locator,
        file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Os;

    fn cran() -> RepoUrl {
        RepoUrl::new("CRAN", "https://cran.r-project.org")
    }

    #[test]
    fn binary_locator_on_macos() {
        let artifact = resolve(
            &PackageName::new("R6"),
            &Version::new("2.5.0"),
            &Platform::new(Os::MacOs, None),
            &cran(),
            &RVersion::new(4, 1, 2),
        );
        assert_eq!(artifact.kind, ArtifactKind::Binary);
        assert_eq!(
            artifact.locator,
            "https://cran.r-project.org/bin/macosx/contrib/4.1/R6_2.5.0.tgz"
        );
    }

    #[test]
    fn binary_locator_on_windows() {
        let artifact = resolve(
            &PackageName::new("glue"),
            &Version::new("1.4.2"),
            &Platform::new(Os::Windows, None),
            &cran(),
            &RVersion::new(4, 0, 5),
        );
        assert_eq!(artifact.kind, ArtifactKind::Binary);
        assert_eq!(
            artifact.locator,
            "https://cran.r-project.org/bin/windows/contrib/4.0/glue_1.4.2.zip"
        );
    }

    #[test]
    fn linux_with_known_codename_gets_binaries() {
        let artifact = resolve(
            &PackageName::new("rlang"),
            &Version::new("0.4.11"),
            &Platform::new(Os::Linux, Some("bionic")),
            &cran(),
            &RVersion::new(4, 1, 0),
        );
        assert_eq!(artifact.kind, ArtifactKind::Binary);
        assert_eq!(
            artifact.locator,
            "https://cran.r-project.org/bin/bionic/contrib/4.1/rlang_0.4.11_R_x86_64-pc-linux-gnu.tar.gz"
        );
    }

    #[test]
    fn unsupported_platform_falls_back_to_source() {
        let artifact = resolve(
            &PackageName::new("rlang"),
            &Version::new("0.4.11"),
            &Platform::new(Os::Linux, None),
            &cran(),
            &RVersion::new(4, 1, 0),
        );
        assert_eq!(artifact.kind, ArtifactKind::Source);
        assert_eq!(
            artifact.locator,
            "https://cran.r-project.org/src/contrib/rlang_0.4.11.tar.gz"
        );
    }

    #[test]
    fn resolution_is_rederivable() {
        let platform = Platform::new(Os::MacOs, None);
        let rv = RVersion::new(4, 1, 2);
        let a = resolve(
            &PackageName::new("cli"),
            &Version::new("2.5.0"),
            &platform,
            &cran(),
            &rv,
        );
        let b = resolve(
            &PackageName::new("cli"),
            &Version::new("2.5.0"),
            &platform,
            &cran(),
            &rv,
        );
        assert_eq!(a, b);
    }
}
