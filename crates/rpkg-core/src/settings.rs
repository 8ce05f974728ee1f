//! Build settings and per-package customization merging.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::types::PackageName;

/// Settings handed to every build invocation.
///
/// `env` applies to every package; `pkg_env` holds per-package overrides
/// merged in from the configuration. Maps are ordered so the environment a
/// build sees is reproducible run to run.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// The external build tool, e.g. `R`.
    pub program: PathBuf,
    /// Library directory installs land in.
    pub library: PathBuf,
    /// Environment applied to every invocation.
    pub env: BTreeMap<String, String>,
    /// Per-package environment overrides, keyed by package name.
    pub pkg_env: BTreeMap<String, BTreeMap<String, String>>,
    /// Kill a build that runs longer than this.
    pub timeout: Option<Duration>,
}

impl BuildSettings {
    /// Settings with an empty environment for the given tool and library.
    pub fn new(program: impl Into<PathBuf>, library: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            library: library.into(),
            env: BTreeMap::new(),
            pkg_env: BTreeMap::new(),
            timeout: None,
        }
    }

    /// The flattened environment for one package's build: base variables
    /// first, then that package's overrides. A package with no overrides
    /// gets exactly the base environment.
    pub fn env_for(&self, pkg: &PackageName) -> Vec<(String, String)> {
        let mut merged = self.env.clone();
        if let Some(overrides) = self.pkg_env.get(pkg.as_str()) {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged.into_iter().collect()
    }
}

/// Merge the configuration's per-package customizations into build settings.
///
/// Every package present in the customization table gets its env map copied
/// under the same name; packages absent from the table are left exactly as
/// in `settings`. Within one package's map, later writes win.
pub fn apply_customizations(config: &Config, mut settings: BuildSettings) -> BuildSettings {
    for (pkg, custom) in &config.customizations {
        let entry = settings.pkg_env.entry(pkg.clone()).or_default();
        for (key, value) in &custom.env {
            entry.insert(key.clone(), value.clone());
        }
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PkgConfig;
    use std::collections::HashMap;

    fn config_with(pkg: &str, key: &str, value: &str) -> Config {
        let mut config = Config::default();
        config.customizations.insert(
            pkg.to_string(),
            PkgConfig {
                env: HashMap::from([(key.to_string(), value.to_string())]),
            },
        );
        config
    }

    #[test]
    fn customizations_land_under_the_package() {
        let config = config_with("data.table", "R_MAKEVARS_USER", "~/.R/Makevars_data.table");
        let settings = apply_customizations(&config, BuildSettings::new("R", "library"));
        assert_eq!(
            settings.pkg_env["data.table"]["R_MAKEVARS_USER"],
            "~/.R/Makevars_data.table"
        );
    }

    #[test]
    fn uncustomized_packages_are_untouched() {
        let config = config_with("boo", "foo", "soo");
        let mut base = BuildSettings::new("R", "library");
        base.pkg_env
            .insert("existing".to_string(), BTreeMap::new());

        let settings = apply_customizations(&config, base);
        assert_eq!(settings.pkg_env["boo"]["foo"], "soo");
        assert!(settings.pkg_env["existing"].is_empty());
        assert!(!settings.pkg_env.contains_key("other"));
    }

    #[test]
    fn env_for_layers_overrides_over_base() {
        let config = config_with("curl", "CURL_CA_BUNDLE", "/etc/ssl/custom.pem");
        let mut base = BuildSettings::new("R", "library");
        base.env.insert("PATH".to_string(), "/usr/bin".to_string());
        base.env
            .insert("CURL_CA_BUNDLE".to_string(), "/etc/ssl/default.pem".to_string());

        let settings = apply_customizations(&config, base);

        let curl_env: BTreeMap<_, _> = settings.env_for(&"curl".into()).into_iter().collect();
        assert_eq!(curl_env["PATH"], "/usr/bin");
        assert_eq!(curl_env["CURL_CA_BUNDLE"], "/etc/ssl/custom.pem");

        let other_env: BTreeMap<_, _> = settings.env_for(&"jsonlite".into()).into_iter().collect();
        assert_eq!(other_env["CURL_CA_BUNDLE"], "/etc/ssl/default.pem");
    }

    #[test]
    fn duplicate_keys_last_write_wins() {
        let mut config = config_with("pkg", "KEY", "first");
        config
            .customizations
            .get_mut("pkg")
            .unwrap()
            .env
            .insert("KEY".to_string(), "second".to_string());

        let settings = apply_customizations(&config, BuildSettings::new("R", "library"));
        assert_eq!(settings.pkg_env["pkg"]["KEY"], "second");
    }
}
