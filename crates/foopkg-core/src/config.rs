//! Host configuration, loaded from `/etc/foopkg/config.json`.
//!
//! Every field is optional; a missing file is the same as `{}`. The rule and
//! build directories can also be overridden through `FOOPKG_RULES_DIR` and
//! `FOOPKG_BUILD_DIR`, which take precedence over the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::builder::Toolchain;
use crate::paths::{self, BuildPaths};

/// Default location of the make tool.
const DEFAULT_MAKE: &str = "/usr/bin/make";

/// Default location of the porg package tracker.
const DEFAULT_PORG: &str = "/usr/local/bin/porg";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Proxy URLs applied to the download client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory whose rule documents are merged on every run.
    pub rules_dir: PathBuf,
    /// Root of the per-package build trees.
    pub build_dir: PathBuf,
    /// Directory porg writes its per-package logs to.
    pub porg_log_dir: PathBuf,
    /// The porg binary used by the install stage.
    pub porg: PathBuf,
    /// Build tool; `None` means `/usr/bin/make`, then `make` on `PATH`.
    pub make: Option<PathBuf>,
    pub proxy: Option<ProxyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules_dir: PathBuf::from(paths::RULE_DIR),
            build_dir: PathBuf::from(paths::BUILD_DIR_BASE),
            porg_log_dir: PathBuf::from(paths::PORG_LOG_DIR),
            porg: PathBuf::from(DEFAULT_PORG),
            make: None,
            proxy: None,
        }
    }
}

impl Config {
    /// Load the configuration from [`paths::config_path`] and apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::load_from(&paths::config_path())?.with_env_overrides())
    }

    /// Load the configuration from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os("FOOPKG_RULES_DIR") {
            self.rules_dir = PathBuf::from(dir);
        }
        if let Some(dir) = std::env::var_os("FOOPKG_BUILD_DIR") {
            self.build_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn build_paths(&self) -> BuildPaths {
        BuildPaths::new(&self.build_dir)
    }

    /// The build tool: the configured one, the stock location, or whatever
    /// `make` resolves to on `PATH`.
    pub fn make_tool(&self) -> PathBuf {
        if let Some(make) = &self.make {
            return make.clone();
        }
        let stock = Path::new(DEFAULT_MAKE);
        if stock.exists() {
            return stock.to_path_buf();
        }
        which::which("make").unwrap_or_else(|_| PathBuf::from("make"))
    }

    /// Toolchain for the orchestrator, using every available CPU as the
    /// job count.
    pub fn toolchain(&self) -> Toolchain {
        Toolchain {
            make: self.make_tool(),
            porg: self.porg.clone(),
            jobs: num_cpus::get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = tempdir().unwrap();
        let config = Config::load_from(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"build_dir": "/tmp/build", "proxy": {"https": "http://proxy:3128"}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.build_dir, PathBuf::from("/tmp/build"));
        assert_eq!(config.rules_dir, PathBuf::from(paths::RULE_DIR));
        assert_eq!(
            config.proxy.and_then(|p| p.https).as_deref(),
            Some("http://proxy:3128")
        );
    }

    #[test]
    fn test_configured_make_wins() {
        let config = Config {
            make: Some(PathBuf::from("/opt/bin/gmake")),
            ..Config::default()
        };
        assert_eq!(config.make_tool(), PathBuf::from("/opt/bin/gmake"));
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
