use std::path::{Path, PathBuf};

use foopkg_schema::{PackageName, Version};

/// Default location of the JSON configuration file.
pub const CONFIG_FILE: &str = "/etc/foopkg/config.json";

/// Default directory holding rule documents.
pub const RULE_DIR: &str = "/etc/foopkg/rules.d";

/// Default root of the per-package build trees.
pub const BUILD_DIR_BASE: &str = "/var/build";

/// Default directory where porg keeps one log per installed package.
pub const PORG_LOG_DIR: &str = "/var/log/porg";

/// Returns the configuration file path, honouring `FOOPKG_CONFIG`.
pub fn config_path() -> PathBuf {
    std::env::var_os("FOOPKG_CONFIG").map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from)
}

/// Layout of the build tree rooted at a fixed base path.
///
/// ```text
/// <base>/<name>/
/// ├── <name>-<version>.dl   # downloaded archive
/// ├── <name>-<version>/     # extracted source tree
/// ├── build.log             # stdout/stderr of every stage
/// └── .lock                 # advisory lock held while building
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    base: PathBuf,
}

impl BuildPaths {
    /// Create a layout rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The root of all build trees.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Build directory of one package: `<base>/<name>`.
    pub fn package_dir(&self, name: &PackageName) -> PathBuf {
        self.base.join(name)
    }

    /// Where the source archive of a release is downloaded to.
    pub fn archive_path(&self, name: &PackageName, version: &Version) -> PathBuf {
        self.package_dir(name).join(format!("{name}-{version}.dl"))
    }

    /// Where the archive of a release is extracted to.
    pub fn source_dir(&self, name: &PackageName, version: &Version) -> PathBuf {
        self.package_dir(name).join(format!("{name}-{version}"))
    }

    /// The build log of a package.
    pub fn log_path(&self, name: &PackageName) -> PathBuf {
        self.package_dir(name).join("build.log")
    }

    /// The advisory lock file of a package.
    pub fn lock_path(&self, name: &PackageName) -> PathBuf {
        self.package_dir(name).join(".lock")
    }
}

impl Default for BuildPaths {
    fn default() -> Self {
        Self::new(BUILD_DIR_BASE)
    }
}

/// Whether a source location refers to the local filesystem.
pub fn is_local_source(source: &str) -> bool {
    source.starts_with("file://") || !source.contains("://")
}

/// Strip an optional `file://` scheme from a local source location.
pub fn local_source_path(source: &str) -> &Path {
    Path::new(source.strip_prefix("file://").unwrap_or(source))
}
