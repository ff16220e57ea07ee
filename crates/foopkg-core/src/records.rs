//! Read-only view of the installed-package ledger.
//!
//! The install stage runs through porg, which keeps one log file per
//! installed release, named `<name>-<version>`, in its log directory. The
//! directory listing itself is therefore the ledger.

use std::path::{Path, PathBuf};

use foopkg_schema::{PackageName, Version, release_id};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("invalid ledger pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("failed to read ledger entry: {0}")]
    Glob(#[from] glob::GlobError),
}

/// One installed release.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstalledRecord {
    pub name: PackageName,
    pub version: Version,
}

impl InstalledRecord {
    /// The `<name>-<version>` identity of the record.
    pub fn id(&self) -> String {
        release_id(&self.name, &self.version)
    }
}

impl std::fmt::Display for InstalledRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// Lookup interface over the ledger. Never writes.
pub trait InstallRecordStore: Send + Sync {
    /// Every record of `name`, whatever its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    fn matching(&self, name: &PackageName) -> Result<Vec<InstalledRecord>, RecordError>;

    /// Whether exactly `name` at `version` is recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    fn contains(&self, name: &PackageName, version: &Version) -> Result<bool, RecordError> {
        Ok(self
            .matching(name)?
            .iter()
            .any(|record| &record.version == version))
    }
}

/// The porg log directory, by default `/var/log/porg`.
#[derive(Debug, Clone)]
pub struct PorgLedger {
    dir: PathBuf,
}

impl PorgLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl InstallRecordStore for PorgLedger {
    fn matching(&self, name: &PackageName) -> Result<Vec<InstalledRecord>, RecordError> {
        let prefix = format!("{name}-");
        let pattern = format!(
            "{}/{}*",
            glob::Pattern::escape(&self.dir.to_string_lossy()),
            glob::Pattern::escape(&prefix)
        );

        let mut records = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let Some(version) = file_name.strip_prefix(&prefix) else {
                continue;
            };
            if version.is_empty() {
                continue;
            }
            records.push(InstalledRecord {
                name: name.clone(),
                version: Version::new(version),
            });
        }
        records.sort();
        Ok(records)
    }

    fn contains(&self, name: &PackageName, version: &Version) -> Result<bool, RecordError> {
        Ok(self.dir.join(release_id(name, version)).exists())
    }
}
