//! Domain-specific errors for package operations

use std::path::{Path, PathBuf};

use foopkg_core::builder::BuildError;
use foopkg_core::config::ConfigError;
use foopkg_core::gate::GateError;
use foopkg_core::io::download::DownloadError;
use foopkg_core::privilege::PrivilegeError;
use foopkg_core::resolver::ResolveError;
use foopkg_core::rules::RulesError;
use foopkg_schema::PackageName;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error("failed to set up downloads: {0}")]
    Client(#[from] DownloadError),

    /// Missing or contradictory package data that no override supplied.
    #[error("{0}")]
    Configuration(String),

    #[error("building {package} failed: {source}")]
    Build {
        package: PackageName,
        log: PathBuf,
        source: BuildError,
    },
}

impl InstallError {
    /// The build log to point the user at, if the failure has one.
    pub fn log_path(&self) -> Option<&Path> {
        match self {
            Self::Build { log, source, .. } if source.stage().is_some() => Some(log),
            _ => None,
        }
    }
}
