//! Installed-version gate.
//!
//! Decides, before any build work starts, whether the root package needs to
//! be built at all, and which of its dependencies are already satisfied.
//! The gate never terminates the process: it returns a [`GateDecision`] and
//! the run driver decides what that means for the exit code.

use foopkg_schema::{PackageName, PackageSpec, Version, release_id};
use thiserror::Error;
use tracing::debug;

use crate::records::{InstallRecordStore, InstalledRecord, RecordError};

#[derive(Error, Debug)]
pub enum GateError {
    #[error(transparent)]
    Records(#[from] RecordError),

    #[error("failed to read confirmation: {0}")]
    Prompt(#[from] std::io::Error),
}

/// Asks the user a yes/no question.
pub trait Confirm: Send + Sync {
    /// Ask `message`; `default` is the answer an empty reply stands for.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer cannot be read.
    fn confirm(&self, message: &str, default: Option<bool>) -> std::io::Result<bool>;
}

/// Answers every question with yes (`--yes`).
#[derive(Debug, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _: &str, _: Option<bool>) -> std::io::Result<bool> {
        Ok(true)
    }
}

/// Outcome of the root package check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Build and install.
    Proceed,
    /// The exact release is already installed; nothing to do.
    AlreadySatisfied,
    /// Another release is installed and the user chose not to continue.
    Declined,
}

pub struct InstallationGate<'a> {
    records: &'a dyn InstallRecordStore,
    confirm: &'a dyn Confirm,
    reinstall: bool,
}

impl std::fmt::Debug for InstallationGate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationGate")
            .field("reinstall", &self.reinstall)
            .finish_non_exhaustive()
    }
}

impl<'a> InstallationGate<'a> {
    pub fn new(records: &'a dyn InstallRecordStore, confirm: &'a dyn Confirm) -> Self {
        Self {
            records,
            confirm,
            reinstall: false,
        }
    }

    /// Build the root package even if its exact release is installed.
    pub fn with_reinstall(mut self, reinstall: bool) -> Self {
        self.reinstall = reinstall;
        self
    }

    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn is_exactly_installed(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<bool, GateError> {
        Ok(self.records.contains(name, version)?)
    }

    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn matching_installed(&self, name: &PackageName) -> Result<Vec<InstalledRecord>, GateError> {
        Ok(self.records.matching(name)?)
    }

    /// Decide whether the root package of a run should be built.
    ///
    /// An exact match short-circuits the run unless reinstalling. Any other
    /// installed release of the same name needs explicit confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger or the confirmation cannot be read.
    pub fn check_root_package(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<GateDecision, GateError> {
        if !self.reinstall && self.is_exactly_installed(name, version)? {
            return Ok(GateDecision::AlreadySatisfied);
        }

        let target = release_id(name, version);
        let others: Vec<String> = self
            .matching_installed(name)?
            .iter()
            .map(InstalledRecord::id)
            .filter(|id| *id != target)
            .collect();
        if others.is_empty() {
            return Ok(GateDecision::Proceed);
        }

        let message = format!(
            "Matching package{} {} installed. Do you want to continue installation?",
            if others.len() == 1 { "" } else { "s" },
            others.join(", ")
        );
        if self.confirm.confirm(&message, None)? {
            Ok(GateDecision::Proceed)
        } else {
            Ok(GateDecision::Declined)
        }
    }

    /// Drop every package whose exact release is already installed,
    /// keeping the relative order of the rest.
    ///
    /// Packages without a version cannot match a record and are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn filter_already_satisfied(
        &self,
        plan: Vec<PackageSpec>,
    ) -> Result<(Vec<PackageSpec>, Vec<PackageSpec>), GateError> {
        let mut pending = Vec::with_capacity(plan.len());
        let mut satisfied = Vec::new();
        for spec in plan {
            let installed = match &spec.version {
                Some(version) => self.is_exactly_installed(&spec.name, version)?,
                None => false,
            };
            if installed {
                debug!("{} already installed, skipping", spec.name);
                satisfied.push(spec);
            } else {
                pending.push(spec);
            }
        }
        Ok((pending, satisfied))
    }
}
