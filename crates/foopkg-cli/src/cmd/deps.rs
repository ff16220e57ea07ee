//! Deps command: the build order of a package and what is installed

use std::path::PathBuf;

use anyhow::{Context, Result};
use crossterm::style::Stylize;

use foopkg_core::records::RecordError;
use foopkg_core::resolver::{self, ResolveError};
use foopkg_core::{Config, InstallRecordStore, PorgLedger, Reporter};
use foopkg_schema::{PackageName, PackageSpec, RuleSet, Version};

use crate::ops::rules::load_rules;
use crate::ui::{ConsoleReporter, Theme};

/// Install state of one package in the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepStatus {
    /// The rule's exact release is in the ledger.
    Installed,
    /// Only other releases are installed.
    OtherVersions(Vec<Version>),
    NotInstalled,
}

/// Where `spec` stands against the installed-package ledger.
pub fn status_of(
    spec: &PackageSpec,
    records: &dyn InstallRecordStore,
) -> Result<DepStatus, RecordError> {
    let installed = records.matching(&spec.name)?;
    let exact = spec
        .version
        .as_ref()
        .is_some_and(|version| installed.iter().any(|record| &record.version == version));
    if exact {
        return Ok(DepStatus::Installed);
    }
    if installed.is_empty() {
        return Ok(DepStatus::NotInstalled);
    }
    Ok(DepStatus::OtherVersions(
        installed.into_iter().map(|record| record.version).collect(),
    ))
}

/// Print the resolved build order of `package`, dependencies first.
pub fn deps(package: &str, add_rules: &[PathBuf]) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let reporter = ConsoleReporter::new();
    let rules = load_rules(&config.rules_dir, add_rules, &reporter)?;
    let name = PackageName::new(package);

    let order = match resolver::resolve(&name, &rules) {
        Ok(order) => order,
        Err(err @ ResolveError::UnknownPackage { required_by: None, .. }) => {
            suggest(&reporter, package, &rules);
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    let ledger = PorgLedger::new(&config.porg_log_dir);
    let theme = Theme::default();
    reporter.section(&format!("Build order for {package}"));

    for name in &order {
        let Some(spec) = rules.get(name) else {
            continue;
        };
        let version = spec
            .version
            .as_ref()
            .map_or("(no version)", Version::as_str);
        let status = match status_of(spec, &ledger)? {
            DepStatus::Installed => format!("{} installed", theme.icons.success)
                .with(theme.colors.success)
                .to_string(),
            DepStatus::OtherVersions(versions) => {
                let versions: Vec<&str> = versions.iter().map(Version::as_str).collect();
                format!("{} installed: {}", theme.icons.warning, versions.join(", "))
                    .with(theme.colors.warning)
                    .to_string()
            }
            DepStatus::NotInstalled => format!("{} not installed", theme.icons.pending)
                .with(theme.colors.secondary)
                .to_string(),
        };
        println!(
            "  {} {} {status}",
            name.as_str().with(theme.colors.package_name),
            version.with(theme.colors.version),
        );
    }
    Ok(())
}

fn suggest(reporter: &dyn Reporter, package: &str, rules: &RuleSet) {
    let suggestions = resolver::suggest(package, rules, 3);
    if !suggestions.is_empty() {
        let names: Vec<&str> = suggestions.iter().map(PackageName::as_str).collect();
        reporter.info(&format!("Did you mean: {}?", names.join(", ")));
    }
}
