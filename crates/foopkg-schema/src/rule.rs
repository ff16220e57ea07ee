//! Rule document model.
//!
//! A rule document is a JSON object keyed by package name. [`RuleEntry`] is
//! the on-disk shape of one value; [`PackageSpec`] is the normalized form the
//! rest of the workspace works with, where absent and empty fields collapse
//! into `None` and build flags become plain booleans.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::{PackageName, Version};

/// One package entry exactly as written in a rule document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleEntry {
    /// Release version, e.g. `"6.3.0"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// URL or local path of the source archive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Names of packages that must be installed first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,

    /// Optional build customisation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSection>,
}

/// The `build` object of a rule entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildSection {
    /// Run configure from a scratch directory instead of the source tree.
    pub outside_source_dir: bool,
    /// Extra arguments appended to the configure invocation.
    pub configure_args: Vec<String>,
    /// Build tool to use instead of the configured `make`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make_binary: Option<PathBuf>,
    /// Extra arguments appended to the compile invocation.
    pub make_args: Vec<String>,
    /// Skip the install stage entirely.
    pub no_make_install: bool,
}

/// Normalized build options of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Configure and compile from a scratch directory.
    pub out_of_tree: bool,
    /// Appended verbatim, in order, after the configure script path.
    pub configure_args: Vec<String>,
    /// Replaces the default build tool when set.
    pub make_binary: Option<PathBuf>,
    /// Appended verbatim, in order, after the job-count argument.
    pub make_args: Vec<String>,
    /// Never run the install stage for this package.
    pub skip_install: bool,
}

impl From<BuildSection> for BuildOptions {
    fn from(section: BuildSection) -> Self {
        Self {
            out_of_tree: section.outside_source_dir,
            configure_args: section.configure_args,
            make_binary: section.make_binary.filter(|p| !p.as_os_str().is_empty()),
            make_args: section.make_args,
            skip_install: section.no_make_install,
        }
    }
}

/// Errors raised when a spec is not complete enough to be built.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SpecError {
    /// A field required by the build pipeline is absent or empty.
    #[error("package '{package}' has no {field} defined")]
    MissingField {
        /// Package whose spec is incomplete.
        package: PackageName,
        /// Name of the missing field (`version` or `url`).
        field: &'static str,
    },
}

/// Declarative description of one buildable package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Identity key, equal to the rule mapping key.
    pub name: PackageName,
    /// Release version; `None` when the rules leave it out.
    pub version: Option<Version>,
    /// Archive location; `None` when the rules leave it out.
    pub source: Option<String>,
    /// Declared dependencies, in document order. Duplicates are allowed.
    pub dependencies: Vec<PackageName>,
    /// Build customisation.
    pub build: BuildOptions,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl PackageSpec {
    /// Normalize a raw rule entry registered under `name`.
    pub fn from_entry(name: PackageName, entry: RuleEntry) -> Self {
        Self {
            name,
            version: non_empty(entry.version).map(Version::from),
            source: non_empty(entry.url),
            dependencies: entry.depends.into_iter().map(PackageName::from).collect(),
            build: entry.build.map(BuildOptions::from).unwrap_or_default(),
        }
    }

    /// A spec with no dependencies or build options, used for a root target
    /// that the rules do not know about.
    pub fn ad_hoc(name: PackageName, version: Version, source: String) -> Self {
        Self {
            name,
            version: Some(version),
            source: Some(source),
            dependencies: Vec::new(),
            build: BuildOptions::default(),
        }
    }

    /// Return a copy with the given version and source replacing the
    /// declared ones. `None` keeps the declared value.
    pub fn with_overrides(&self, version: Option<&str>, source: Option<&str>) -> Self {
        let mut spec = self.clone();
        if let Some(v) = non_empty(version.map(str::to_string)) {
            spec.version = Some(Version::from(v));
        }
        if let Some(s) = non_empty(source.map(str::to_string)) {
            spec.source = Some(s);
        }
        spec
    }

    /// Version and source, or the first one that is missing.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::MissingField`] if either field is absent.
    pub fn buildable(&self) -> Result<(&Version, &str), SpecError> {
        let version = self.version.as_ref().ok_or_else(|| SpecError::MissingField {
            package: self.name.clone(),
            field: "version",
        })?;
        let source = self.source.as_deref().ok_or_else(|| SpecError::MissingField {
            package: self.name.clone(),
            field: "url",
        })?;
        Ok((version, source))
    }
}

/// The merged rule mapping: package name to spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    packages: BTreeMap<PackageName, PackageSpec>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rule set from raw entries keyed by name.
    pub fn from_entries(entries: BTreeMap<String, RuleEntry>) -> Self {
        let packages = entries
            .into_iter()
            .map(|(name, entry)| {
                let name = PackageName::from(name);
                (name.clone(), PackageSpec::from_entry(name, entry))
            })
            .collect();
        Self { packages }
    }

    /// Look up a package by name.
    pub fn get(&self, name: &str) -> Option<&PackageSpec> {
        self.packages.get(name)
    }

    /// Whether a package with this name is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Add or replace a spec, keyed by its name.
    pub fn insert(&mut self, spec: PackageSpec) {
        self.packages.insert(spec.name.clone(), spec);
    }

    /// All known package names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.packages.keys()
    }

    /// Number of defined packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the rule set is empty.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
