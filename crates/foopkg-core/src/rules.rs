//! Rule document loading and deep merge.
//!
//! Documents are merged as raw JSON first and only then deserialized into a
//! [`RuleSet`], so a later document may add a single field (or a single
//! dependency) to a package without restating the whole entry:
//!
//! - objects merge key by key, recursively
//! - arrays concatenate, later entries after earlier ones
//! - anything else is overwritten by the later document

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use foopkg_schema::{RuleEntry, RuleSet};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("failed to read rules from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {origin}: {source}")]
    Parse {
        origin: String,
        source: serde_json::Error,
    },

    #[error("rules in {0} must be a JSON object keyed by package name")]
    NotAnObject(String),

    #[error("invalid rule for package '{package}': {source}")]
    InvalidEntry {
        package: String,
        source: serde_json::Error,
    },
}

/// Accumulates rule documents into one merged mapping.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    merged: Map<String, Value>,
    sources: Vec<String>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge every `*.json` file of `dir`, in file name order.
    ///
    /// Hidden files and files with any other extension are ignored. A missing directory is not an error: the
    /// store simply stays empty so that `--add-rules` alone still works.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or one of its files cannot be read
    /// or does not contain a JSON object.
    pub fn load_dir(&mut self, dir: &Path) -> Result<(), RulesError> {
        if !dir.is_dir() {
            warn!("Rule directory {} does not exist", dir.display());
            return Ok(());
        }

        let read = std::fs::read_dir(dir).map_err(|source| RulesError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in read {
            let entry = entry.map_err(|source| RulesError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            let json = path.extension().is_some_and(|ext| ext == "json");
            if path.is_file() && json && !hidden {
                files.push(path);
            }
        }
        files.sort();

        for file in files {
            self.merge_file(&file)?;
        }
        Ok(())
    }

    /// Merge one rule file on top of what has been loaded so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not contain a
    /// JSON object.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), RulesError> {
        let content = std::fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.merge_str(&path.display().to_string(), &content)?;
        debug!("Loaded rules from file {}", path.display());
        Ok(())
    }

    /// Merge a rule document given as a JSON string. `origin` names the
    /// document in error messages.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not a JSON object.
    pub fn merge_str(&mut self, origin: &str, json: &str) -> Result<(), RulesError> {
        let value: Value = serde_json::from_str(json).map_err(|source| RulesError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        let Value::Object(document) = value else {
            return Err(RulesError::NotAnObject(origin.to_string()));
        };
        merge_objects(&mut self.merged, document);
        self.sources.push(origin.to_string());
        Ok(())
    }

    /// Documents merged so far, in merge order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// The merged document as raw JSON.
    pub fn merged(&self) -> &Map<String, Value> {
        &self.merged
    }

    /// Deserialize the merged document into a [`RuleSet`].
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::InvalidEntry`] naming the first package whose
    /// merged entry does not match the rule schema.
    pub fn into_rule_set(self) -> Result<RuleSet, RulesError> {
        let mut entries = BTreeMap::new();
        for (package, value) in self.merged {
            let entry: RuleEntry =
                serde_json::from_value(value).map_err(|source| RulesError::InvalidEntry {
                    package: package.clone(),
                    source,
                })?;
            entries.insert(package, entry);
        }
        Ok(RuleSet::from_entries(entries))
    }
}

/// Deep-merge `overlay` into `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => merge_objects(base, overlay),
        (Value::Array(base), Value::Array(overlay)) => base.extend(overlay),
        (base, overlay) => *base = overlay,
    }
}

fn merge_objects(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}
