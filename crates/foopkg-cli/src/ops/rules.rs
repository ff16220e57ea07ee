//! Rule loading for a run.

use std::path::{Path, PathBuf};

use foopkg_core::{Reporter, RuleStore};
use foopkg_schema::RuleSet;
use tracing::debug;

use super::InstallError;

/// Merge the rule directory, then each extra file in the order given.
pub fn load_rules(
    rules_dir: &Path,
    extra: &[PathBuf],
    reporter: &dyn Reporter,
) -> Result<RuleSet, InstallError> {
    let mut store = RuleStore::new();
    store.load_dir(rules_dir)?;

    for file in extra {
        let file = std::path::absolute(file).unwrap_or_else(|_| file.clone());
        reporter.info(&format!("Using custom rules from {}", file.display()));
        store.merge_file(&file)?;
    }

    debug!("Merged {} rule documents", store.sources().len());
    Ok(store.into_rule_set()?)
}
