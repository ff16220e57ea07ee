use std::collections::HashSet;

use foopkg_schema::{PackageName, RuleSet};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{}", describe_unknown(.name, .required_by.as_ref()))]
    UnknownPackage {
        name: PackageName,
        required_by: Option<PackageName>,
    },

    #[error("Circular dependency detected: {}", join_cycle(.0))]
    Cycle(Vec<PackageName>),
}

fn describe_unknown(name: &PackageName, required_by: Option<&PackageName>) -> String {
    match required_by {
        Some(parent) => format!("Package '{name}' (required by '{parent}') is not defined in the rules"),
        None => format!("Package '{name}' is not defined in the rules"),
    }
}

fn join_cycle(names: &[PackageName]) -> String {
    names
        .iter()
        .map(PackageName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Resolves the transitive dependencies of `target` into installation order.
///
/// Performs a depth-first traversal of the subgraph reachable from `target`,
/// visiting dependencies in declared order and emitting each package after
/// all of its dependencies (post-order). The result therefore contains every
/// package of the closure exactly once, `target` last, and is identical for
/// identical rules.
///
/// # Errors
///
/// Returns [`ResolveError::UnknownPackage`] if `target` or any reachable
/// dependency is missing from `rules`, and [`ResolveError::Cycle`] with the
/// names along the cycle if a reachable package depends on itself, directly
/// or transitively.
pub fn resolve(target: &PackageName, rules: &RuleSet) -> Result<Vec<PackageName>, ResolveError> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut visiting = Vec::new();

    resolve_recursive(target, None, rules, &mut order, &mut visited, &mut visiting)?;

    Ok(order)
}

fn resolve_recursive(
    name: &PackageName,
    parent: Option<&PackageName>,
    rules: &RuleSet,
    order: &mut Vec<PackageName>,
    visited: &mut HashSet<PackageName>,
    visiting: &mut Vec<PackageName>,
) -> Result<(), ResolveError> {
    if visited.contains(name) {
        return Ok(());
    }

    // The in-progress path doubles as the cycle report.
    if let Some(start) = visiting.iter().position(|n| n == name) {
        let mut cycle = visiting[start..].to_vec();
        cycle.push(name.clone());
        return Err(ResolveError::Cycle(cycle));
    }

    let spec = rules
        .get(name)
        .ok_or_else(|| ResolveError::UnknownPackage {
            name: name.clone(),
            required_by: parent.cloned(),
        })?;

    visiting.push(name.clone());
    for dep in &spec.dependencies {
        resolve_recursive(dep, Some(name), rules, order, visited, visiting)?;
    }
    visiting.pop();

    visited.insert(name.clone());
    order.push(name.clone());

    Ok(())
}

/// Up to `limit` rule names that look like `query`, best match first.
pub fn suggest(query: &str, rules: &RuleSet, limit: usize) -> Vec<PackageName> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, &PackageName)> = rules
        .names()
        .filter_map(|name| matcher.fuzzy_match(name, query).map(|score| (score, name)))
        .collect();

    // Highest score first; ties by name keep the output stable.
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, name)| name.clone())
        .collect()
}
