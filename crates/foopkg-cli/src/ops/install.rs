//! The install run driver.
//!
//! One request becomes: load rules → settle the root package → resolve →
//! gate → build each remaining package in order. The plan is computed once
//! and never revisited; the first build failure ends the run, leaving every
//! package built before it installed.

use std::path::PathBuf;
use std::time::Instant;

use foopkg_core::gate::GateError;
use foopkg_core::privilege;
use foopkg_core::resolver::{self, ResolveError};
use foopkg_core::GateDecision;
use foopkg_schema::{PackageName, PackageSpec, RuleSet, Version};
use tracing::{debug, info};

use super::rules::load_rules;
use super::{InstallError, RunContext};

/// Maximum number of "did you mean" names offered for an unknown package.
const SUGGESTIONS: usize = 3;

/// What the user asked for, as parsed from the command line.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub package: PackageName,
    /// `--version` override for the root package.
    pub version: Option<String>,
    /// `--file` override for the root package.
    pub file: Option<String>,
    pub add_rules: Vec<PathBuf>,
    pub no_deps: bool,
    pub reinstall: bool,
}

impl InstallRequest {
    pub fn new(package: PackageName) -> Self {
        Self {
            package,
            version: None,
            file: None,
            add_rules: Vec::new(),
            no_deps: false,
            reinstall: false,
        }
    }
}

/// How a run ended when nothing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// These packages were built (and installed unless dry-running), in
    /// order. Dependencies found already installed are listed in `skipped`.
    Built {
        built: Vec<(PackageName, Version)>,
        skipped: Vec<PackageName>,
    },
    /// The exact root release is already installed.
    AlreadySatisfied(PackageName, Version),
    /// The user answered no to a confirmation.
    Declined,
}

/// Run one install request to completion.
pub async fn run(ctx: &RunContext, req: &InstallRequest) -> Result<RunOutcome, InstallError> {
    let start = Instant::now();
    let reporter = ctx.reporter.as_ref();

    let mut rules = load_rules(&ctx.config.rules_dir, &req.add_rules, reporter)?;

    let Some(root) = settle_root(ctx, req, &rules)? else {
        return Ok(RunOutcome::Declined);
    };
    let (root_version, _) = root
        .buildable()
        .map_err(|e| InstallError::Configuration(e.to_string()))?;
    let root_version = root_version.clone();
    rules.insert(root.clone());

    let gate = ctx.gate(req.reinstall);
    match gate.check_root_package(&root.name, &root_version)? {
        GateDecision::Proceed => {}
        GateDecision::AlreadySatisfied => {
            return Ok(RunOutcome::AlreadySatisfied(root.name, root_version));
        }
        GateDecision::Declined => return Ok(RunOutcome::Declined),
    }

    let plan = if req.no_deps {
        vec![root.clone()]
    } else {
        reporter.section("Resolving dependencies");
        let order = resolver::resolve(&root.name, &rules)?;
        debug!("Install order: {order:?}");
        specs_for(&order, &rules)?
    };

    // The root passed its own check above; only dependencies are filtered.
    let mut deps = plan;
    deps.pop();
    let (mut pending, satisfied) = gate.filter_already_satisfied(deps)?;
    for spec in &satisfied {
        reporter.info(&format!("{} already installed, skipping", spec.name));
    }
    pending.push(root);

    // Refuse the whole plan up front rather than half-way through it.
    for spec in &pending {
        spec.buildable()
            .map_err(|e| InstallError::Configuration(e.to_string()))?;
    }

    if !ctx.flags.dry_run {
        privilege::ensure_root()?;
    }

    let orchestrator = ctx.orchestrator();
    let mut built = Vec::with_capacity(pending.len());
    for spec in &pending {
        let log = orchestrator
            .run(spec)
            .await
            .map_err(|source| InstallError::Build {
                package: spec.name.clone(),
                log: ctx.paths.log_path(&spec.name),
                source,
            })?;
        info!("{} logged to {}", spec.name, log.display());
        if let Some(version) = &spec.version {
            built.push((spec.name.clone(), version.clone()));
        }
    }

    let action = if ctx.flags.dry_run { "built" } else { "installed" };
    reporter.summary(built.len(), action, start.elapsed().as_secs_f64());

    Ok(RunOutcome::Built {
        built,
        skipped: satisfied.into_iter().map(|spec| spec.name).collect(),
    })
}

/// The root package with overrides applied, or `None` if the user declined
/// to build a package the rules do not know.
fn settle_root(
    ctx: &RunContext,
    req: &InstallRequest,
    rules: &RuleSet,
) -> Result<Option<PackageSpec>, InstallError> {
    if let Some(spec) = rules.get(&req.package) {
        return Ok(Some(
            spec.with_overrides(req.version.as_deref(), req.file.as_deref()),
        ));
    }

    let reporter = ctx.reporter.as_ref();
    reporter.error(&format!(
        "rules for package {} not defined in {}",
        req.package,
        ctx.config.rules_dir.display()
    ));
    let suggestions = resolver::suggest(&req.package, rules, SUGGESTIONS);
    if !suggestions.is_empty() {
        let names: Vec<&str> = suggestions.iter().map(PackageName::as_str).collect();
        reporter.info(&format!("Did you mean: {}?", names.join(", ")));
    }

    let (Some(version), Some(file)) = (&req.version, &req.file) else {
        return Err(InstallError::Configuration(format!(
            "no rules for {} and --file/--version not both given; cannot continue",
            req.package
        )));
    };

    let proceed = ctx
        .confirm
        .confirm("Do you want to continue?", Some(false))
        .map_err(GateError::Prompt)?;
    if !proceed {
        return Ok(None);
    }
    Ok(Some(PackageSpec::ad_hoc(
        req.package.clone(),
        Version::from(version.as_str()),
        file.clone(),
    )))
}

fn specs_for(order: &[PackageName], rules: &RuleSet) -> Result<Vec<PackageSpec>, InstallError> {
    order
        .iter()
        .map(|name| {
            rules.get(name).cloned().ok_or_else(|| {
                InstallError::Resolution(ResolveError::UnknownPackage {
                    name: name.clone(),
                    required_by: None,
                })
            })
        })
        .collect()
}
