//! Install command

use anyhow::{Context, Result, bail};
use crossterm::style::Stylize;

use foopkg_core::process::read_last_lines;
use foopkg_core::{Config, RunFlags};
use foopkg_schema::PackageName;

use crate::InstallArgs;
use crate::ops::install::{self, InstallRequest, RunOutcome};
use crate::ops::RunContext;
use crate::ui::Theme;

/// Lines of the failing build log echoed to the terminal.
const LOG_TAIL: usize = 20;

/// Build and install a package and whatever it depends on.
pub async fn install(args: InstallArgs) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let flags = RunFlags {
        dry_run: args.dry_run,
        redownload: args.redownload,
    };
    let ctx = RunContext::from_config(config, flags, args.yes)?;

    let req = InstallRequest {
        version: args.pkg_version,
        file: args.file,
        add_rules: args.add_rules,
        no_deps: args.no_deps,
        reinstall: args.reinstall,
        ..InstallRequest::new(PackageName::new(&args.package))
    };

    match install::run(&ctx, &req).await {
        Ok(RunOutcome::Built { .. }) => Ok(()),
        Ok(RunOutcome::AlreadySatisfied(name, version)) => {
            ctx.reporter.success(&format!(
                "{name} {version} is already installed! If you want to reinstall, pass --reinstall."
            ));
            Ok(())
        }
        Ok(RunOutcome::Declined) => {
            ctx.reporter.info("Nothing done.");
            Ok(())
        }
        Err(err) => {
            ctx.reporter.error(&err.to_string());
            if let Some(log) = err.log_path() {
                let theme = Theme::default();
                eprintln!();
                eprintln!("  {} {}", "Log:".with(theme.colors.secondary), log.display());
                if let Ok(tail) = read_last_lines(log, LOG_TAIL) {
                    for line in tail.lines() {
                        eprintln!("    {}", line.with(theme.colors.secondary));
                    }
                }
            }
            bail!("install of {} failed", req.package)
        }
    }
}
