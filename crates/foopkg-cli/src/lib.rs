//! foopkg - build and install packages from source
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Resolves a package's dependencies from the JSON rule database, then
//! fetches, configures, compiles and installs every package that is not
//! already installed, in dependency order. Installs go through porg, whose
//! log directory doubles as the installed-package ledger.
//!
//! # Directory Layout
//!
//! ```text
//! /etc/foopkg/
//! ├── config.json     # optional host configuration
//! └── rules.d/        # rule documents, merged in file name order
//! /var/build/<name>/  # per-package archive, source tree and build.log
//! /var/log/porg/      # one entry per installed <name>-<version>
//! ```

pub mod cmd;
pub mod ops;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "foopkg")]
#[command(author, version = env!("FOOPKG_VERSION"), about = "foopkg - build and install packages from source")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build and install a package and its dependencies
    #[command(visible_alias = "i")]
    Install(InstallArgs),
    /// Show the build order of a package and what is already installed
    Deps {
        /// Package name
        package: String,
        /// Additional rule file, merged after the rule directory
        #[arg(short = 'r', long = "add-rules", value_name = "FILE")]
        add_rules: Vec<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct InstallArgs {
    /// Package name
    pub package: String,

    /// Build everything but skip `make install`
    #[arg(short = 'd', long, visible_alias = "no-install")]
    pub dry_run: bool,

    /// Download the archive even if it is already present
    #[arg(long)]
    pub redownload: bool,

    /// Only build the named package, not its dependencies
    #[arg(long)]
    pub no_deps: bool,

    /// Archive file or URL to use instead of the rule's url
    #[arg(short = 'f', long = "file", value_name = "PATH|URL")]
    pub file: Option<String>,

    /// Version to use instead of the rule's version
    #[arg(short = 'n', long = "version", value_name = "VERSION")]
    pub pkg_version: Option<String>,

    /// Additional rule file, merged after the rule directory
    #[arg(short = 'r', long = "add-rules", value_name = "FILE")]
    pub add_rules: Vec<PathBuf>,

    /// Build the package even if this exact version is installed
    #[arg(long)]
    pub reinstall: bool,

    /// Answer yes to every question
    #[arg(short, long)]
    pub yes: bool,
}
