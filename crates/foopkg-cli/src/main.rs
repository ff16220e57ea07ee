//! foopkg - build and install packages from source

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use foopkg_cli::cmd;
use foopkg_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install(args) => cmd::install::install(args).await,
        Commands::Deps { package, add_rules } => cmd::deps::deps(&package, &add_rules),
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
