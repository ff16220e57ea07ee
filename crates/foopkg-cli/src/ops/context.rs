//! Shared run context.
//!
//! Built once per invocation from the configuration and the command-line
//! flags and never modified afterwards. Every collaborator sits behind a
//! trait object so tests can swap in doubles.

use std::fmt;
use std::sync::Arc;

use foopkg_core::gate::AssumeYes;
use foopkg_core::io::{Downloader, HttpDownloader, TarUnpacker, Unpacker};
use foopkg_core::process::{ProcessRunner, SystemRunner};
use foopkg_core::{
    BuildOrchestrator, BuildPaths, Config, Confirm, InstallRecordStore, InstallationGate,
    PorgLedger, Reporter, RunFlags, Toolchain,
};

use super::InstallError;
use crate::ui::{ConsoleReporter, TerminalPrompt};

pub struct RunContext {
    pub config: Config,
    pub paths: BuildPaths,
    pub toolchain: Toolchain,
    pub flags: RunFlags,
    pub reporter: Arc<dyn Reporter>,
    pub downloader: Arc<dyn Downloader>,
    pub unpacker: Arc<dyn Unpacker>,
    pub runner: Arc<dyn ProcessRunner>,
    pub records: Arc<dyn InstallRecordStore>,
    pub confirm: Arc<dyn Confirm>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("paths", &self.paths)
            .field("toolchain", &self.toolchain)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// The production context: HTTP downloads, tar extraction, host
    /// processes, the porg ledger and the terminal.
    pub fn from_config(
        config: Config,
        flags: RunFlags,
        assume_yes: bool,
    ) -> Result<Self, InstallError> {
        let downloader = HttpDownloader::new(config.proxy.as_ref())?;
        let confirm: Arc<dyn Confirm> = if assume_yes {
            Arc::new(AssumeYes)
        } else {
            Arc::new(TerminalPrompt)
        };

        Ok(Self {
            paths: config.build_paths(),
            toolchain: config.toolchain(),
            records: Arc::new(PorgLedger::new(&config.porg_log_dir)),
            config,
            flags,
            reporter: Arc::new(ConsoleReporter::new()),
            downloader: Arc::new(downloader),
            unpacker: Arc::new(TarUnpacker::default()),
            runner: Arc::new(SystemRunner),
            confirm,
        })
    }

    pub fn orchestrator(&self) -> BuildOrchestrator<'_> {
        BuildOrchestrator::new(
            &self.paths,
            &self.toolchain,
            self.downloader.as_ref(),
            self.unpacker.as_ref(),
            self.runner.as_ref(),
            self.reporter.as_ref(),
        )
        .with_flags(self.flags)
    }

    pub fn gate(&self, reinstall: bool) -> InstallationGate<'_> {
        InstallationGate::new(self.records.as_ref(), self.confirm.as_ref()).with_reinstall(reinstall)
    }
}
