//! Per-package build pipeline.
//!
//! One [`BuildOrchestrator::run`] takes a single package through
//! fetch, extract, configure, compile, install and cleanup, strictly in that
//! order. Every command runs with an explicit working directory and writes
//! into the package's `build.log`:
//!
//! ```text
//! <build>/<name>/
//! ├── <name>-<version>.dl     fetch
//! ├── <name>-<version>/       extract (removed and recreated every run)
//! ├── build-XXXXXX/           configure + compile with out_of_tree
//! └── build.log
//! ```
//!
//! The first failing stage aborts the run. Nothing already installed is
//! rolled back.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, info, warn};

use foopkg_schema::{PackageName, PackageSpec, SpecError, Version, release_id};

use crate::io::download::DownloadError;
use crate::io::extract::ExtractError;
use crate::io::{Downloader, FetchRequest, Unpacker};
use crate::lock::{LockError, PackageLock};
use crate::paths::BuildPaths;
use crate::process::{BuildLog, Invocation, ProcessRunner, describe_exit};
use crate::Reporter;

/// Leading path components dropped from every archive member.
const STRIP_COMPONENTS: usize = 1;

/// A step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Extract,
    Configure,
    Compile,
    Install,
    Cleanup,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Configure => "configure",
            Self::Compile => "compile",
            Self::Install => "install",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a package is in its pipeline.
///
/// `Pending → Fetching → Extracting → Configuring → Compiling → Installing
/// → Done`; any state may move to the terminal `Failed`. `Installing` is
/// skipped when the install stage is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Pending,
    Fetching,
    Extracting,
    Configuring,
    Compiling,
    Installing,
    Done,
    /// The given stage failed. Terminal.
    Failed(Stage),
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fetching => f.write_str("fetching"),
            Self::Extracting => f.write_str("extracting"),
            Self::Configuring => f.write_str("configuring"),
            Self::Compiling => f.write_str("compiling"),
            Self::Installing => f.write_str("installing"),
            Self::Done => f.write_str("done"),
            Self::Failed(stage) => write!(f, "failed ({stage})"),
        }
    }
}

/// Per-invocation switches that change what the pipeline does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    /// Build everything but skip the install stage.
    pub dry_run: bool,
    /// Fetch the archive even if it is already present.
    pub redownload: bool,
}

/// External tools the pipeline drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub make: PathBuf,
    pub porg: PathBuf,
    /// Value passed as `--jobs=<n>` to the build tool.
    pub jobs: usize,
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Locked(#[from] LockError),

    #[error("failed to open build log {path}: {source}")]
    Log { path: PathBuf, source: io::Error },

    #[error("{stage} stage failed with {}; see {}", describe_exit(.code.as_ref().copied()), .log.display())]
    ProcessFailure {
        stage: Stage,
        code: Option<i32>,
        log: PathBuf,
    },

    #[error("{stage} stage could not start {}: {source}", .program.display())]
    Spawn {
        stage: Stage,
        program: PathBuf,
        source: io::Error,
    },

    #[error("fetch stage failed for {package}: {source}")]
    Download {
        package: PackageName,
        source: DownloadError,
    },

    #[error("extract stage failed for {package}: {source}")]
    Extract {
        package: PackageName,
        source: ExtractError,
    },

    #[error("{stage} stage: {source}")]
    Io { stage: Stage, source: io::Error },
}

impl BuildError {
    /// The stage the error happened in, if the pipeline had started.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Spec(_) | Self::Locked(_) | Self::Log { .. } => None,
            Self::ProcessFailure { stage, .. } | Self::Spawn { stage, .. } | Self::Io { stage, .. } => {
                Some(*stage)
            }
            Self::Download { .. } => Some(Stage::Fetch),
            Self::Extract { .. } => Some(Stage::Extract),
        }
    }
}

fn io_at(stage: Stage) -> impl FnOnce(io::Error) -> BuildError {
    move |source| BuildError::Io { stage, source }
}

fn header(log: &mut BuildLog, stage: Stage, detail: &str) -> Result<(), BuildError> {
    log.note(&format!("==> {stage}: {detail}")).map_err(io_at(stage))
}

/// Run blocking work (child processes, extraction) so that other tasks keep
/// running on a multi-threaded runtime. Anywhere else it simply runs inline.
fn blocking<T>(work: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

/// Runs the pipeline for one package at a time.
pub struct BuildOrchestrator<'a> {
    paths: &'a BuildPaths,
    toolchain: &'a Toolchain,
    downloader: &'a dyn Downloader,
    unpacker: &'a dyn Unpacker,
    runner: &'a dyn ProcessRunner,
    reporter: &'a dyn Reporter,
    flags: RunFlags,
}

impl fmt::Debug for BuildOrchestrator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("paths", &self.paths)
            .field("toolchain", &self.toolchain)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Directories one run works in.
struct Workspace<'p> {
    name: &'p PackageName,
    version: &'p Version,
    source: &'p str,
    archive: PathBuf,
    src: PathBuf,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(
        paths: &'a BuildPaths,
        toolchain: &'a Toolchain,
        downloader: &'a dyn Downloader,
        unpacker: &'a dyn Unpacker,
        runner: &'a dyn ProcessRunner,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            paths,
            toolchain,
            downloader,
            unpacker,
            runner,
            reporter,
            flags: RunFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> RunFlags {
        self.flags
    }

    /// Build (and unless disabled, install) `spec`, returning the path of
    /// its build log.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ProcessFailure`] when a command exits non-zero,
    /// and other variants when the package spec is incomplete, the package is locked
    /// by another run, or a fetch, extraction or filesystem step fails.
    pub async fn run(&self, spec: &PackageSpec) -> Result<PathBuf, BuildError> {
        let (version, source) = spec.buildable()?;
        let name = &spec.name;
        let _lock = PackageLock::acquire(&self.paths.lock_path(name))?;
        self.reporter.state(name, version, BuildState::Pending);
        let log_path = self.paths.log_path(name);
        let mut log = BuildLog::create(&log_path).map_err(|source| BuildError::Log {
            path: log_path.clone(),
            source,
        })?;
        log.note(&format!(
            "# {} started {}",
            release_id(name, version),
            chrono::Utc::now().to_rfc3339()
        ))
        .map_err(io_at(Stage::Fetch))?;

        let ws = Workspace {
            name,
            version,
            source,
            archive: self.paths.archive_path(name, version),
            src: self.paths.source_dir(name, version),
        };

        let result = self.pipeline(spec, &ws, &mut log).await;
        let closed = log.close();

        match result {
            Ok(()) => {
                closed.map_err(io_at(Stage::Cleanup))?;
                self.reporter.state(name, version, BuildState::Done);
                info!("Built {}", release_id(name, version));
                Ok(log_path)
            }
            Err(e) => {
                if let Err(close_err) = closed {
                    warn!("Failed to close {}: {close_err}", log_path.display());
                }
                if let Some(stage) = e.stage() {
                    self.reporter.state(name, version, BuildState::Failed(stage));
                }
                Err(e)
            }
        }
    }

    async fn pipeline(
        &self,
        spec: &PackageSpec,
        ws: &Workspace<'_>,
        log: &mut BuildLog,
    ) -> Result<(), BuildError> {
        self.fetch(ws, log).await?;
        self.extract(ws, log)?;

        let opts = &spec.build;
        // Dropping the guard removes the scratch directory, so it is gone on
        // every early return below too.
        let scratch = if opts.out_of_tree {
            let dir = tempfile::Builder::new()
                .prefix("build-")
                .tempdir_in(self.paths.package_dir(ws.name))
                .map_err(io_at(Stage::Configure))?;
            Some(dir)
        } else {
            None
        };
        let build_dir = scratch.as_ref().map_or(ws.src.as_path(), tempfile::TempDir::path);

        self.reporter
            .state(ws.name, ws.version, BuildState::Configuring);
        let configure =
            Invocation::new(ws.src.join("configure"), build_dir).args(&opts.configure_args);
        self.execute(Stage::Configure, &configure, log)?;

        self.reporter
            .state(ws.name, ws.version, BuildState::Compiling);
        let make = opts.make_binary.as_deref().unwrap_or(&self.toolchain.make);
        let compile = Invocation::new(make, build_dir)
            .arg(format!("--jobs={}", self.toolchain.jobs))
            .args(&opts.make_args);
        self.execute(Stage::Compile, &compile, log)?;

        if self.flags.dry_run || opts.skip_install {
            let why = if self.flags.dry_run { "dry run" } else { "no-make-install" };
            header(log, Stage::Install, &format!("skipped ({why})"))?;
            info!("Skipping install of {} ({why})", ws.name);
        } else {
            self.reporter
                .state(ws.name, ws.version, BuildState::Installing);
            let install = Invocation::new(&self.toolchain.porg, build_dir)
                .arg("-lp")
                .arg(release_id(ws.name, ws.version))
                .arg(format!("{} install", make.display()));
            self.execute(Stage::Install, &install, log)?;
        }

        if let Some(scratch) = scratch {
            header(log, Stage::Cleanup, &scratch.path().display().to_string())?;
            scratch.close().map_err(io_at(Stage::Cleanup))?;
        }
        Ok(())
    }

    async fn fetch(&self, ws: &Workspace<'_>, log: &mut BuildLog) -> Result<(), BuildError> {
        self.reporter.state(ws.name, ws.version, BuildState::Fetching);

        if ws.archive.exists() && !self.flags.redownload {
            debug!("Reusing {}", ws.archive.display());
            return header(
                log,
                Stage::Fetch,
                &format!("using existing {}", ws.archive.display()),
            );
        }

        header(log, Stage::Fetch, ws.source)?;
        let digest = self
            .downloader
            .fetch(FetchRequest {
                name: ws.name,
                version: ws.version,
                source: ws.source,
                dest: &ws.archive,
                reporter: self.reporter,
            })
            .await
            .map_err(|source| BuildError::Download {
                package: ws.name.clone(),
                source,
            })?;

        info!("Fetched {} (sha256 {digest})", ws.archive.display());
        log.note(&format!("sha256 {digest}  {}", ws.archive.display()))
            .map_err(io_at(Stage::Fetch))
    }

    fn extract(&self, ws: &Workspace<'_>, log: &mut BuildLog) -> Result<(), BuildError> {
        self.reporter
            .state(ws.name, ws.version, BuildState::Extracting);
        header(log, Stage::Extract, &ws.src.display().to_string())?;

        if ws.src.exists() {
            fs::remove_dir_all(&ws.src).map_err(io_at(Stage::Extract))?;
        }
        fs::create_dir_all(&ws.src).map_err(io_at(Stage::Extract))?;

        blocking(|| self.unpacker.unpack(&ws.archive, &ws.src, STRIP_COMPONENTS))
            .map_err(|source| BuildError::Extract {
                package: ws.name.clone(),
                source,
            })
    }

    fn execute(
        &self,
        stage: Stage,
        invocation: &Invocation,
        log: &mut BuildLog,
    ) -> Result<(), BuildError> {
        header(log, stage, &invocation.display())?;
        debug!("{stage}: `{}` in {}", invocation.display(), invocation.cwd.display());

        let exit = blocking(|| self.runner.run(invocation, log))
            .map_err(|source| BuildError::Spawn {
                stage,
                program: invocation.program.clone(),
                source,
            })?;

        if exit.success() {
            Ok(())
        } else {
            Err(BuildError::ProcessFailure {
                stage,
                code: exit.code,
                log: log.path().to_path_buf(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use foopkg_schema::BuildOptions;
    use tempfile::{TempDir, tempdir};

    use crate::NullReporter;
    use crate::process::Exit;

    #[derive(Default)]
    struct FakeDownloader {
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        async fn fetch(&self, req: FetchRequest<'_>) -> Result<String, DownloadError> {
            self.fetched.lock().unwrap().push(req.source.to_string());
            fs::write(req.dest, b"archive")?;
            Ok("feedface".to_string())
        }
    }

    #[derive(Default)]
    struct FakeUnpacker {
        unpacked: Mutex<Vec<(PathBuf, PathBuf, usize)>>,
    }

    impl Unpacker for FakeUnpacker {
        fn unpack(&self, archive: &Path, dest: &Path, strip: usize) -> Result<(), ExtractError> {
            self.unpacked
                .lock()
                .unwrap()
                .push((archive.to_path_buf(), dest.to_path_buf(), strip));
            fs::write(dest.join("configure"), b"#!/bin/sh\n")?;
            Ok(())
        }
    }

    /// Records every invocation; the `fail_at`-th one (0-based) exits with
    /// the given code.
    #[derive(Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<Invocation>>,
        fail_at: Option<(usize, i32)>,
    }

    impl ScriptedRunner {
        fn failing_at(index: usize, code: i32) -> Self {
            Self {
                calls: Mutex::default(),
                fail_at: Some((index, code)),
            }
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation, log: &mut BuildLog) -> io::Result<Exit> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push(invocation.clone());
            log.note(&format!("output of call {index}"))?;
            match self.fail_at {
                Some((at, code)) if at == index => Ok(Exit::with_code(code)),
                _ => Ok(Exit::with_code(0)),
            }
        }
    }

    #[derive(Default)]
    struct StateRecorder {
        states: Mutex<Vec<BuildState>>,
    }

    impl StateRecorder {
        fn states(&self) -> Vec<BuildState> {
            self.states.lock().unwrap().clone()
        }
    }

    impl Reporter for StateRecorder {
        fn section(&self, _: &str) {}
        fn state(&self, _: &PackageName, _: &Version, state: BuildState) {
            self.states.lock().unwrap().push(state);
        }
        fn downloading(&self, _: &PackageName, _: &Version, _: u64, _: Option<u64>) {}
        fn info(&self, _: &str) {}
        fn success(&self, _: &str) {}
        fn warning(&self, _: &str) {}
        fn error(&self, _: &str) {}
        fn summary(&self, _: usize, _: &str, _: f64) {}
    }

    struct Harness {
        _tmp: TempDir,
        paths: BuildPaths,
        toolchain: Toolchain,
        downloader: FakeDownloader,
        unpacker: FakeUnpacker,
        runner: ScriptedRunner,
        reporter: StateRecorder,
    }

    impl Harness {
        fn new(runner: ScriptedRunner) -> Self {
            let tmp = tempdir().unwrap();
            let paths = BuildPaths::new(tmp.path().join("build"));
            Self {
                _tmp: tmp,
                paths,
                toolchain: Toolchain {
                    make: PathBuf::from("/usr/bin/make"),
                    porg: PathBuf::from("/usr/local/bin/porg"),
                    jobs: 4,
                },
                downloader: FakeDownloader::default(),
                unpacker: FakeUnpacker::default(),
                runner,
                reporter: StateRecorder::default(),
            }
        }

        fn orchestrator(&self, flags: RunFlags) -> BuildOrchestrator<'_> {
            BuildOrchestrator::new(
                &self.paths,
                &self.toolchain,
                &self.downloader,
                &self.unpacker,
                &self.runner,
                &self.reporter,
            )
            .with_flags(flags)
        }

        fn fetched(&self) -> Vec<String> {
            self.downloader.fetched.lock().unwrap().clone()
        }

        fn src(&self, spec: &PackageSpec) -> PathBuf {
            self.paths
                .source_dir(&spec.name, spec.version.as_ref().unwrap())
        }
    }

    fn hello() -> PackageSpec {
        PackageSpec::ad_hoc(
            PackageName::new("hello"),
            Version::new("2.12"),
            "https://ftp.gnu.org/gnu/hello/hello-2.12.tar.gz".to_string(),
        )
    }

    fn args(inv: &Invocation) -> Vec<String> {
        inv.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_full_pipeline_commands_and_order() {
        let h = Harness::new(ScriptedRunner::default());
        let mut spec = hello();
        spec.build = BuildOptions {
            configure_args: vec!["--prefix=/usr".into(), "--disable-nls".into()],
            make_args: vec!["V=1".into()],
            ..BuildOptions::default()
        };

        let log = h.orchestrator(RunFlags::default()).run(&spec).await.unwrap();
        let src = h.src(&spec);

        assert_eq!(h.fetched(), vec![spec.source.clone().unwrap()]);
        let calls = h.runner.calls();
        assert_eq!(calls.len(), 3);

        assert_eq!(calls[0].program, src.join("configure"));
        assert_eq!(args(&calls[0]), ["--prefix=/usr", "--disable-nls"]);
        assert_eq!(calls[1].program, PathBuf::from("/usr/bin/make"));
        assert_eq!(args(&calls[1]), ["--jobs=4", "V=1"]);
        assert_eq!(calls[2].program, PathBuf::from("/usr/local/bin/porg"));
        assert_eq!(args(&calls[2]), ["-lp", "hello-2.12", "/usr/bin/make install"]);
        assert!(calls.iter().all(|c| c.cwd == src));

        assert_eq!(log, h.paths.log_path(&spec.name));
        let content = fs::read_to_string(&log).unwrap();
        let fetch = content.find("==> fetch").unwrap();
        let configure = content.find("==> configure").unwrap();
        let install = content.find("==> install").unwrap();
        assert!(fetch < configure && configure < install);
        assert!(content.contains("sha256 feedface"));
        assert!(content.contains("output of call 2"));
    }

    #[tokio::test]
    async fn test_states_follow_the_pipeline() {
        let h = Harness::new(ScriptedRunner::default());
        h.orchestrator(RunFlags::default()).run(&hello()).await.unwrap();
        assert_eq!(
            h.reporter.states(),
            [
                BuildState::Pending,
                BuildState::Fetching,
                BuildState::Extracting,
                BuildState::Configuring,
                BuildState::Compiling,
                BuildState::Installing,
                BuildState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_is_noop_when_archive_exists() {
        let h = Harness::new(ScriptedRunner::default());
        let spec = hello();
        let archive = h.paths.archive_path(&spec.name, &Version::new("2.12"));
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(&archive, b"cached").unwrap();

        h.orchestrator(RunFlags::default()).run(&spec).await.unwrap();

        assert!(h.fetched().is_empty());
        assert_eq!(fs::read(&archive).unwrap(), b"cached");
        let unpacked = h.unpacker.unpacked.lock().unwrap().clone();
        assert_eq!(unpacked, [(archive, h.src(&spec), 1)]);
    }

    #[tokio::test]
    async fn test_redownload_fetches_over_existing_archive() {
        let h = Harness::new(ScriptedRunner::default());
        let spec = hello();
        let archive = h.paths.archive_path(&spec.name, &Version::new("2.12"));
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(&archive, b"cached").unwrap();

        let flags = RunFlags {
            redownload: true,
            ..RunFlags::default()
        };
        h.orchestrator(flags).run(&spec).await.unwrap();

        assert_eq!(h.fetched().len(), 1);
        assert_eq!(fs::read(&archive).unwrap(), b"archive");
    }

    #[tokio::test]
    async fn test_extract_replaces_stale_tree() {
        let h = Harness::new(ScriptedRunner::default());
        let spec = hello();
        let src = h.src(&spec);
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("stale.o"), b"old").unwrap();

        h.orchestrator(RunFlags::default()).run(&spec).await.unwrap();

        assert!(!src.join("stale.o").exists());
        assert!(src.join("configure").exists());
    }

    #[tokio::test]
    async fn test_compile_failure_aborts_with_process_failure() {
        let h = Harness::new(ScriptedRunner::failing_at(1, 2));
        let spec = hello();

        let err = h
            .orchestrator(RunFlags::default())
            .run(&spec)
            .await
            .unwrap_err();

        match &err {
            BuildError::ProcessFailure { stage, code, log } => {
                assert_eq!(*stage, Stage::Compile);
                assert_eq!(*code, Some(2));
                assert_eq!(*log, h.paths.log_path(&spec.name));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("compile stage failed with exit code 2"));
        // install never ran
        assert_eq!(h.runner.calls().len(), 2);
        assert_eq!(
            h.reporter.states().last(),
            Some(&BuildState::Failed(Stage::Compile))
        );
        let content = fs::read_to_string(h.paths.log_path(&spec.name)).unwrap();
        assert!(content.contains("output of call 1"));
    }

    #[tokio::test]
    async fn test_out_of_tree_uses_scratch_dir_and_removes_it() {
        let h = Harness::new(ScriptedRunner::default());
        let mut spec = hello();
        spec.build.out_of_tree = true;

        h.orchestrator(RunFlags::default()).run(&spec).await.unwrap();

        let calls = h.runner.calls();
        let src = h.src(&spec);
        let scratch = calls[0].cwd.clone();
        assert_ne!(scratch, src);
        assert!(scratch.starts_with(h.paths.package_dir(&spec.name)));
        assert_eq!(calls[0].program, src.join("configure"));
        assert!(calls.iter().all(|c| c.cwd == scratch));
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_scratch_dir_removed_on_failure() {
        let h = Harness::new(ScriptedRunner::failing_at(0, 1));
        let mut spec = hello();
        spec.build.out_of_tree = true;

        let err = h
            .orchestrator(RunFlags::default())
            .run(&spec)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Configure));
        assert!(!h.runner.calls()[0].cwd.exists());
    }

    #[tokio::test]
    async fn test_dry_run_skips_install() {
        let h = Harness::new(ScriptedRunner::default());
        let flags = RunFlags {
            dry_run: true,
            ..RunFlags::default()
        };

        let log = h.orchestrator(flags).run(&hello()).await.unwrap();

        assert_eq!(h.runner.calls().len(), 2);
        assert!(!h.reporter.states().contains(&BuildState::Installing));
        let content = fs::read_to_string(log).unwrap();
        assert!(content.contains("==> install: skipped (dry run)"));
    }

    #[tokio::test]
    async fn test_no_make_install_skips_install() {
        let h = Harness::new(ScriptedRunner::default());
        let mut spec = hello();
        spec.build.skip_install = true;

        h.orchestrator(RunFlags::default()).run(&spec).await.unwrap();

        let calls = h.runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.program != h.toolchain.porg));
    }

    #[tokio::test]
    async fn test_make_binary_override_used_for_compile_and_install() {
        let h = Harness::new(ScriptedRunner::default());
        let mut spec = hello();
        spec.build.make_binary = Some(PathBuf::from("/usr/bin/gmake"));

        h.orchestrator(RunFlags::default()).run(&spec).await.unwrap();

        let calls = h.runner.calls();
        assert_eq!(calls[1].program, PathBuf::from("/usr/bin/gmake"));
        assert_eq!(args(&calls[2])[2], "/usr/bin/gmake install");
    }

    #[tokio::test]
    async fn test_incomplete_spec_does_nothing() {
        let h = Harness::new(ScriptedRunner::default());
        let mut spec = hello();
        spec.version = None;

        let err = h
            .orchestrator(RunFlags::default())
            .run(&spec)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Spec(_)));
        assert!(h.fetched().is_empty());
        assert!(h.runner.calls().is_empty());
        assert!(!h.paths.package_dir(&spec.name).exists());
    }

    #[tokio::test]
    async fn test_locked_package_is_refused() {
        let h = Harness::new(ScriptedRunner::default());
        let spec = hello();
        let _held = PackageLock::acquire(&h.paths.lock_path(&spec.name)).unwrap();

        let err = h
            .orchestrator(RunFlags::default())
            .run(&spec)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Locked(LockError::Busy(_))));
        assert!(h.fetched().is_empty());
        // No header without a matching terminal state.
        assert!(h.reporter.states().is_empty());
    }

    /// Blocks its thread until `beat` is set, giving up after five seconds.
    struct WaitingRunner {
        beat: Arc<AtomicBool>,
    }

    impl ProcessRunner for WaitingRunner {
        fn run(&self, _: &Invocation, _: &mut BuildLog) -> io::Result<Exit> {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !self.beat.load(Ordering::SeqCst) {
                if Instant::now() > deadline {
                    return Ok(Exit::with_code(124));
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(Exit::with_code(0))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_blocking_stages_leave_runtime_responsive() {
        let beat = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&beat);
        let ticker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            setter.store(true, Ordering::SeqCst);
        });

        let build = tokio::spawn(async move {
            let tmp = tempdir().unwrap();
            let paths = BuildPaths::new(tmp.path().join("build"));
            let toolchain = Toolchain {
                make: PathBuf::from("/usr/bin/make"),
                porg: PathBuf::from("/usr/local/bin/porg"),
                jobs: 1,
            };
            let downloader = FakeDownloader::default();
            let unpacker = FakeUnpacker::default();
            let runner = WaitingRunner { beat };
            let orchestrator = BuildOrchestrator::new(
                &paths,
                &toolchain,
                &downloader,
                &unpacker,
                &runner,
                &NullReporter,
            );
            orchestrator.run(&hello()).await.map(|_| ())
        });

        build.await.unwrap().unwrap();
        ticker.await.unwrap();
    }
}
