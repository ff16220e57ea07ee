pub mod builder;
pub mod config;
pub mod gate;
pub mod io;
pub mod lock;
pub mod paths;
pub mod privilege;
pub mod process;
pub mod records;
pub mod resolver;
pub mod rules;

pub mod reporter;

pub use builder::{BuildError, BuildOrchestrator, BuildState, RunFlags, Stage, Toolchain};
pub use config::Config;
pub use gate::{Confirm, GateDecision, InstallationGate};
pub use paths::BuildPaths;
pub use records::{InstallRecordStore, InstalledRecord, PorgLedger};
pub use reporter::{NullReporter, Reporter};
pub use rules::RuleStore;

/// User Agent string for source downloads
pub const USER_AGENT: &str = concat!("foopkg/", env!("CARGO_PKG_VERSION"));
