//! Operations behind the commands. Nothing here prints directly; progress
//! goes through the context's reporter.

pub mod context;
pub mod error;
pub mod install;
pub mod rules;

pub use context::RunContext;
pub use error::InstallError;
