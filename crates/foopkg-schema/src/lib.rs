//! Shared types and rule document model for foopkg.
//!
//! Everything here is plain data: the rule entries as they appear on disk,
//! the normalized [`PackageSpec`] the resolver and orchestrator consume, and
//! the identifier newtypes used across the workspace.

pub mod rule;
pub mod types;

// Re-exports
pub use rule::*;
pub use types::*;
