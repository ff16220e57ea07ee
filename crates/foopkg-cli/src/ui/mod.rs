//! Terminal output and interaction.
//!
//! - [`theme`] - colors, icons and formatting helpers
//! - [`reporter`] - [`ConsoleReporter`], the terminal implementation of the
//!   core `Reporter` trait
//! - [`prompt`] - yes/no questions on the terminal

pub mod prompt;
pub mod reporter;
pub mod theme;

pub use prompt::TerminalPrompt;
pub use reporter::ConsoleReporter;
pub use theme::Theme;
