//! Line-oriented terminal reporter.
//!
//! Builds are sequential, so output is a plain stream of lines: one header
//! per package, one line per stage. Download progress is redrawn in place
//! when stdout is a terminal and suppressed otherwise.

use std::io::{IsTerminal, Write};
use std::sync::Mutex;

use crossterm::style::Stylize;

use foopkg_core::{BuildState, Reporter};
use foopkg_schema::{PackageName, Version};

use super::theme::{Theme, format_size};

#[derive(Debug)]
pub struct ConsoleReporter {
    theme: Theme,
    interactive: bool,
    /// Last rendered download percentage, to avoid redrawing every chunk.
    last_percent: Mutex<Option<u64>>,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            theme: Theme::default(),
            interactive: std::io::stdout().is_terminal(),
            last_percent: Mutex::new(None),
        }
    }

    fn stage_line(&self, label: &str) {
        println!(
            "  {} {}",
            self.theme.icons.active.with(self.theme.colors.active),
            label
        );
    }
}

/// Percentage of `current` in `total`, if the total is known.
fn percent(current: u64, total: Option<u64>) -> Option<u64> {
    total
        .filter(|&t| t > 0)
        .map(|t| current.min(t).saturating_mul(100) / t)
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        println!();
        println!("{}", title.bold());
    }

    fn state(&self, name: &PackageName, version: &Version, state: BuildState) {
        let colors = &self.theme.colors;
        let icons = &self.theme.icons;
        match state {
            BuildState::Pending => {
                println!();
                println!(
                    "{} {} {}",
                    icons.pending.with(colors.secondary),
                    name.as_str().with(colors.package_name).bold(),
                    version.as_str().with(colors.version)
                );
            }
            BuildState::Fetching => self.stage_line("fetching"),
            BuildState::Extracting => self.stage_line("extracting"),
            BuildState::Configuring => self.stage_line("configuring"),
            BuildState::Compiling => self.stage_line("compiling, go get some tea"),
            BuildState::Installing => self.stage_line("installing"),
            BuildState::Done => println!(
                "  {} {} {}",
                icons.success.with(colors.success),
                name.as_str().with(colors.package_name),
                "done".with(colors.success)
            ),
            BuildState::Failed(stage) => println!(
                "  {} {} {}",
                icons.error.with(colors.error),
                name.as_str().with(colors.package_name),
                format!("{stage} failed").with(colors.error)
            ),
        }
    }

    fn downloading(&self, _name: &PackageName, _version: &Version, current: u64, total: Option<u64>) {
        if !self.interactive {
            return;
        }
        let Ok(mut last) = self.last_percent.lock() else {
            return;
        };

        let pct = percent(current, total);
        let finished = matches!(total, Some(t) if current >= t);
        if pct.is_some() && pct == *last && !finished {
            return;
        }
        *last = pct;

        let size = match total {
            Some(t) => format!("{} / {}", format_size(current), format_size(t)),
            None => format_size(current),
        };
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r    {}", size.with(self.theme.colors.secondary));
        if let Some(pct) = pct {
            let _ = write!(stdout, " {}", format!("{pct:>3}%").with(self.theme.colors.secondary));
        }
        if finished {
            let _ = writeln!(stdout);
            *last = None;
        }
        let _ = stdout.flush();
    }

    fn info(&self, msg: &str) {
        println!(
            "{} {}",
            self.theme.icons.info.with(self.theme.colors.active),
            msg
        );
    }

    fn success(&self, msg: &str) {
        println!(
            "{} {}",
            self.theme.icons.success.with(self.theme.colors.success),
            msg
        );
    }

    fn warning(&self, msg: &str) {
        eprintln!(
            "{} {}",
            self.theme.icons.warning.with(self.theme.colors.warning),
            msg.with(self.theme.colors.warning)
        );
    }

    fn error(&self, msg: &str) {
        eprintln!(
            "{} {}",
            self.theme.icons.error.with(self.theme.colors.error),
            msg.with(self.theme.colors.error).bold()
        );
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        println!();
        println!(
            "{} {count} package{} {action}, elapsed {elapsed_secs:.2}s",
            self.theme.icons.success.with(self.theme.colors.success),
            if count == 1 { "" } else { "s" },
        );
    }
}
