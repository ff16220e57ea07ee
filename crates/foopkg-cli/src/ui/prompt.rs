//! Yes/no questions on the terminal.

use std::io::{self, BufRead, Write};

use foopkg_core::Confirm;

/// Asks on stdout and reads the answer from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&self, message: &str, default: Option<bool>) -> io::Result<bool> {
        ask(&mut io::stdin().lock(), &mut io::stdout(), message, default)
    }
}

/// Ask `message` until the answer starts with `y` or `n`.
///
/// An empty answer stands for `default` when there is one. End of input is
/// `default`, or no.
pub fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    message: &str,
    default: Option<bool>,
) -> io::Result<bool> {
    let choices = match default {
        Some(true) => "[Y/n]",
        Some(false) => "[y/N]",
        None => "[y/n]",
    };

    loop {
        write!(output, "{message} {choices} ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(default.unwrap_or(false));
        }

        match line.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('y') => return Ok(true),
            Some('n') => return Ok(false),
            None if default.is_some() => return Ok(default.unwrap_or(false)),
            _ => writeln!(output, "Answer not valid.")?,
        }
    }
}
