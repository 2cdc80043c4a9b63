//! Operator Console
//!
//! Game text for the person at the terminal and the `> ` prompt. Handlers
//! run concurrently with the command loop, so after printing they redraw
//! the prompt the operator was typing at.

use std::io::{self, Write};

/// Where operator-facing text goes.
pub trait Console: Send + Sync {
    /// Print a block of text.
    fn print(&self, text: &str);

    /// Redraw the input prompt.
    fn refresh_prompt(&self);
}

/// Console on stdout.
#[derive(Debug, Clone)]
pub struct StdoutConsole {
    prompt: Option<String>,
}

impl StdoutConsole {
    /// Console drawing `> ` when `prompt` is set.
    pub fn new(prompt: bool) -> Self {
        Self {
            prompt: prompt.then(|| "> ".to_string()),
        }
    }
}

impl Default for StdoutConsole {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Console for StdoutConsole {
    fn print(&self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{}", text);
    }

    fn refresh_prompt(&self) {
        if let Some(prompt) = &self.prompt {
            let mut out = io::stdout().lock();
            let _ = write!(out, "{}", prompt);
            let _ = out.flush();
        }
    }
}

/// Console that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentConsole;

impl Console for SilentConsole {
    fn print(&self, _text: &str) {}

    fn refresh_prompt(&self) {}
}

/// Redraws the prompt when dropped, whichever way the scope is left.
pub struct PromptOnExit<'a> {
    console: &'a dyn Console,
}

impl<'a> PromptOnExit<'a> {
    /// Arm the guard.
    pub fn new(console: &'a dyn Console) -> Self {
        Self { console }
    }
}

impl Drop for PromptOnExit<'_> {
    fn drop(&mut self) {
        self.console.refresh_prompt();
    }
}
