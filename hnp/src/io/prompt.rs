//! Interactive questions asked of the player.
//!
//! Commands never read the terminal directly; they ask a [`Prompter`]. The
//! terminal implementation lives here, scripted ones live in `test_support`.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crate::core::round::PatchReview;

pub trait Prompter {
    /// Ask for the player's username.
    fn username(&self) -> Result<String>;
    /// Ask whether to push a patch that ran over budget. `false` discards it.
    fn confirm_over_budget(&self, review: &PatchReview) -> Result<bool>;
}

/// Prompter reading answers from stdin.
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn ask(&self, question: &str) -> Result<String> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{question}").context("write prompt")?;
        stdout.flush().context("flush prompt")?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read answer")?;
        Ok(line.trim().to_string())
    }
}

impl Prompter for TerminalPrompter {
    fn username(&self) -> Result<String> {
        self.ask("Enter your username: ")
    }

    fn confirm_over_budget(&self, review: &PatchReview) -> Result<bool> {
        let answer = self.ask(&format!(
            "You exceeded dev time ({}s used, {}s allowed). Proceed with push? (y/N): ",
            review.patch_secs, review.allowed_secs
        ))?;
        Ok(is_yes(&answer))
    }
}

/// Only an explicit `y` pushes.
pub fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}
