//! Git adapter for the patch exchange.
//!
//! Patches travel through the shared repository, so every git step the game
//! takes goes through the small [`Vcs`] trait. [`Git`] implements it with
//! `git` subprocess calls; tests substitute a recorder.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

/// Repository operations used by the patch phase.
pub trait Vcs {
    /// Create `branch` at HEAD and check it out.
    fn create_branch(&self, branch: &str) -> Result<()>;
    /// Check out `target` and merge `branch` into it.
    fn merge_into(&self, target: &str, branch: &str) -> Result<()>;
    /// Push `branch` to `remote`.
    fn push(&self, remote: &str, branch: &str) -> Result<()>;
    /// Discard all work and move the current branch to `rev`.
    fn reset_hard(&self, rev: &str) -> Result<()>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl Vcs for Git {
    #[instrument(skip_all, fields(branch = %branch))]
    fn create_branch(&self, branch: &str) -> Result<()> {
        debug!("creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    #[instrument(skip_all, fields(target = %target, branch = %branch))]
    fn merge_into(&self, target: &str, branch: &str) -> Result<()> {
        debug!("checking out merge target");
        self.run_checked(&["checkout", target])?;
        self.run_checked(&["merge", "--no-edit", branch])?;
        info!("merged patch branch");
        Ok(())
    }

    #[instrument(skip_all, fields(remote = %remote, branch = %branch))]
    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["push", remote, branch])?;
        info!("pushed");
        Ok(())
    }

    #[instrument(skip_all, fields(rev = %rev))]
    fn reset_hard(&self, rev: &str) -> Result<()> {
        warn!("hard reset, discarding local changes");
        self.run_checked(&["reset", "--hard", rev])?;
        Ok(())
    }
}
