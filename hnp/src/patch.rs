//! Orchestration for the patch phase: `--patch` and `--end`.
//!
//! Git steps run before any document is written. A git failure aborts the
//! command as a precondition error; documents stay as they were.

use anyhow::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::error::RoundError;
use crate::core::round::{self, PatchReview, PatchVerdict};
use crate::io::clock::Clock;
use crate::io::git::Vcs;
use crate::io::ledger_store::{load_ledger, update_ledger};
use crate::io::player_store::{require_player_config, write_player_config};
use crate::io::prompt::Prompter;
use crate::workspace::Workspace;

/// Outcome of `hnp --patch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchStarted {
    pub username: String,
    pub branch: String,
    pub started_at: DateTime<Utc>,
}

/// Outcome of `hnp --end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchEnded {
    /// Merged into main and pushed; the ledger now carries `new_flag`.
    Pushed {
        review: PatchReview,
        new_flag: String,
    },
    /// Over budget and declined; the working branch was reset to `reset_to`.
    Discarded {
        review: PatchReview,
        reset_to: String,
    },
}

fn git_step(step: &'static str) -> impl FnOnce(Error) -> Error {
    move |err| {
        RoundError::Git {
            step,
            reason: format!("{err:#}"),
        }
        .into()
    }
}

/// Create a patch branch and start the patch timer.
pub fn start_patch<V: Vcs, C: Clock>(
    workspace: &Workspace,
    vcs: &V,
    clock: &C,
) -> Result<PatchStarted> {
    let config = require_player_config(&workspace.paths.player_config_path)?;
    let now = clock.now();
    let branch = round::patch_branch_name(&config.username, now);
    let next = round::begin_patch(&config, &branch, now)?;

    vcs.create_branch(&branch).map_err(git_step("checkout -b"))?;
    write_player_config(&workspace.paths.player_config_path, &next)?;

    info!(username = %config.username, branch = %branch, "patch timer started");
    Ok(PatchStarted {
        username: config.username,
        branch,
        started_at: now,
    })
}

/// Finish the active patch: push it if within budget (or confirmed), otherwise
/// discard the work and leave the ledger alone.
pub fn end_patch<V: Vcs, P: Prompter, C: Clock>(
    workspace: &Workspace,
    vcs: &V,
    prompter: &P,
    new_flag: &str,
    clock: &C,
) -> Result<PatchEnded> {
    let paths = &workspace.paths;
    let settings = &workspace.settings;
    let config = require_player_config(&paths.player_config_path)?;
    let ledger = load_ledger(&paths.ledger_path)?;
    let now = clock.now();

    let review = round::review_patch(&config, &ledger, settings.default_dev_time_secs, now)?;
    if round::validate_flag(new_flag, &settings.flag_prefix).is_err() {
        warn!(
            prefix = %settings.flag_prefix,
            "new flag lacks the usual prefix; attackers will not be able to submit it"
        );
    }
    info!(
        patch_secs = review.patch_secs,
        allowed_secs = review.allowed_secs,
        "patch reviewed"
    );

    match round::decide(&review, |review| prompter.confirm_over_budget(review))? {
        PatchVerdict::Discard => {
            let reset_to = settings.git.remote_main();
            warn!(branch = %review.branch, reset_to = %reset_to, "over budget, discarding patch");
            vcs.reset_hard(&reset_to).map_err(git_step("reset --hard"))?;
            write_player_config(&paths.player_config_path, &round::discard_patch(&config))?;
            Ok(PatchEnded::Discarded { review, reset_to })
        }
        PatchVerdict::Push => {
            let main = &settings.git.main_branch;
            vcs.merge_into(main, &review.branch)
                .map_err(git_step("merge"))?;
            vcs.push(&settings.git.remote, main)
                .map_err(git_step("push"))?;

            let next_config = update_ledger(&paths.ledger_path, |ledger| {
                let (next_config, next_ledger) =
                    round::complete_patch(&config, ledger, &review, new_flag, now);
                *ledger = next_ledger;
                Ok(next_config)
            })?;
            write_player_config(&paths.player_config_path, &next_config)?;
            info!(username = %review.username, "patch pushed, budget reset");
            Ok(PatchEnded::Pushed {
                review,
                new_flag: new_flag.to_string(),
            })
        }
    }
}
