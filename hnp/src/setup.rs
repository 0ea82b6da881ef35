//! Orchestration for `hnp --setup`.
//!
//! Setup creates the local player config and the player's ledger entry. It
//! runs once per workspace; afterwards it is a no-op.

use anyhow::Result;
use tracing::{debug, info};

use crate::core::round::validate_username;
use crate::core::timing::join;
use crate::io::clock::Clock;
use crate::io::ledger_store::update_ledger;
use crate::io::player_store::{load_player_config, write_player_config};
use crate::io::prompt::Prompter;
use crate::model::PlayerConfig;
use crate::workspace::Workspace;

/// Outcome of `hnp --setup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// A config already existed; nothing was written.
    AlreadyConfigured { username: String },
    /// A config was created. `joined` is false if the ledger already knew the name.
    Created { username: String, joined: bool },
}

/// Create the player config and ledger entry if this workspace has none.
///
/// The username comes from `username` when given, otherwise from `prompter`.
pub fn setup_player<P: Prompter, C: Clock>(
    workspace: &Workspace,
    prompter: &P,
    username: Option<&str>,
    clock: &C,
) -> Result<SetupOutcome> {
    let paths = &workspace.paths;
    if let Some(existing) = load_player_config(&paths.player_config_path)? {
        debug!(username = %existing.username, "player config already exists");
        return Ok(SetupOutcome::AlreadyConfigured {
            username: existing.username,
        });
    }

    let username = match username {
        Some(name) => name.trim().to_string(),
        None => prompter.username()?,
    };
    validate_username(&username)?;

    let now = clock.now();
    let joined = update_ledger(&paths.ledger_path, |ledger| Ok(join(ledger, &username, now)))?;
    write_player_config(&paths.player_config_path, &PlayerConfig::new(&username))?;

    info!(username = %username, joined, "player set up");
    Ok(SetupOutcome::Created { username, joined })
}
