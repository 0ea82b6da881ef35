//! Orchestration for the hack phase: `--start`, `--test` and `--submit`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::round::{self, Submission};
use crate::io::clock::Clock;
use crate::io::docker::ServiceRuntime;
use crate::io::ledger_store::update_ledger;
use crate::io::player_store::{require_player_config, write_player_config};
use crate::io::prompt::Prompter;
use crate::service::{ensure_not_running, launch_service};
use crate::setup::{SetupOutcome, setup_player};
use crate::workspace::Workspace;

/// Outcome of `hnp --start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HackStarted {
    pub setup: SetupOutcome,
    pub username: String,
    pub container_id: String,
    pub started_at: DateTime<Utc>,
}

/// Set up the player if needed, launch the service and start the hack timer.
///
/// Phase and service preconditions are checked before anything is built. The
/// timer is stamped once the container is up.
pub fn start_hack<R: ServiceRuntime, P: Prompter, C: Clock>(
    workspace: &Workspace,
    runtime: &R,
    prompter: &P,
    username: Option<&str>,
    clock: &C,
) -> Result<HackStarted> {
    let setup = setup_player(workspace, prompter, username, clock)?;
    let config = require_player_config(&workspace.paths.player_config_path)?;
    round::begin_hack(&config, clock.now())?;
    ensure_not_running(workspace)?;

    let container_id = launch_service(workspace, runtime)?;

    let started_at = clock.now();
    let next = round::begin_hack(&config, started_at)?;
    write_player_config(&workspace.paths.player_config_path, &next)?;
    info!(username = %config.username, started_at = %started_at, "hack timer started");
    Ok(HackStarted {
        setup,
        username: config.username,
        container_id,
        started_at,
    })
}

/// Launch the service for a local check without touching player state.
pub fn test_service<R: ServiceRuntime>(workspace: &Workspace, runtime: &R) -> Result<String> {
    launch_service(workspace, runtime)
}

/// Score a captured flag and credit the hack time to the opponent.
///
/// The ledger is only rewritten if the submission is accepted.
pub fn submit_flag<C: Clock>(
    workspace: &Workspace,
    flag: &str,
    target: Option<&str>,
    clock: &C,
) -> Result<Submission> {
    let config = require_player_config(&workspace.paths.player_config_path)?;
    let settings = &workspace.settings;
    let now = clock.now();

    let submission = update_ledger(&workspace.paths.ledger_path, |ledger| {
        if target.is_none() && ledger.players.len() > 2 {
            warn!(
                players = ledger.players.len(),
                "more than two players; crediting the first other player (use --opponent to choose)"
            );
        }
        let submission =
            round::submit_flag(&config, ledger, flag, &settings.flag_prefix, target, now)?;
        *ledger = submission.ledger.clone();
        Ok(submission)
    })?;
    write_player_config(&workspace.paths.player_config_path, &submission.config)?;

    info!(
        opponent = %submission.opponent,
        hack_secs = submission.hack_secs,
        "flag accepted"
    );
    Ok(submission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RoundError;
    use crate::io::player_store::load_player_config;
    use crate::model::Phase;
    use crate::test_support::{FakeRuntime, ManualClock, ScriptedPrompter, TestTable};

    #[test]
    fn start_sets_up_launches_and_stamps_after_launch() {
        let table = TestTable::new().expect("table");
        let ws = table.workspace("alice");
        let clock = ManualClock::default();
        let runtime = FakeRuntime::default().advancing(&clock, 40);

        let started = start_hack(
            &ws,
            &runtime,
            &ScriptedPrompter::with_username("alice"),
            None,
            &clock,
        )
        .expect("start");
        assert_eq!(started.container_id, "c0ffee01");
        assert_eq!(started.started_at, clock.start() + chrono::Duration::seconds(40));

        let config = load_player_config(&ws.paths.player_config_path)
            .expect("load")
            .expect("config");
        assert_eq!(
            config.phase,
            Phase::Hacking {
                since: started.started_at
            }
        );
    }

    #[test]
    fn start_refused_while_hacking_builds_nothing() {
        let table = TestTable::new().expect("table");
        let ws = table.workspace("alice");
        let clock = ManualClock::default();
        let prompter = ScriptedPrompter::default();
        start_hack(&ws, &FakeRuntime::default(), &prompter, Some("alice"), &clock).expect("start");

        let runtime = FakeRuntime::default();
        let err = start_hack(&ws, &runtime, &prompter, None, &clock).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RoundError>(),
            Some(&RoundError::NotIdle { phase: "hacking" })
        );
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn failed_run_is_fatal_and_leaves_timer_unset() {
        let table = TestTable::new().expect("table");
        let ws = table.workspace("alice");
        let clock = ManualClock::default();

        let err = start_hack(
            &ws,
            &FakeRuntime::failing("run"),
            &ScriptedPrompter::default(),
            Some("alice"),
            &clock,
        )
        .unwrap_err();
        assert!(err.downcast_ref::<RoundError>().is_none());
        let config = load_player_config(&ws.paths.player_config_path)
            .expect("load")
            .expect("config");
        assert_eq!(config.phase, Phase::Idle);
    }

    #[test]
    fn test_service_leaves_config_alone() {
        let table = TestTable::new().expect("table");
        let ws = table.workspace("alice");
        test_service(&ws, &FakeRuntime::default()).expect("test");
        assert!(!ws.paths.player_config_path.exists());
        assert!(ws.paths.container_id_path.exists());
    }
}
