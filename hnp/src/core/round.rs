//! Round state machine: which transitions are legal from which phase.
//!
//! Every transition takes the current documents by reference and returns the
//! next ones. On `Err` nothing has been modified.

use chrono::{DateTime, Utc};

use crate::core::error::RoundError;
use crate::core::timing::{allowed_secs, charged_secs, credit, debit_and_reset, resolve_opponent};
use crate::model::{Ledger, Phase, PlayerConfig};

/// Check a username is usable in a git branch name.
pub fn validate_username(name: &str) -> Result<(), RoundError> {
    if name.is_empty()
        || name
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(RoundError::InvalidUsername(name.to_string()));
    }
    Ok(())
}

/// Prefix check on a submitted or newly planted flag.
pub fn validate_flag(flag: &str, prefix: &str) -> Result<(), RoundError> {
    if flag.starts_with(prefix) {
        Ok(())
    } else {
        Err(RoundError::InvalidFlag {
            prefix: prefix.to_string(),
        })
    }
}

fn require_username(config: &PlayerConfig) -> Result<&str, RoundError> {
    let name = config.username.trim();
    if name.is_empty() {
        return Err(RoundError::MissingUsername);
    }
    Ok(name)
}

/// Idle -> Hacking.
pub fn begin_hack(config: &PlayerConfig, now: DateTime<Utc>) -> Result<PlayerConfig, RoundError> {
    require_username(config)?;
    match config.phase {
        Phase::Idle => Ok(config.with_phase(Phase::Hacking { since: now })),
        ref other => Err(RoundError::NotIdle {
            phase: other.name(),
        }),
    }
}

/// A scored flag submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub config: PlayerConfig,
    pub ledger: Ledger,
    pub opponent: String,
    pub hack_secs: u64,
}

/// Hacking -> Idle, crediting the hack duration to the opponent's budget.
///
/// `target` overrides opponent resolution; it must name another player in the
/// ledger.
pub fn submit_flag(
    config: &PlayerConfig,
    ledger: &Ledger,
    flag: &str,
    flag_prefix: &str,
    target: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Submission, RoundError> {
    let username = require_username(config)?;
    validate_flag(flag, flag_prefix)?;
    let Phase::Hacking { since } = config.phase else {
        return Err(RoundError::NoHackInProgress);
    };
    let hack_secs = charged_secs(since, now);

    let opponent = match target {
        Some(name) if name == username => return Err(RoundError::SelfTarget),
        Some(name) if !ledger.players.contains_key(name) => {
            return Err(RoundError::UnknownOpponent(name.to_string()));
        }
        Some(name) => name,
        None => resolve_opponent(ledger, username).ok_or(RoundError::NoOpponent)?,
    }
    .to_string();

    let mut next_ledger = ledger.clone();
    credit(&mut next_ledger, &opponent, hack_secs);
    Ok(Submission {
        config: config.with_phase(Phase::Idle),
        ledger: next_ledger,
        opponent,
        hack_secs,
    })
}

/// Branch name for a patch started at `now`.
pub fn patch_branch_name(username: &str, now: DateTime<Utc>) -> String {
    format!("patch-{}-{}", username, now.timestamp())
}

/// Any phase -> Patching on `branch`. The caller creates the branch first.
pub fn begin_patch(
    config: &PlayerConfig,
    branch: &str,
    now: DateTime<Utc>,
) -> Result<PlayerConfig, RoundError> {
    require_username(config)?;
    Ok(config.with_phase(Phase::Patching {
        since: now,
        branch: branch.to_string(),
    }))
}

/// Timing facts for a patch being ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReview {
    pub username: String,
    pub branch: String,
    pub patch_secs: u64,
    pub allowed_secs: u64,
}

impl PatchReview {
    pub fn over_budget(&self) -> bool {
        self.patch_secs > self.allowed_secs
    }
}

/// Measure an active patch against the player's budget.
pub fn review_patch(
    config: &PlayerConfig,
    ledger: &Ledger,
    default_dev_time: u64,
    now: DateTime<Utc>,
) -> Result<PatchReview, RoundError> {
    let username = require_username(config)?;
    let Phase::Patching { since, ref branch } = config.phase else {
        return Err(RoundError::NoPatchInProgress);
    };
    Ok(PatchReview {
        username: username.to_string(),
        branch: branch.clone(),
        patch_secs: charged_secs(since, now),
        allowed_secs: allowed_secs(ledger, username, default_dev_time),
    })
}

/// What happens to a reviewed patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchVerdict {
    Push,
    Discard,
}

/// Within budget always pushes; over budget defers to `confirm`.
///
/// `confirm` is only called when the patch is over budget.
pub fn decide<E>(
    review: &PatchReview,
    confirm: impl FnOnce(&PatchReview) -> Result<bool, E>,
) -> Result<PatchVerdict, E> {
    if !review.over_budget() {
        return Ok(PatchVerdict::Push);
    }
    if confirm(review)? {
        Ok(PatchVerdict::Push)
    } else {
        Ok(PatchVerdict::Discard)
    }
}

/// Patching -> Idle after a push, recording the new flag and draining the budget.
pub fn complete_patch(
    config: &PlayerConfig,
    ledger: &Ledger,
    review: &PatchReview,
    new_flag: &str,
    now: DateTime<Utc>,
) -> (PlayerConfig, Ledger) {
    let mut next_ledger = ledger.clone();
    debit_and_reset(&mut next_ledger, &review.username, new_flag, now);
    (config.with_phase(Phase::Idle), next_ledger)
}

/// Patching -> Idle after a declined over-budget patch. The ledger is untouched.
pub fn discard_patch(config: &PlayerConfig) -> PlayerConfig {
    config.with_phase(Phase::Idle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timing::join;
    use chrono::{Duration, TimeZone};

    const PREFIX: &str = "HNP{";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    fn two_players() -> Ledger {
        let mut ledger = Ledger::default();
        join(&mut ledger, "alice", t0());
        join(&mut ledger, "bob", t0());
        ledger
    }

    fn hacking(name: &str) -> PlayerConfig {
        PlayerConfig::new(name).with_phase(Phase::Hacking { since: t0() })
    }

    fn patching(name: &str) -> PlayerConfig {
        PlayerConfig::new(name).with_phase(Phase::Patching {
            since: t0(),
            branch: format!("patch-{name}-1"),
        })
    }

    #[test]
    fn usernames_must_be_branch_safe() {
        assert!(validate_username("alice_01.x-y").is_ok());
        assert_eq!(
            validate_username("bad/name"),
            Err(RoundError::InvalidUsername("bad/name".to_string()))
        );
        assert!(validate_username("").is_err());
        assert!(validate_username("two words").is_err());
    }

    #[test]
    fn begin_hack_only_from_idle() {
        let idle = PlayerConfig::new("alice");
        let next = begin_hack(&idle, t0()).expect("start");
        assert_eq!(next.phase, Phase::Hacking { since: t0() });

        let err = begin_hack(&next, t0()).unwrap_err();
        assert_eq!(err, RoundError::NotIdle { phase: "hacking" });
        let err = begin_hack(&patching("alice"), t0()).unwrap_err();
        assert_eq!(err, RoundError::NotIdle { phase: "patching" });
    }

    #[test]
    fn begin_hack_requires_username() {
        let err = begin_hack(&PlayerConfig::new(""), t0()).unwrap_err();
        assert_eq!(err, RoundError::MissingUsername);
    }

    #[test]
    fn submit_credits_opponent_and_returns_to_idle() {
        let ledger = two_players();
        let now = t0() + Duration::seconds(95);
        let sub = submit_flag(&hacking("alice"), &ledger, "HNP{pwn}", PREFIX, None, now)
            .expect("submit");
        assert_eq!(sub.opponent, "bob");
        assert_eq!(sub.hack_secs, 95);
        assert_eq!(sub.ledger.players["bob"].dev_time, Some(95));
        assert_eq!(sub.config.phase, Phase::Idle);
    }

    #[test]
    fn submit_rejects_malformed_flag_before_anything_else() {
        let ledger = two_players();
        let err = submit_flag(&hacking("alice"), &ledger, "FLAG{x}", PREFIX, None, t0())
            .unwrap_err();
        assert_eq!(
            err,
            RoundError::InvalidFlag {
                prefix: PREFIX.to_string()
            }
        );
    }

    #[test]
    fn submit_requires_active_hack() {
        let ledger = two_players();
        let err = submit_flag(&PlayerConfig::new("alice"), &ledger, "HNP{x}", PREFIX, None, t0())
            .unwrap_err();
        assert_eq!(err, RoundError::NoHackInProgress);
    }

    #[test]
    fn submit_without_opponent_fails() {
        let mut ledger = Ledger::default();
        join(&mut ledger, "alice", t0());
        let err =
            submit_flag(&hacking("alice"), &ledger, "HNP{x}", PREFIX, None, t0()).unwrap_err();
        assert_eq!(err, RoundError::NoOpponent);
    }

    #[test]
    fn explicit_target_must_be_another_known_player() {
        let mut ledger = two_players();
        join(&mut ledger, "carol", t0());
        let now = t0() + Duration::seconds(3);

        let sub = submit_flag(&hacking("alice"), &ledger, "HNP{x}", PREFIX, Some("carol"), now)
            .expect("submit");
        assert_eq!(sub.opponent, "carol");
        assert_eq!(sub.ledger.players["carol"].dev_time, Some(3));
        assert_eq!(sub.ledger.players["bob"].dev_time, Some(0));

        let err = submit_flag(&hacking("alice"), &ledger, "HNP{x}", PREFIX, Some("alice"), now)
            .unwrap_err();
        assert_eq!(err, RoundError::SelfTarget);
        let err = submit_flag(&hacking("alice"), &ledger, "HNP{x}", PREFIX, Some("dave"), now)
            .unwrap_err();
        assert_eq!(err, RoundError::UnknownOpponent("dave".to_string()));
    }

    #[test]
    fn branch_name_uses_unix_seconds() {
        assert_eq!(patch_branch_name("bob", t0()), "patch-bob-1740823200");
    }

    #[test]
    fn patch_can_begin_from_any_phase() {
        for config in [PlayerConfig::new("bob"), hacking("bob"), patching("bob")] {
            let next = begin_patch(&config, "patch-bob-9", t0()).expect("patch");
            assert_eq!(
                next.phase,
                Phase::Patching {
                    since: t0(),
                    branch: "patch-bob-9".to_string()
                }
            );
        }
    }

    #[test]
    fn review_requires_active_patch() {
        let err = review_patch(&hacking("bob"), &two_players(), 300, t0()).unwrap_err();
        assert_eq!(err, RoundError::NoPatchInProgress);
    }

    #[test]
    fn within_budget_never_asks() {
        let mut ledger = two_players();
        credit(&mut ledger, "bob", 60);
        let now = t0() + Duration::seconds(60);
        let review = review_patch(&patching("bob"), &ledger, 300, now).expect("review");
        assert!(!review.over_budget());
        let verdict = decide(&review, |_| -> Result<bool, ()> {
            panic!("prompt must not appear within budget")
        });
        assert_eq!(verdict, Ok(PatchVerdict::Push));
    }

    #[test]
    fn over_budget_follows_confirmation() {
        let ledger = two_players();
        let now = t0() + Duration::seconds(1);
        let review = review_patch(&patching("bob"), &ledger, 300, now).expect("review");
        assert_eq!(review.allowed_secs, 0);
        assert!(review.over_budget());
        assert_eq!(decide(&review, |_| Ok::<_, ()>(true)), Ok(PatchVerdict::Push));
        assert_eq!(decide(&review, |_| Ok::<_, ()>(false)), Ok(PatchVerdict::Discard));
    }

    #[test]
    fn complete_patch_resets_budget_and_phase() {
        let mut ledger = two_players();
        credit(&mut ledger, "bob", 60);
        let config = patching("bob");
        let now = t0() + Duration::seconds(30);
        let review = review_patch(&config, &ledger, 300, now).expect("review");
        let (next_config, next_ledger) = complete_patch(&config, &ledger, &review, "HNP{v2}", now);
        assert_eq!(next_config.phase, Phase::Idle);
        assert_eq!(next_ledger.players["bob"].dev_time, Some(0));
        assert_eq!(next_ledger.players["bob"].last_flag, "HNP{v2}");
        assert_eq!(next_ledger.players["bob"].last_round, Some(now));
        assert_eq!(ledger.players["bob"].dev_time, Some(60));
    }
}
