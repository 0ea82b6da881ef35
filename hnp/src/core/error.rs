//! Precondition violations reported to the player.
//!
//! These abort a command without touching any state and the CLI exits with
//! status 0. Infrastructure failures travel as plain `anyhow` errors instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    #[error("no player config found (run with --setup first)")]
    NotConfigured,
    #[error("player config has no username")]
    MissingUsername,
    #[error("invalid username '{0}': use [A-Za-z0-9._-] only")]
    InvalidUsername(String),
    #[error("invalid flag format (expected prefix '{prefix}')")]
    InvalidFlag { prefix: String },
    #[error("no hack in progress (run with --start first)")]
    NoHackInProgress,
    #[error("no patch in progress (run with --patch first)")]
    NoPatchInProgress,
    #[error("cannot start a hack while {phase}")]
    NotIdle { phase: &'static str },
    #[error("no opponent found in global state")]
    NoOpponent,
    #[error("unknown opponent '{0}' in global state")]
    UnknownOpponent(String),
    #[error("cannot target yourself as opponent")]
    SelfTarget,
    #[error("service already running; stop it first before starting a new one")]
    ServiceRunning,
    #[error("git {step} failed: {reason}")]
    Git { step: &'static str, reason: String },
}
