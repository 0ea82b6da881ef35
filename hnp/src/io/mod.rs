//! I/O helpers for game commands.

pub mod clock;
pub mod config;
pub mod docker;
pub mod git;
pub mod ledger_store;
pub mod paths;
pub mod player_store;
pub mod process;
pub mod prompt;
