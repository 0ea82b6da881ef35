//! Stable exit codes for `hnp`.
//!
//! Rejected commands (bad flag, wrong phase, no opponent, ...) still exit with
//! [`OK`]: the player fixes the precondition and retries.

/// Command succeeded, or was rejected for a precondition.
pub const OK: i32 = 0;
/// Infrastructure failure: docker, unreadable state, settings, lock contention.
pub const FATAL: i32 = 1;
