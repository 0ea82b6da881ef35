//! Duration arithmetic and ledger mutations for dev-time budgets.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::model::{Ledger, PlayerRecord};

/// Whole seconds from `start` to `end`, truncated toward zero.
pub fn elapsed(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds()
}

/// Elapsed seconds usable as a charge; spans that run backwards count as 0.
pub fn charged_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let secs = elapsed(start, end);
    if secs < 0 {
        warn!(secs, "negative elapsed time (clock skew?), charging 0");
    }
    u64::try_from(secs).unwrap_or(0)
}

/// First player other than `me`, in join order.
pub fn resolve_opponent<'a>(ledger: &'a Ledger, me: &str) -> Option<&'a str> {
    ledger
        .players
        .keys()
        .map(String::as_str)
        .find(|name| *name != me)
}

/// Add `seconds` to `opponent`'s budget. An absent budget counts as 0.
pub fn credit(ledger: &mut Ledger, opponent: &str, seconds: u64) {
    let record = ledger.players.entry(opponent.to_string()).or_default();
    record.dev_time = Some(record.dev_time.unwrap_or(0).saturating_add(seconds));
}

/// Record a pushed patch: store the new flag, drain the budget, stamp the round.
pub fn debit_and_reset(ledger: &mut Ledger, username: &str, new_flag: &str, at: DateTime<Utc>) {
    let record = ledger.players.entry(username.to_string()).or_default();
    record.last_flag = new_flag.to_string();
    record.dev_time = Some(0);
    record.last_round = Some(at);
}

/// Add `username` to the ledger if absent. Returns true when a record was created.
pub fn join(ledger: &mut Ledger, username: &str, at: DateTime<Utc>) -> bool {
    if ledger.players.contains_key(username) {
        return false;
    }
    ledger
        .players
        .insert(username.to_string(), PlayerRecord::joined(at));
    true
}

/// Budget for `username`'s patch phase, falling back to `default_secs`.
pub fn allowed_secs(ledger: &Ledger, username: &str, default_secs: u64) -> u64 {
    ledger
        .players
        .get(username)
        .and_then(|record| record.dev_time)
        .unwrap_or(default_secs)
}
