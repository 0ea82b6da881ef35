//! Persisted game documents: the per-player config and the shared ledger.
//!
//! The player config is stored in its flat four-field layout but decoded into
//! an explicit [`Phase`] so callers never infer state from null checks.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Where a player currently is in the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Hacking { since: DateTime<Utc> },
    Patching { since: DateTime<Utc>, branch: String },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Hacking { .. } => "hacking",
            Phase::Patching { .. } => "patching",
        }
    }
}

/// Local player state (`.hnp_config`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PlayerConfigDoc", into = "PlayerConfigDoc")]
pub struct PlayerConfig {
    pub username: String,
    pub phase: Phase,
}

impl PlayerConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            phase: Phase::Idle,
        }
    }

    pub fn with_phase(&self, phase: Phase) -> Self {
        Self {
            username: self.username.clone(),
            phase,
        }
    }
}

/// On-disk layout of [`PlayerConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PlayerConfigDoc {
    #[serde(default)]
    username: Option<String>,
    #[serde(default, with = "opt_timestamp")]
    hack_start: Option<DateTime<Utc>>,
    #[serde(default, with = "opt_timestamp")]
    patch_start: Option<DateTime<Utc>>,
    #[serde(default)]
    current_branch: Option<String>,
}

impl From<PlayerConfigDoc> for PlayerConfig {
    fn from(doc: PlayerConfigDoc) -> Self {
        let phase = match (doc.patch_start, doc.current_branch, doc.hack_start) {
            (Some(since), Some(branch), _) => Phase::Patching { since, branch },
            (_, _, Some(since)) => Phase::Hacking { since },
            _ => Phase::Idle,
        };
        Self {
            username: doc.username.unwrap_or_default(),
            phase,
        }
    }
}

impl From<PlayerConfig> for PlayerConfigDoc {
    fn from(config: PlayerConfig) -> Self {
        let mut doc = PlayerConfigDoc {
            username: Some(config.username),
            ..PlayerConfigDoc::default()
        };
        match config.phase {
            Phase::Idle => {}
            Phase::Hacking { since } => doc.hack_start = Some(since),
            Phase::Patching { since, branch } => {
                doc.patch_start = Some(since);
                doc.current_branch = Some(branch);
            }
        }
        doc
    }
}

/// Shared ledger (`hnp_global.json`). Player order is join order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub players: IndexMap<String, PlayerRecord>,
}

/// Per-player budget and last result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Seconds allowed for the next patch phase. `None` when the document omits it.
    #[serde(default)]
    pub dev_time: Option<u64>,
    #[serde(default)]
    pub last_flag: String,
    #[serde(default, with = "opt_timestamp")]
    pub last_round: Option<DateTime<Utc>>,
}

impl PlayerRecord {
    /// Record for a player joining the ledger at `now`.
    pub fn joined(now: DateTime<Utc>) -> Self {
        Self {
            dev_time: Some(0),
            last_flag: String::new(),
            last_round: Some(now),
        }
    }
}

/// Format a timestamp the way every document stores it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse RFC 3339, falling back to offset-less ISO-8601 read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

mod opt_timestamp {
    use super::{DateTime, Deserialize, Deserializer, Serializer, Utc};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&super::format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => super::parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
        }
    }
}
