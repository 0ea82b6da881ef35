//! Local player config storage (`.hnp_config`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::error::RoundError;
use crate::model::PlayerConfig;

/// Load the player config, or `None` if this workspace has not been set up.
pub fn load_player_config(path: &Path) -> Result<Option<PlayerConfig>> {
    if !path.exists() {
        debug!(path = %path.display(), "no player config");
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read player config {}", path.display()))?;
    let config: PlayerConfig = serde_json::from_str(&contents)
        .with_context(|| format!("parse player config {}", path.display()))?;
    debug!(username = %config.username, phase = config.phase.name(), "player config loaded");
    Ok(Some(config))
}

/// Load the player config, reporting a missing file as a precondition failure.
pub fn require_player_config(path: &Path) -> Result<PlayerConfig> {
    load_player_config(path)?.ok_or_else(|| RoundError::NotConfigured.into())
}

/// Atomically write the player config (temp file + rename).
pub fn write_player_config(path: &Path, config: &PlayerConfig) -> Result<()> {
    debug!(path = %path.display(), phase = config.phase.name(), "writing player config");
    let mut buf = serde_json::to_string_pretty(config).context("serialize player config")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp player config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace player config {}", path.display()))?;
    Ok(())
}
