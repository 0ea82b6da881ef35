//! Game settings stored in `hnp.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Game settings (TOML).
///
/// Every field is optional in the file; missing fields keep the defaults the
/// game has always used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameSettings {
    /// Local player document.
    pub player_config_path: PathBuf,

    /// Shared ledger document. Both players must point at the same file.
    pub ledger_path: PathBuf,

    /// Marker holding the id of the running service container.
    pub container_id_path: PathBuf,

    /// Patch budget used when the ledger has no `dev_time` for a player.
    pub default_dev_time_secs: u64,

    /// Every flag must start with this.
    pub flag_prefix: String,

    pub service: ServiceSettings,

    pub git: GitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceSettings {
    /// Image tag built and run for the vulnerable service.
    pub image: String,

    /// Docker build context directory.
    pub build_context: PathBuf,

    /// `docker run -p` mapping.
    pub ports: String,

    /// Unset means wait as long as docker takes.
    pub build_timeout_secs: Option<u64>,
    pub run_timeout_secs: Option<u64>,
    pub stop_timeout_secs: Option<u64>,

    /// Keep at most this many bytes of docker stdout/stderr.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitSettings {
    pub remote: String,
    pub main_branch: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            image: "hnp-service".to_string(),
            build_context: PathBuf::from("."),
            ports: "8000:8000".to_string(),
            build_timeout_secs: None,
            run_timeout_secs: None,
            stop_timeout_secs: None,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            main_branch: "main".to_string(),
        }
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            player_config_path: PathBuf::from(".hnp_config"),
            ledger_path: PathBuf::from("hnp_global.json"),
            container_id_path: PathBuf::from("state/.hnp_service_container_id"),
            default_dev_time_secs: 300,
            flag_prefix: "HNP{".to_string(),
            service: ServiceSettings::default(),
            git: GitSettings::default(),
        }
    }
}

impl ServiceSettings {
    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs.map(Duration::from_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_secs.map(Duration::from_secs)
    }
}

impl GitSettings {
    /// `<remote>/<main_branch>`, the reset target for a discarded patch.
    pub fn remote_main(&self) -> String {
        format!("{}/{}", self.remote, self.main_branch)
    }
}

impl GameSettings {
    pub fn validate(&self) -> Result<()> {
        if self.flag_prefix.is_empty() {
            return Err(anyhow!("flag_prefix must not be empty"));
        }
        if self.service.image.trim().is_empty() {
            return Err(anyhow!("service.image must not be empty"));
        }
        if self.service.ports.trim().is_empty() {
            return Err(anyhow!("service.ports must not be empty"));
        }
        if self.service.output_limit_bytes == 0 {
            return Err(anyhow!("service.output_limit_bytes must be > 0"));
        }
        for (name, value) in [
            ("build_timeout_secs", self.service.build_timeout_secs),
            ("run_timeout_secs", self.service.run_timeout_secs),
            ("stop_timeout_secs", self.service.stop_timeout_secs),
        ] {
            if value == Some(0) {
                return Err(anyhow!("service.{name} must be > 0 when set"));
            }
        }
        if self.git.remote.trim().is_empty() {
            return Err(anyhow!("git.remote must not be empty"));
        }
        if self.git.main_branch.trim().is_empty() {
            return Err(anyhow!("git.main_branch must not be empty"));
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `GameSettings::default()`.
pub fn load_settings(path: &Path) -> Result<GameSettings> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        let settings = GameSettings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: GameSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings.validate()?;
    debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}
