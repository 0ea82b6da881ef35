//! Resolved filesystem locations for one player's workspace.

use std::path::PathBuf;

use crate::io::config::GameSettings;

/// All canonical paths for a workspace root.
#[derive(Debug, Clone)]
pub struct GamePaths {
    pub player_config_path: PathBuf,
    pub ledger_path: PathBuf,
    pub container_id_path: PathBuf,
    pub build_context: PathBuf,
}

impl GamePaths {
    /// Resolve settings paths against `root`. Absolute settings paths win.
    pub fn new(root: impl Into<PathBuf>, settings: &GameSettings) -> Self {
        let root = root.into();
        Self {
            player_config_path: root.join(&settings.player_config_path),
            ledger_path: root.join(&settings.ledger_path),
            container_id_path: root.join(&settings.container_id_path),
            build_context: root.join(&settings.service.build_context),
        }
    }
}
