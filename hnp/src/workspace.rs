//! A player's workspace: resolved paths plus the settings they came from.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::io::config::{GameSettings, load_settings};
use crate::io::paths::GamePaths;

#[derive(Debug, Clone)]
pub struct Workspace {
    pub paths: GamePaths,
    pub settings: GameSettings,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, settings: GameSettings) -> Self {
        let paths = GamePaths::new(root, &settings);
        Self { paths, settings }
    }

    /// Load settings from `settings_path` (relative to `root`) and resolve paths.
    pub fn open(root: &Path, settings_path: &Path) -> Result<Self> {
        let settings = load_settings(&root.join(settings_path))?;
        Ok(Self::new(root, settings))
    }
}
