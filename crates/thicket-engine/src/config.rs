//! Host configuration, loaded from the platform config directory

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use thicket_scripting_host::ScriptingConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThicketConfig {
    /// Interval between host ticks in milliseconds (default 50ms = 20Hz)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub scripting: ScriptingConfig,
}

fn default_tick_interval() -> u64 {
    50
}

impl Default for ThicketConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            scripting: ScriptingConfig::default(),
        }
    }
}

impl ThicketConfig {
    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "thicket")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("thicket.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// Write an example config for the user to edit
    pub fn create_example() -> Result<PathBuf> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let example = r#"# Thicket configuration

tick_interval_ms = 50

[scripting]
enabled = true
hot_reload = true
hot_reload_interval_ms = 500
# script_dir = "assets/scripts"

# Per-script toggles:
# [scripting.config.powerup_spawner]
# enabled = false
"#;
        fs::write(&path, example)
            .with_context(|| format!("failed to write example config to {}", path.display()))?;
        Ok(path)
    }
}
