//! Scripting subsystem configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Whether scripting is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory containing script sources (default: platform data dir)
    #[serde(default)]
    pub script_dir: Option<PathBuf>,

    /// Per-script configuration (script label -> config values)
    #[serde(default)]
    pub config: HashMap<String, toml::Value>,

    /// Whether hot reload is enabled (default: true)
    #[serde(default = "default_true")]
    pub hot_reload: bool,

    /// Hot reload scan interval in milliseconds
    #[serde(default = "default_hot_reload_interval")]
    pub hot_reload_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_hot_reload_interval() -> u64 {
    500
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            script_dir: None,
            config: HashMap::new(),
            hot_reload: true,
            hot_reload_interval_ms: default_hot_reload_interval(),
        }
    }
}

impl ScriptingConfig {
    /// Get the script directory path (use provided or default)
    pub fn script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "thicket")
                .map(|d| d.data_dir().join("scripts"))
                .unwrap_or_else(|| PathBuf::from(".scripts"))
        })
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.hot_reload_interval_ms)
    }

    /// Whether the script with this label is enabled.
    /// Default to enabled when not mentioned in config.
    pub fn script_enabled(&self, label: &str) -> bool {
        self.config
            .get(label)
            .and_then(|config| config.get("enabled"))
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }
}
