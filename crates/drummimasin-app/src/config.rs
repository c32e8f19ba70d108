use std::path::{Path, PathBuf};

use drummimasin_services::EngineConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub samples: SamplesConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplesConfig {
    /// Manifest file path or URL
    #[serde(default)]
    pub manifest: Option<String>,
    /// Relative sample paths resolve against this
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Used when the output device cannot be queried
    pub sample_rate: u32,
    pub input_device: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { sample_rate: 48000, input_device: "default".into() }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drummimasin")
        .join("config.toml")
}

/// Missing or malformed files give the defaults
pub fn load_config(path: &Path) -> AppConfig {
    let Ok(text) = std::fs::read_to_string(path) else {
        info!(path = %path.display(), "No config file, using defaults");
        return AppConfig::default();
    };
    match toml::from_str(&text) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded config");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed config, using defaults");
            AppConfig::default()
        }
    }
}
