use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use anyhow::{Result, anyhow};

/// Optional settings read from `<config_dir>/farmachat/config.json`. A
/// missing file means defaults; the backend origin then stays the literal
/// the desktop build shipped with.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub backend_url: Option<String>,
    #[serde(default = "default_true")]
    pub enable_training: bool,
    #[serde(default = "default_true")]
    pub enable_upload: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn new() -> Self {
        Self {
            backend_url: None,
            enable_training: true,
            enable_upload: true,
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("farmachat").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults_for_feature_toggles() {
        let config: Config = serde_json::from_str(r#"{"backend_url": null}"#).unwrap();
        assert!(config.backend_url.is_none());
        assert!(config.enable_training);
        assert!(config.enable_upload);
    }

    #[test]
    fn toggles_can_be_switched_off() {
        let config: Config = serde_json::from_str(
            r#"{"backend_url": "http://farma.local:8000", "enable_upload": false}"#,
        )
        .unwrap();
        assert_eq!(config.backend_url.as_deref(), Some("http://farma.local:8000"));
        assert!(config.enable_training);
        assert!(!config.enable_upload);
    }
}
