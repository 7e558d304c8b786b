//! Download session settings, stored as TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Settings for a download session. Every field is optional so a file
/// only needs to list what it overrides.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`.
    pub port: Option<String>,
    /// Product name looked up in the descriptor table.
    pub device: Option<String>,
    /// Device timestamp of the newest dive already downloaded.
    pub fingerprint: Option<u32>,
    /// Directory receiving one file per downloaded dive.
    pub output_dir: Option<String>,
    /// Read timeout override in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let name = format!("divelink-config-{}.toml", std::process::id());
        let path = std::env::temp_dir().join(name);
        let config = SessionConfig {
            port: Some("/dev/ttyUSB0".into()),
            device: Some("Sensus".into()),
            fingerprint: Some(123_456),
            output_dir: None,
            timeout_ms: Some(5000),
        };

        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file() {
        let config: SessionConfig = toml::from_str("port = \"/dev/ttyS1\"\n").unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyS1"));
        assert_eq!(config.fingerprint, None);
    }

    #[test]
    fn test_invalid_file() {
        let err = toml::from_str::<SessionConfig>("fingerprint = \"abc\"").unwrap_err();
        let message = ConfigError::from(err).to_string();
        assert!(message.starts_with("Invalid config"));

        let missing = SessionConfig::load_from_file("/nonexistent/divelink.toml");
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
