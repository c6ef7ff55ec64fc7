//! Link configuration file
//!
//! A JSON file holding the port settings and session behavior. Every field
//! has a default, so a file only needs the values it changes:
//!
//! ```json
//! { "port": { "path": "/dev/ttyUSB1", "baud_rate": 19200 } }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::protocol::PortSettings;
use crate::session::SessionConfig;

/// Errors reading or writing a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// The file is not valid JSON for a [`LinkConfig`]
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// A field holds a value the session cannot run with
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Everything needed to open the link and run a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port settings
    pub port: PortSettings,
    /// Session behavior and handshake timing
    pub session: SessionConfig,
}

impl LinkConfig {
    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: LinkConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.baud_rate == 0 {
            return Err(ConfigError::InvalidValue("baud_rate", "0".to_string()));
        }
        if self.session.exit_char == self.session.menu_char {
            return Err(ConfigError::InvalidValue(
                "menu_char",
                format!("{:#04x} is also the exit character", self.session.menu_char),
            ));
        }
        if self.session.handshake.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("read_timeout_ms", "0".to_string()));
        }
        if self.session.handshake.ack_deadline_ms == 0 {
            return Err(ConfigError::InvalidValue("ack_deadline_ms", "0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FlowControl, Parity};
    use crate::session::NewlineMode;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("link.json");

        let mut config = LinkConfig::default();
        config.port.path = "/dev/ttyUSB3".to_string();
        config.port.parity = Parity::Even;
        config.port.flow_control = FlowControl::Hardware;
        config.port.dtr = Some(false);
        config.session.echo = true;
        config.session.newline_mode = NewlineMode::Lf;
        config.session.handshake.ack_deadline_ms = 1500;

        config.save(&path).unwrap();
        let loaded = LinkConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "port": { "baud_rate": 19200 } }"#).unwrap();

        let loaded = LinkConfig::load(&path).unwrap();
        assert_eq!(loaded.port.baud_rate, 19200);
        assert_eq!(loaded.port.read_timeout_ms, 700);
        assert_eq!(loaded.session, SessionConfig::default());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ port: ").unwrap();

        assert!(matches!(LinkConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = LinkConfig::load(dir.path().join("nope.json"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_same_exit_and_menu_char_rejected() {
        let mut config = LinkConfig::default();
        config.session.menu_char = config.session.exit_char;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue("menu_char", _))
        ));
    }

    #[test]
    fn test_zero_ack_deadline_rejected() {
        let mut config = LinkConfig::default();
        config.session.handshake.ack_deadline_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue("ack_deadline_ms", _))
        ));
    }

    #[test]
    fn test_zero_ack_deadline_in_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deadline.json");
        fs::write(&path, r#"{ "session": { "handshake": { "ack_deadline_ms": 0 } } }"#).unwrap();

        assert!(matches!(
            LinkConfig::load(&path),
            Err(ConfigError::InvalidValue("ack_deadline_ms", _))
        ));
    }
}
