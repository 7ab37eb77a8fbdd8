//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub sequence: SequenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path; empty means try the default candidate paths
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Per-frame completion timeout for the incremental parser
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
}

/// Sequence execution configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SequenceConfig {
    /// Wait after energizing relays before a sample is considered valid
    #[serde(default = "default_stabilization_ms")]
    pub stabilization_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log file directory; empty means stderr only
    #[serde(default)]
    pub dir: String,
}

// Default value functions
fn default_baud_rate() -> u32 {
    115_200
}
fn default_frame_timeout_ms() -> u64 {
    5_000
}
fn default_stabilization_ms() -> u64 {
    50
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            frame_timeout_ms: default_frame_timeout_ms(),
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            stabilization_ms: default_stabilization_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: String::new() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            sequence: SequenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Baud rates the fixture firmware supports
const SUPPORTED_BAUD_RATES: &[u32] = &[9_600, 19_200, 38_400, 57_600, 115_200, 230_400];

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fixture_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), fixture_link::error::FixtureLinkError>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(crate::error::FixtureLinkError::Config(
                toml::de::Error::custom(format!(
                    "baud_rate must be one of: {:?}",
                    SUPPORTED_BAUD_RATES
                )),
            ));
        }

        if self.serial.frame_timeout_ms == 0 || self.serial.frame_timeout_ms > 60_000 {
            return Err(crate::error::FixtureLinkError::Config(
                toml::de::Error::custom("frame_timeout_ms must be between 1 and 60000"),
            ));
        }

        if self.sequence.stabilization_ms == 0 || self.sequence.stabilization_ms > 100 {
            return Err(crate::error::FixtureLinkError::Config(
                toml::de::Error::custom("stabilization_ms must be between 1 and 100"),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.frame_timeout_ms, 5_000);
        assert_eq!(config.sequence.stabilization_ms, 50);
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 123_456;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_timeout_bounds() {
        let mut config = Config::default();
        config.serial.frame_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.serial.frame_timeout_ms = 60_001;
        assert!(config.validate().is_err());

        config.serial.frame_timeout_ms = 60_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stabilization_bounds() {
        let mut config = Config::default();
        config.sequence.stabilization_ms = 0;
        assert!(config.validate().is_err());

        config.sequence.stabilization_ms = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB1"
baud_rate = 57600

[sequence]
stabilization_ms = 25
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.baud_rate, 57_600);
        assert_eq!(config.sequence.stabilization_ms, 25);
        // Unspecified sections fall back to defaults
        assert_eq!(config.logging.dir, "");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[serial]\nbaud_rate = 300\n")
            .unwrap();
        temp_file.flush().unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/fixture-link.toml").unwrap();
        assert_eq!(config.serial.baud_rate, default_baud_rate());
    }
}
