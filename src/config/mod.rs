//! Configuration module
//!
//! Handles loading and saving the dfrow configuration, and holds the runtime
//! tunables shared between the session controller, the display state machine
//! and the key remapper.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Value out of range for {0}: {1}")]
    OutOfRange(&'static str, u64),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Function key mode of the display row
///
/// `Normal` shows the special/media layout by default; `FKeys` shows raw
/// function keys. The external tunable surface uses 0 / 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FnMode {
    #[default]
    Normal,
    FKeys,
}

impl TryFrom<u8> for FnMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FnMode::Normal),
            1 => Ok(FnMode::FKeys),
            other => Err(format!("function key mode out of range: {}", other)),
        }
    }
}

impl From<FnMode> for u8 {
    fn from(mode: FnMode) -> u8 {
        match mode {
            FnMode::Normal => 0,
            FnMode::FKeys => 1,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Display row settings
    #[serde(default)]
    pub row: RowConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log file path (optional)
    pub log_file: Option<PathBuf>,
}

/// Display row configuration
///
/// These are the three externally tunable parameters; they can also be
/// changed at runtime through the session controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowConfig {
    /// Default function key mode (0 = normal, 1 = function keys)
    #[serde(default)]
    pub default_fn_mode: FnMode,
    /// Seconds of inactivity in the dimmed state before the row turns off
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Seconds of inactivity in the active state before the row dims
    #[serde(default = "default_dim_timeout_secs")]
    pub dim_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_dim_timeout_secs() -> u64 {
    5
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            default_fn_mode: FnMode::default(),
            idle_timeout_secs: default_idle_timeout_secs(),
            dim_timeout_secs: default_dim_timeout_secs(),
        }
    }
}

/// Runtime tunables derived from [`RowConfig`]
///
/// Read by the display state machine on every transition evaluation and by
/// the key remap path on every event, so changes take effect on the next
/// evaluation rather than retroactively. `idle_timeout >= dim_timeout` is
/// deliberately not enforced.
#[derive(Debug, Clone)]
pub struct Tunables {
    pub fn_mode: FnMode,
    pub idle_timeout: Duration,
    pub dim_timeout: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            fn_mode: FnMode::Normal,
            idle_timeout: Duration::from_secs(default_idle_timeout_secs()),
            dim_timeout: Duration::from_secs(default_dim_timeout_secs()),
        }
    }
}

impl From<&RowConfig> for Tunables {
    fn from(row: &RowConfig) -> Self {
        Self {
            fn_mode: row.default_fn_mode,
            idle_timeout: Duration::from_secs(row.idle_timeout_secs),
            dim_timeout: Duration::from_secs(row.dim_timeout_secs),
        }
    }
}

/// Tunables shared across tasks; held only for short read-modify-write spans
pub type SharedTunables = Arc<Mutex<Tunables>>;

impl Tunables {
    pub fn shared(self) -> SharedTunables {
        Arc::new(Mutex::new(self))
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("dfrow/config.toml")),
            Some(PathBuf::from("/etc/dfrow/config.toml")),
            Some(PathBuf::from("./dfrow.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    let config = Config {
        row: RowConfig {
            default_fn_mode: FnMode::Normal,
            idle_timeout_secs: 60,
            dim_timeout_secs: 5,
        },
        ..Default::default()
    };

    toml::to_string_pretty(&config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.row.idle_timeout_secs, 60);
        assert_eq!(config.row.dim_timeout_secs, 5);
        assert_eq!(config.row.default_fn_mode, FnMode::Normal);
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.row.dim_timeout_secs = 10;
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.row.dim_timeout_secs, 10);
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.row.idle_timeout_secs, 60);
    }

    #[test]
    fn test_fn_mode_wire_values() {
        assert_eq!(FnMode::try_from(0).unwrap(), FnMode::Normal);
        assert_eq!(FnMode::try_from(1).unwrap(), FnMode::FKeys);
        assert!(FnMode::try_from(2).is_err());
    }

    #[test]
    fn test_tunables_from_row_config() {
        let row = RowConfig {
            default_fn_mode: FnMode::FKeys,
            idle_timeout_secs: 30,
            dim_timeout_secs: 3,
        };
        let tunables = Tunables::from(&row);
        assert_eq!(tunables.fn_mode, FnMode::FKeys);
        assert_eq!(tunables.idle_timeout, Duration::from_secs(30));
        assert_eq!(tunables.dim_timeout, Duration::from_secs(3));
    }
}
