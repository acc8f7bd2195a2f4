//! Application configuration loading and validation.
//!
//! The bridge reads one TOML file at start-up:
//!
//! ```toml
//! [general]
//! hostname = "attic"
//! delay = 60
//!
//! [mqtt]
//! broker = "mqtt.local"
//! topic_format = "home/{attribute}/{id}"
//!
//! [w1sensors]
//! "28-0000075a1b2c" = "kitchen"
//!
//! [bme680sensors]
//! "0x77" = "lounge"
//! ```
//!
//! The configuration is immutable once loaded.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{config::logger::LoggerConfig, hardware::i2c::parse_i2c_address};

pub mod logger;

/// Environment variable pointing at the configuration file.
pub const CONFIG_ENV: &str = "HOMESENSE_CONFIG";
const SYSTEM_CONFIG: &str = "/etc/homesense/config.toml";
const USER_CONFIG: &str = ".config/homesense/config.toml";

/// Simple macros for printing timestamped messages before the tracing
/// subscriber is initialized.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        $crate::config::print_line(console::style("INFO").green(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        $crate::config::print_line(console::style("WARN").yellow(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::config::print_line(console::style("ERROR").red(), format_args!($($arg)*))
    };
}

#[doc(hidden)]
pub fn print_line(level: console::StyledObject<&str>, message: std::fmt::Arguments<'_>) {
    let format = time::macros::format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
    );
    let timestamp = time::OffsetDateTime::now_utc()
        .format(format)
        .unwrap_or_default();
    println!("{}  {} {}", console::style(timestamp).dim(), level, message);
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration file found (set {} or create {})", CONFIG_ENV, SYSTEM_CONFIG)]
    NotFound,

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error while reading configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub general: GeneralConfig,

    #[validate(nested)]
    pub mqtt: homesense_mqtt::Config,

    /// 1-Wire probe id to MQTT id.
    #[validate(custom(function = "validate_w1_ids"))]
    pub w1sensors: BTreeMap<String, String>,

    /// Hex I2C address to MQTT id, in file order. Empty means "try the
    /// default address".
    #[validate(custom(function = "validate_bme680_addresses"))]
    pub bme680sensors: IndexMap<String, String>,

    #[validate(nested)]
    pub logger: LoggerConfig,
}

#[derive(Serialize, Deserialize, Debug, Validate, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    /// Overrides the kernel hostname as the default MQTT id.
    #[validate(length(min = 1, max = 64, message = "Hostname must be 1-64 characters"))]
    pub hostname: Option<String>,

    /// Seconds between poll cycles.
    #[validate(range(min = 1, message = "Delay must be at least 1 second"))]
    pub delay: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            hostname: None,
            delay: 60,
        }
    }
}

impl GeneralConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.delay)
    }
}

fn validate_w1_ids(map: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    match map.iter().find(|(_, id)| id.trim().is_empty()) {
        Some((probe, _)) => Err(ValidationError::new("empty_mqtt_id")
            .with_message(format!("Empty MQTT id for 1-Wire probe {}", probe).into())),
        None => Ok(()),
    }
}

fn validate_bme680_addresses(map: &IndexMap<String, String>) -> Result<(), ValidationError> {
    for (address, id) in map {
        if parse_i2c_address(address).is_none() {
            return Err(ValidationError::new("invalid_i2c_address")
                .with_message(format!("Invalid I2C address: {}", address).into()));
        }
        if id.trim().is_empty() {
            return Err(ValidationError::new("empty_mqtt_id")
                .with_message(format!("Empty MQTT id for BME680 at {}", address).into()));
        }
    }
    Ok(())
}

impl Config {
    /// Locates, loads and validates the configuration file.
    pub fn new() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let home = std::env::var_os("HOME").map(PathBuf::from);

        let path = resolve_path(explicit, home.as_deref(), Path::new(SYSTEM_CONFIG))
            .ok_or(ConfigError::NotFound)?;
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}

/// Picks the configuration file: an explicit path always wins, then the
/// per-user file, then the system-wide one.
fn resolve_path(explicit: Option<PathBuf>, home: Option<&Path>, system: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }

    home.map(|home| home.join(USER_CONFIG))
        .filter(|path| path.is_file())
        .or_else(|| system.is_file().then(|| system.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const FULL: &str = r#"
        [general]
        hostname = "attic"
        delay = 30

        [mqtt]
        broker = "mqtt.local"
        port = 1884
        topic_format = "home/{attribute}/{id}"

        [w1sensors]
        "28-0000075a1b2c" = "kitchen"

        [bme680sensors]
        "0x77" = "lounge"
        "76" = "bedroom"

        [logger]
        level = "debug"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(FULL).unwrap();

        assert_eq!(config.general.hostname.as_deref(), Some("attic"));
        assert_eq!(config.general.interval(), Duration::from_secs(30));
        assert_eq!(config.mqtt.broker, "mqtt.local");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.w1sensors["28-0000075a1b2c"], "kitchen");
        assert_eq!(config.bme680sensors.len(), 2);
        assert_eq!(config.logger.level, "debug");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.general.delay, 60);
        assert!(config.general.hostname.is_none());
        assert_eq!(config.mqtt.broker, "localhost");
        assert!(config.w1sensors.is_empty());
        assert!(config.bme680sensors.is_empty());
    }

    #[test]
    fn test_bme680_sensors_keep_file_order() {
        let config = Config::parse(
            r#"
            [bme680sensors]
            "77" = "lounge"
            "0x76" = "bedroom"
            "#,
        )
        .unwrap();

        let entries: Vec<_> = config
            .bme680sensors
            .iter()
            .map(|(address, id)| (address.as_str(), id.as_str()))
            .collect();
        assert_eq!(entries, vec![("77", "lounge"), ("0x76", "bedroom")]);
    }

    #[test]
    fn test_zero_delay_rejected() {
        let err = Config::parse("[general]\ndelay = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_invalid_bme680_address_rejected() {
        let err = Config::parse("[bme680sensors]\nlounge = \"0x77\"\n").unwrap_err();
        assert!(err.to_string().contains("Invalid I2C address: lounge"));
    }

    #[test]
    fn test_empty_w1_id_rejected() {
        let err = Config::parse("[w1sensors]\n\"28-aa\" = \" \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_nested_mqtt_validation() {
        let err = Config::parse("[mqtt]\nbroker = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            Config::parse("[general\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, FULL).unwrap();

        assert_eq!(Config::load(&path).unwrap().general.delay, 30);
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::IoError { .. })
        ));
    }

    #[test]
    fn test_resolve_path_order() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        let system = dir.path().join("etc.toml");

        assert_eq!(resolve_path(None, Some(home.as_path()), &system), None);

        fs::write(&system, "").unwrap();
        assert_eq!(resolve_path(None, Some(home.as_path()), &system), Some(system.clone()));

        let user = home.join(USER_CONFIG);
        fs::create_dir_all(user.parent().unwrap()).unwrap();
        fs::write(&user, "").unwrap();
        assert_eq!(resolve_path(None, Some(home.as_path()), &system), Some(user));

        let explicit = dir.path().join("explicit.toml");
        assert_eq!(
            resolve_path(Some(explicit.clone()), Some(home.as_path()), &system),
            Some(explicit)
        );
    }
}
