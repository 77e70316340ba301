//! Configuration Module
//!
//! Provides TOML-based configuration for C2-Hunter. The file is read once per
//! run and the resulting [`Config`] is passed by reference to every stage.
//!
//! Options absent from the file are never defaulted silently: each one is
//! reported with the value applied, and in strict mode a missing option is
//! fatal.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::export::OutputFormat;

/// Dotted keys for every option the detection pipelines consume.
pub const REQUIRED_KEYS: &[&str] = &[
    "fields.timestamp",
    "fields.direction",
    "fields.src_ip",
    "fields.dst_ip",
    "fields.dst_host",
    "fields.dst_port",
    "fields.sent_bytes",
    "fields.url",
    "fields.delimiter",
    "fields.outbound_value",
    "beacon.min_session_size",
    "beacon.jitter_seconds",
    "beacon.jitter_bytes",
    "beacon.max_transfer_bytes",
    "beacon.score_floor",
    "dns.fanout_floor",
];

/// Keys that only affect presentation. These may be omitted freely.
pub const OPTIONAL_KEYS: &[&str] = &["output.format", "output.file"];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub fields: FieldMapping,
    pub beacon: BeaconConfig,
    pub dns: DnsConfig,
    pub output: OutputConfig,
}

/// A loaded configuration together with the options that fell back to defaults.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub defaulted: Vec<String>,
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: &Path, strict: bool) -> Result<LoadedConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content, strict)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parses configuration text, reporting every required option it omits.
    pub fn from_toml_str(content: &str, strict: bool) -> Result<LoadedConfig> {
        let table: toml::Table = content.parse()?;
        let missing = missing_keys(&table);

        if strict {
            if let Some(key) = missing.first() {
                return Err(ConfigError::MissingOption {
                    key: key.to_string(),
                }
                .into());
            }
        }

        let config: Config = toml::from_str(content)?;

        let defaults = Config::default();
        for key in &missing {
            warn!(
                "Configuration option '{}' missing, applying default: {}",
                key,
                defaults.get(key).unwrap_or_default()
            );
        }

        config.validate()?;

        Ok(LoadedConfig {
            config,
            defaulted: missing,
        })
    }

    /// Loads configuration from file if given, otherwise returns defaults
    pub fn load_or_default(path: Option<&Path>, strict: bool) -> Result<LoadedConfig> {
        match path {
            Some(p) => Self::load(p, strict),
            None => {
                info!("No configuration file given, using built-in defaults");
                Ok(LoadedConfig {
                    config: Self::default(),
                    defaulted: Vec::new(),
                })
            }
        }
    }

    /// Generates a default configuration file content
    pub fn generate_default() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| "# Failed to generate config".to_string())
    }

    /// Validates the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !positive_finite(self.beacon.jitter_seconds) {
            return Err(ConfigError::Invalid(
                "jitter_seconds must be a finite number greater than 0".into(),
            ));
        }
        if !positive_finite(self.beacon.jitter_bytes) {
            return Err(ConfigError::Invalid(
                "jitter_bytes must be a finite number greater than 0".into(),
            ));
        }
        if !positive_finite(self.beacon.max_transfer_bytes) {
            return Err(ConfigError::Invalid(
                "max_transfer_bytes must be a finite number greater than 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.beacon.score_floor) {
            return Err(ConfigError::Invalid(
                "score_floor must be at least 0.0 and less than 1.0".into(),
            ));
        }
        self.fields.delimiter_byte()?;
        Ok(())
    }

    /// Returns the current value of a dotted option key as display text.
    pub fn get(&self, key: &str) -> Option<String> {
        if !is_known_key(key) {
            return None;
        }
        let (section, name) = key.split_once('.')?;
        let value = toml::Value::try_from(self).ok()?;
        match value.get(section).and_then(|s| s.get(name)) {
            Some(toml::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(String::new()),
        }
    }

    /// Changes one option by dotted key. The value is parsed according to the
    /// option's type and the result is re-validated.
    pub fn set(&mut self, key: &str, raw: &str) -> std::result::Result<(), ConfigError> {
        if !is_known_key(key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        let (section, name) = key
            .split_once('.')
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

        let mut root = toml::Value::try_from(&*self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let template = toml::Value::try_from(Config::default())
            .ok()
            .and_then(|v| v.get(section).and_then(|s| s.get(name)).cloned());

        let parsed = match template {
            Some(toml::Value::Integer(_)) => raw
                .parse::<i64>()
                .map(toml::Value::Integer)
                .map_err(|_| ConfigError::Invalid(format!("{} expects an integer, got '{}'", key, raw)))?,
            Some(toml::Value::Float(_)) => raw
                .parse::<f64>()
                .map(toml::Value::Float)
                .map_err(|_| ConfigError::Invalid(format!("{} expects a number, got '{}'", key, raw)))?,
            Some(toml::Value::Boolean(_)) => raw
                .parse::<bool>()
                .map(toml::Value::Boolean)
                .map_err(|_| ConfigError::Invalid(format!("{} expects true or false, got '{}'", key, raw)))?,
            _ => toml::Value::String(raw.to_string()),
        };

        let section_table = root
            .as_table_mut()
            .and_then(|t| t.get_mut(section))
            .and_then(|s| s.as_table_mut())
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        section_table.insert(name.to_string(), parsed);

        let updated: Config = root
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Lists every option with its current value, in declaration order.
    pub fn entries(&self) -> Vec<(String, String)> {
        REQUIRED_KEYS
            .iter()
            .chain(OPTIONAL_KEYS.iter())
            .map(|key| (key.to_string(), self.get(key).unwrap_or_default()))
            .collect()
    }

    /// Writes the configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}

fn positive_finite(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn is_known_key(key: &str) -> bool {
    REQUIRED_KEYS.contains(&key) || OPTIONAL_KEYS.contains(&key)
}

/// Required options not present in a parsed TOML table.
fn missing_keys(table: &toml::Table) -> Vec<String> {
    REQUIRED_KEYS
        .iter()
        .filter(|key| {
            let Some((section, name)) = key.split_once('.') else {
                return true;
            };
            !table
                .get(section)
                .and_then(|s| s.as_table())
                .is_some_and(|s| s.contains_key(name))
        })
        .map(|key| key.to_string())
        .collect()
}

/// Column names in the collected logs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Event time, second resolution
    pub timestamp: String,
    /// Traffic direction column
    pub direction: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub dst_host: String,
    pub dst_port: String,
    /// Per-connection transfer size
    pub sent_bytes: String,
    /// Domain column in DNS logs
    pub url: String,
    /// Single-character field delimiter ("\t" for tab)
    pub delimiter: String,
    /// Direction value marking outbound traffic (matched exactly)
    pub outbound_value: String,
}

impl FieldMapping {
    /// Returns the delimiter as a single byte.
    pub fn delimiter_byte(&self) -> std::result::Result<u8, ConfigError> {
        match self.delimiter.as_str() {
            "\\t" | "\t" => Ok(b'\t'),
            d if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
            d => Err(ConfigError::Invalid(format!(
                "delimiter must be a single ASCII character, got '{}'",
                d
            ))),
        }
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            timestamp: "Log Date".into(),
            direction: "Direction".into(),
            src_ip: "IP Address (Origin)".into(),
            dst_ip: "IP Address (Impacted)".into(),
            dst_host: "Host (Impacted)".into(),
            dst_port: "TCP/UDP Port (Impacted)".into(),
            sent_bytes: "Host (Impacted) KBytes Rcvd".into(),
            url: "Domain (Impacted)".into(),
            delimiter: ",".into(),
            outbound_value: "Outbound".into(),
        }
    }
}

/// Beacon scoring thresholds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Sessions need strictly more events than this to be analyzed
    pub min_session_size: usize,
    /// Inter-arrival MADM (seconds) at which the jitter score reaches zero
    pub jitter_seconds: f64,
    /// Transfer-size MADM (bytes) at which the jitter score reaches zero
    pub jitter_bytes: f64,
    /// Median transfer size at which the smallness score reaches zero
    pub max_transfer_bytes: f64,
    /// Sessions must score strictly above this to be reported (< 1.0)
    pub score_floor: f64,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            min_session_size: 20,
            jitter_seconds: 30.0,
            jitter_bytes: 32.0,
            max_transfer_bytes: 65535.0,
            score_floor: 0.80,
        }
    }
}

/// DNS fan-out reporting
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Domains must have a fan-out strictly above this to be reported
    pub fanout_floor: usize,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self { fanout_floor: 100 }
    }
}

/// Output-related configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format (text, json, jsonl)
    #[serde(with = "output_format_serde")]
    pub format: OutputFormat,
    /// Output file path (None = stdout)
    pub file: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
        }
    }
}

/// Custom serde implementation for OutputFormat
mod output_format_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(format: &OutputFormat, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OutputFormat, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.beacon.min_session_size, 20);
        assert_eq!(config.beacon.jitter_seconds, 30.0);
        assert_eq!(config.beacon.jitter_bytes, 32.0);
        assert_eq!(config.beacon.max_transfer_bytes, 65535.0);
        assert_eq!(config.beacon.score_floor, 0.80);
        assert_eq!(config.dns.fanout_floor, 100);
        assert_eq!(config.fields.outbound_value, "Outbound");
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.beacon.score_floor = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.beacon.jitter_seconds = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fields.delimiter = ";;".into();
        assert!(config.validate().is_err());
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut config = Config::default();
            config.beacon.jitter_seconds = bad;
            assert!(config.validate().is_err(), "jitter_seconds {} accepted", bad);

            let mut config = Config::default();
            config.beacon.jitter_bytes = bad;
            assert!(config.validate().is_err(), "jitter_bytes {} accepted", bad);

            let mut config = Config::default();
            config.beacon.max_transfer_bytes = bad;
            assert!(config.validate().is_err(), "max_transfer_bytes {} accepted", bad);
        }
    }

    #[test]
    fn test_non_finite_thresholds_rejected() {
        let toml_str = "[beacon]\njitter_seconds = nan\nmax_transfer_bytes = inf\n";
        assert!(Config::from_toml_str(toml_str, false).is_err());

        let mut config = Config::default();
        assert!(matches!(
            config.set("beacon.jitter_seconds", "nan"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(config.set("beacon.max_transfer_bytes", "inf").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_delimiter_byte() {
        let mut fields = FieldMapping::default();
        assert_eq!(fields.delimiter_byte().unwrap(), b',');
        fields.delimiter = "\\t".into();
        assert_eq!(fields.delimiter_byte().unwrap(), b'\t');
        fields.delimiter = "|".into();
        assert_eq!(fields.delimiter_byte().unwrap(), b'|');
    }

    #[test]
    fn test_generate_default_config() {
        let config_str = Config::generate_default();
        assert!(config_str.contains("[fields]"));
        assert!(config_str.contains("[beacon]"));
        assert!(config_str.contains("[dns]"));
        assert!(config_str.contains("[output]"));

        let loaded = Config::from_toml_str(&config_str, true).unwrap();
        assert_eq!(loaded.config, Config::default());
        assert!(loaded.defaulted.is_empty());
    }

    #[test]
    fn test_partial_config_reports_defaults() {
        let toml_str = r#"
[beacon]
min_session_size = 10
score_floor = 0.9

[output]
format = "json"
"#;

        let loaded = Config::from_toml_str(toml_str, false).unwrap();
        assert_eq!(loaded.config.beacon.min_session_size, 10);
        assert_eq!(loaded.config.beacon.score_floor, 0.9);
        assert_eq!(loaded.config.beacon.jitter_seconds, 30.0);
        assert_eq!(loaded.config.output.format, OutputFormat::Json);

        assert!(loaded.defaulted.contains(&"beacon.jitter_seconds".to_string()));
        assert!(loaded.defaulted.contains(&"dns.fanout_floor".to_string()));
        assert!(!loaded.defaulted.contains(&"beacon.score_floor".to_string()));
        assert!(!loaded.defaulted.iter().any(|k| k.starts_with("output.")));
    }

    #[test]
    fn test_strict_config_rejects_missing() {
        let toml_str = "[beacon]\nmin_session_size = 10\n";
        let err = Config::from_toml_str(toml_str, true).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(config_err, ConfigError::MissingOption { key } if key == "fields.timestamp"));
    }

    #[test]
    fn test_invalid_floor_rejected_on_load() {
        let toml_str = "[beacon]\nscore_floor = 1.5\n";
        assert!(Config::from_toml_str(toml_str, false).is_err());
    }

    #[test]
    fn test_get_and_set() {
        let mut config = Config::default();
        assert_eq!(config.get("beacon.min_session_size").unwrap(), "20");
        assert_eq!(config.get("fields.timestamp").unwrap(), "Log Date");
        assert!(config.get("beacon.nonexistent").is_none());

        config.set("beacon.score_floor", "0.9").unwrap();
        assert_eq!(config.beacon.score_floor, 0.9);

        config.set("beacon.min_session_size", "5").unwrap();
        assert_eq!(config.beacon.min_session_size, 5);

        config.set("fields.timestamp", "time").unwrap();
        assert_eq!(config.fields.timestamp, "time");

        config.set("output.file", "out.json").unwrap();
        assert_eq!(config.output.file.as_deref(), Some("out.json"));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(matches!(
            config.set("beacon.unknown", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            config.set("beacon.min_session_size", "lots"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(config.set("beacon.score_floor", "1.0").is_err());
        // Failed sets leave the config untouched
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_entries_cover_all_keys() {
        let entries = Config::default().entries();
        assert_eq!(entries.len(), REQUIRED_KEYS.len() + OPTIONAL_KEYS.len());
        assert!(entries
            .iter()
            .any(|(k, v)| k == "dns.fanout_floor" && v == "100"));
    }
}
