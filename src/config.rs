//! Configuration file support for cluster-spots.
//!
//! Loads settings from `~/.config/cluster-spots/config.toml` on Linux
//! (or platform-appropriate location on other OSes). Command-line flags
//! override anything set here.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::radio::flex::DISCOVER_PREFIX;
use crate::registry::RegistrySettings;

/// Deserialize a human-readable duration string like "5m" into a `Duration`.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Parse a human-readable duration.
///
/// Supports: ms, s, m, h (case-insensitive), and sequences of them.
/// A bare number is seconds.
/// Examples: "300", "300s", "5m", "1h", "1m30s", "500ms"
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let lower = s.to_ascii_lowercase();
    if let Ok(secs) = lower.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).map_err(|e| format!("{}: {}", s, e));
    }

    let mut total = Duration::ZERO;
    let mut rest = lower.as_str();
    while !rest.is_empty() {
        // Find where the numeric part ends
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (num_str, tail) = rest.split_at(num_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let num: f64 = num_str
            .parse()
            .map_err(|_| format!("invalid number in duration: {}", s))?;

        let secs_per_unit = match unit {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(format!("unknown duration unit: {}", unit)),
        };

        total += Duration::try_from_secs_f64(num * secs_per_unit)
            .map_err(|e| format!("{}: {}", s, e))?;
        rest = tail;
    }

    Ok(total)
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Radio address, or `:discover:` with optional `key=value` filters.
    pub radio: String,

    /// Station name announced to the radio.
    pub station: String,

    /// Callsign sent to the cluster to log in.
    pub callsign: Option<String>,

    /// Cluster server as `host:port`.
    pub server: Option<String>,

    /// How long a spot lives on the radio.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,

    /// Remove spots whose comment says QRT.
    pub qrt: bool,

    /// Expect a given callsign only once per band.
    pub one_per_band: bool,

    /// Filter command sent to the cluster after login.
    pub filter: Option<String>,

    /// Connection timeout in seconds.
    pub connect_timeout: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Colorize console output.
    pub color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radio: DISCOVER_PREFIX.to_string(),
            station: "Flex".to_string(),
            callsign: None,
            server: None,
            timeout: Duration::from_secs(5 * 60),
            qrt: true,
            one_per_band: true,
            filter: None,
            connect_timeout: 30,
            log_level: "info".to_string(),
            color: true,
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cluster-spots/config.toml"))
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> Result<()> {
        match self.server.as_deref() {
            None | Some("") => bail!("a cluster server is required (--server host:port)"),
            Some(server) if !server.contains(':') => {
                bail!("cluster server '{}' must be host:port", server)
            }
            _ => {}
        }
        if self.timeout.as_secs() == 0 {
            bail!("spot timeout must be at least one second");
        }
        if self.radio.trim().is_empty() {
            bail!("radio address must not be empty");
        }
        Ok(())
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            lifetime: self.timeout,
            one_per_band: self.one_per_band,
            qrt_removes: self.qrt,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}
