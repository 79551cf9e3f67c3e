//! Configuration loading
//!
//! Bootstrap settings come from a TOML file. Values are resolved in priority
//! order by the service binary:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing default-location config file is not an error: the service logs a
//! warning and starts on compiled defaults. A file named explicitly must exist.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Config file name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "scanner.toml";

/// Which passport to stamp when a member owns several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassportPolicy {
    /// First entry in server response order
    #[default]
    FirstReturned,
    /// Smallest passport id
    LowestId,
    /// Most recent `issued_at`; passports without one sort last
    NewestIssued,
    /// First passport whose status is ACTIVE, else first returned
    ActiveFirst,
}

impl FromStr for PassportPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-returned" => Ok(PassportPolicy::FirstReturned),
            "lowest-id" => Ok(PassportPolicy::LowestId),
            "newest-issued" => Ok(PassportPolicy::NewestIssued),
            "active-first" => Ok(PassportPolicy::ActiveFirst),
            _ => Err(Error::InvalidSetting {
                setting: "passport_policy",
                value: s.to_string(),
                expected: "first-returned, lowest-id, newest-issued, active-first",
            }),
        }
    }
}

/// How duplicate stamps are detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateCheck {
    /// Query existing stamps before creating (two round trips)
    #[default]
    PreCheck,
    /// Create directly and rely on the server's conflict response
    ServerOnly,
}

impl FromStr for DuplicateCheck {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pre-check" => Ok(DuplicateCheck::PreCheck),
            "server-only" => Ok(DuplicateCheck::ServerOnly),
            _ => Err(Error::InvalidSetting {
                setting: "duplicate_check",
                value: s.to_string(),
                expected: "pre-check, server-only",
            }),
        }
    }
}

/// Expected shape of member ids inside QR payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdFormat {
    /// Digits only
    #[default]
    Numeric,
    /// ASCII alphanumerics, `-` and `_`
    Token,
}

impl FromStr for IdFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numeric" => Ok(IdFormat::Numeric),
            "token" => Ok(IdFormat::Token),
            _ => Err(Error::InvalidSetting {
                setting: "member_id_format",
                value: s.to_string(),
                expected: "numeric, token",
            }),
        }
    }
}

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional; absent values fall through to compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the attendance backend, e.g. `https://api.example.org/api`
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Session cookie forwarded on every backend request (`SESSION=...`)
    #[serde(default)]
    pub session_cookie: Option<String>,

    /// Local HTTP port for the scanner service
    #[serde(default)]
    pub port: Option<u16>,

    /// Per-request timeout for backend calls
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Scan history refresh interval
    #[serde(default)]
    pub history_refresh_secs: Option<u64>,

    /// Trailing window used for the scans-per-minute statistic
    #[serde(default)]
    pub rate_window_mins: Option<u32>,

    /// Live decoder sampling interval
    #[serde(default)]
    pub sample_interval_ms: Option<u64>,

    /// Minimum gap before the live decoder re-delivers the same code
    #[serde(default)]
    pub duplicate_cooldown_ms: Option<u64>,

    #[serde(default)]
    pub passport_policy: Option<PassportPolicy>,

    #[serde(default)]
    pub duplicate_check: Option<DuplicateCheck>,

    #[serde(default)]
    pub member_id_format: Option<IdFormat>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default config file locations, most specific first
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("stampify").join(CONFIG_FILE_NAME));
    }
    if cfg!(unix) {
        paths.push(PathBuf::from("/etc/stampify").join(CONFIG_FILE_NAME));
    }
    paths
}

/// Parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the bootstrap config
///
/// With `explicit` set, that file must exist and parse. Otherwise the default
/// locations are tried in order and a missing file yields `TomlConfig::default()`.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = read_toml_config(path)?;
        info!("Loaded config from {}", path.display());
        return Ok(config);
    }

    for path in default_config_paths() {
        if path.exists() {
            let config = read_toml_config(&path)?;
            info!("Loaded config from {}", path.display());
            return Ok(config);
        }
    }

    warn!("No config file found, using compiled defaults");
    Ok(TomlConfig::default())
}

/// Write a TOML config file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    // temp file + rename so a crash never leaves a half-written config
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
