//! Configuration resolution for stampify-scanner
//!
//! Priority: command line → environment (both via clap) → TOML → compiled default.

use crate::orchestrator::OrchestratorSettings;
use crate::live::LiveSettings;
use clap::Parser;
use stampify_common::config::{DuplicateCheck, IdFormat, PassportPolicy, TomlConfig};
use stampify_common::time::millis_to_duration;
use stampify_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5790;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HISTORY_REFRESH_SECS: u64 = 30;
pub const DEFAULT_RATE_WINDOW_MINS: u32 = 5;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_DUPLICATE_COOLDOWN_MS: u64 = 3_000;

/// Command-line arguments for stampify-scanner
#[derive(Parser, Debug, Default)]
#[command(name = "stampify-scanner")]
#[command(about = "Event check-in scanner service for Stampify")]
#[command(version)]
pub struct CliArgs {
    /// TOML config file (default: platform config dir)
    #[arg(short, long, env = "STAMPIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Attendance backend base URL
    #[arg(long, env = "STAMPIFY_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Session cookie sent with every backend request
    #[arg(long, env = "STAMPIFY_SESSION_COOKIE", hide_env_values = true)]
    pub session_cookie: Option<String>,

    /// Local port for the scanner service
    #[arg(short, long, env = "STAMPIFY_SCANNER_PORT")]
    pub port: Option<u16>,

    /// Event to select at startup
    #[arg(long, env = "STAMPIFY_EVENT_ID")]
    pub event_id: Option<i64>,

    #[arg(long, env = "STAMPIFY_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    #[arg(long, env = "STAMPIFY_HISTORY_REFRESH_SECS")]
    pub history_refresh_secs: Option<u64>,

    #[arg(long, env = "STAMPIFY_PASSPORT_POLICY")]
    pub passport_policy: Option<PassportPolicy>,

    #[arg(long, env = "STAMPIFY_DUPLICATE_CHECK")]
    pub duplicate_check: Option<DuplicateCheck>,

    #[arg(long, env = "STAMPIFY_MEMBER_ID_FORMAT")]
    pub member_id_format: Option<IdFormat>,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "STAMPIFY_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub api_base_url: String,
    pub session_cookie: Option<String>,
    pub port: u16,
    pub initial_event_id: Option<i64>,
    pub request_timeout: Duration,
    pub history_refresh: Duration,
    pub rate_window_mins: u32,
    pub orchestrator: OrchestratorSettings,
    pub live: LiveSettings,
    pub member_id_format: IdFormat,
    pub log_level: String,
}

impl ScannerConfig {
    pub fn resolve(args: &CliArgs, toml: &TomlConfig) -> Result<Self> {
        let api_base_url = args
            .api_base_url
            .clone()
            .or_else(|| toml.api_base_url.clone())
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "Backend URL not configured. Set one of:\n\
                     1. --api-base-url https://host/api\n\
                     2. STAMPIFY_API_BASE_URL=https://host/api\n\
                     3. api_base_url = \"https://host/api\" in scanner.toml"
                        .to_string(),
                )
            })?;
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api_base_url must be an http(s) URL, got '{}'",
                api_base_url
            )));
        }

        let request_timeout_ms = args
            .request_timeout_ms
            .or(toml.request_timeout_ms)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        if request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".to_string()));
        }
        let request_timeout = millis_to_duration(request_timeout_ms);

        let history_refresh_secs = args
            .history_refresh_secs
            .or(toml.history_refresh_secs)
            .unwrap_or(DEFAULT_HISTORY_REFRESH_SECS);
        if history_refresh_secs == 0 {
            return Err(Error::Config("history_refresh_secs must be positive".to_string()));
        }

        let sample_interval_ms = toml.sample_interval_ms.unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS);
        if sample_interval_ms == 0 {
            return Err(Error::Config("sample_interval_ms must be positive".to_string()));
        }

        Ok(Self {
            api_base_url,
            session_cookie: args.session_cookie.clone().or_else(|| toml.session_cookie.clone()),
            port: args.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            initial_event_id: args.event_id,
            request_timeout,
            history_refresh: Duration::from_secs(history_refresh_secs),
            rate_window_mins: toml
                .rate_window_mins
                .filter(|m| *m > 0)
                .unwrap_or(DEFAULT_RATE_WINDOW_MINS),
            orchestrator: OrchestratorSettings {
                passport_policy: args
                    .passport_policy
                    .or(toml.passport_policy)
                    .unwrap_or_default(),
                duplicate_check: args
                    .duplicate_check
                    .or(toml.duplicate_check)
                    .unwrap_or_default(),
                step_timeout: request_timeout,
            },
            live: LiveSettings {
                sample_interval: millis_to_duration(sample_interval_ms),
                duplicate_cooldown: millis_to_duration(
                    toml.duplicate_cooldown_ms.unwrap_or(DEFAULT_DUPLICATE_COOLDOWN_MS),
                ),
            },
            member_id_format: args
                .member_id_format
                .or(toml.member_id_format)
                .unwrap_or_default(),
            log_level: args
                .log_level
                .clone()
                .unwrap_or_else(|| toml.logging.level.clone()),
        })
    }
}
