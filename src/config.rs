//! Configuration types for autostub

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::capture::SettleDelay;
use crate::gate::DEFAULT_API_MAX_WAITING_TIME_MS;
use crate::hosts::HostList;
use crate::stub::compile_patterns;
use crate::{AutostubError, Result};

/// Prefix of the environment variables read by [`Config::from_env`]
pub const ENV_PREFIX: &str = "AUTOSTUB_";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Record every test case, refreshing all fixtures
    #[serde(default)]
    pub force_api_recording: bool,
    /// API hosts; order defines the host index space
    #[serde(default, deserialize_with = "list_or_csv")]
    pub api_host: Vec<String>,
    /// URL regexes routed through while recording
    #[serde(default, deserialize_with = "list_or_csv")]
    pub stub_api_patterns: Vec<String>,
    /// Default timeout for waiting on in-flight requests
    #[serde(default = "default_api_max_waiting_time_ms")]
    pub api_max_waiting_time_ms: u64,
    /// Directory holding fixture files
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: PathBuf,
    /// Folder prefix removed from spec paths when naming fixtures
    #[serde(default = "default_integration_folder")]
    pub integration_folder: String,
    /// Spec file suffix removed when naming fixtures
    #[serde(default = "default_spec_suffix")]
    pub spec_suffix: String,
    /// Debounce on the last in-flight request
    #[serde(default)]
    pub settle: SettleDelay,
}

fn default_api_max_waiting_time_ms() -> u64 {
    DEFAULT_API_MAX_WAITING_TIME_MS
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from("cypress/fixtures")
}

fn default_integration_folder() -> String {
    "integration/".to_string()
}

fn default_spec_suffix() -> String {
    ".spec.ts".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            force_api_recording: false,
            api_host: Vec::new(),
            stub_api_patterns: Vec::new(),
            api_max_waiting_time_ms: DEFAULT_API_MAX_WAITING_TIME_MS,
            fixtures_dir: default_fixtures_dir(),
            integration_folder: default_integration_folder(),
            spec_suffix: default_spec_suffix(),
            settle: SettleDelay::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrCsv {
    List(Vec<String>),
    Csv(String),
}

fn list_or_csv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(items) => items,
        ListOrCsv::Csv(raw) => split_csv(&raw),
    })
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AutostubError::ConfigError(format!(
            "{name}: expected a boolean, got {other:?}"
        ))),
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AutostubError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AutostubError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `AUTOSTUB_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `AUTOSTUB_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Override fields from variables provided by `lookup`
    ///
    /// Recognized names (after [`ENV_PREFIX`]): `FORCE_API_RECORDING`,
    /// `API_HOST`, `STUB_API_PATTERNS`, `API_MAX_WAITING_TIME`, `FIXTURES_DIR`.
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(raw) = var("FORCE_API_RECORDING") {
            self.force_api_recording = parse_bool("FORCE_API_RECORDING", &raw)?;
        }
        if let Some(raw) = var("API_HOST") {
            self.api_host = split_csv(&raw);
        }
        if let Some(raw) = var("STUB_API_PATTERNS") {
            self.stub_api_patterns = split_csv(&raw);
        }
        if let Some(raw) = var("API_MAX_WAITING_TIME") {
            self.api_max_waiting_time_ms = raw.trim().parse().map_err(|e| {
                AutostubError::ConfigError(format!("API_MAX_WAITING_TIME: {e}"))
            })?;
        }
        if let Some(raw) = var("FIXTURES_DIR") {
            self.fixtures_dir = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.hosts().is_empty() {
            return Err(AutostubError::ConfigError(
                "At least one API host must be configured".to_string(),
            ));
        }

        if self.fixtures_dir.as_os_str().is_empty() {
            return Err(AutostubError::ConfigError(
                "fixtures_dir cannot be empty".to_string(),
            ));
        }

        if self.spec_suffix.is_empty() {
            return Err(AutostubError::ConfigError(
                "spec_suffix cannot be empty".to_string(),
            ));
        }

        compile_patterns(&self.stub_api_patterns)?;

        Ok(())
    }

    /// Configured hosts
    pub fn hosts(&self) -> HostList {
        HostList::new(&self.api_host)
    }

    /// Default quiescence timeout; zero means 60 seconds
    pub fn api_max_waiting_time(&self) -> Duration {
        if self.api_max_waiting_time_ms == 0 {
            Duration::from_millis(DEFAULT_API_MAX_WAITING_TIME_MS)
        } else {
            Duration::from_millis(self.api_max_waiting_time_ms)
        }
    }
}
