//! Configuration infrastructure
//!
//! Layered loading with the `config` crate:
//! 1. Built-in defaults (see [`defaults`])
//! 2. Optional config file (`config.toml` / `config.json` in the user config dir, or an explicit path)
//! 3. Environment overrides, e.g. `NSIS_CHECKER__BATCH__INTER_CODE_DELAY_MS=1000`

#![allow(clippy::derivable_impls)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::site_profile::SiteProfile;

pub const ENV_PREFIX: &str = "NSIS_CHECKER";
pub const APP_DIR_NAME: &str = "nsis-checker";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },

    #[error("Failed to write config to {path:?}: {message}")]
    Write { path: PathBuf, message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub automation: AutomationConfig,
    pub browser: BrowserSettings,
    pub batch: BatchConfig,
    pub site: SiteProfile,
    pub spreadsheet: SpreadsheetConfig,
    pub logging: LoggingConfig,
}

/// Timing and retry bounds for one fetch cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Additional attempts after the first
    pub max_retries: u32,
    pub delay_after_input_ms: u64,
    pub delay_after_click_ms: u64,
    pub delay_between_retries_ms: u64,
    pub results_timeout_ms: u64,
    pub results_poll_interval_ms: u64,
    pub navigation_timeout_ms: u64,
    /// Pause after adopting an attached surface before touching it
    pub attach_settle_ms: u64,
}

impl AutomationConfig {
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub const fn delay_after_input(&self) -> Duration {
        Duration::from_millis(self.delay_after_input_ms)
    }

    pub const fn delay_after_click(&self) -> Duration {
        Duration::from_millis(self.delay_after_click_ms)
    }

    pub const fn delay_between_retries(&self) -> Duration {
        Duration::from_millis(self.delay_between_retries_ms)
    }

    pub const fn results_timeout(&self) -> Duration {
        Duration::from_millis(self.results_timeout_ms)
    }

    pub const fn results_poll_interval(&self) -> Duration {
        Duration::from_millis(self.results_poll_interval_ms)
    }

    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub const fn attach_settle(&self) -> Duration {
        Duration::from_millis(self.attach_settle_ms)
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            delay_after_input_ms: defaults::DELAY_AFTER_INPUT_MS,
            delay_after_click_ms: defaults::DELAY_AFTER_CLICK_MS,
            delay_between_retries_ms: defaults::DELAY_BETWEEN_RETRIES_MS,
            results_timeout_ms: defaults::RESULTS_TIMEOUT_MS,
            results_poll_interval_ms: defaults::RESULTS_POLL_INTERVAL_MS,
            navigation_timeout_ms: defaults::NAVIGATION_TIMEOUT_MS,
            attach_settle_ms: defaults::ATTACH_SETTLE_MS,
        }
    }
}

/// Browser launch or attach settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
    pub args: Vec<String>,
    /// Chrome/Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    /// DevTools websocket of an already running browser to attach to
    pub attach_ws_url: Option<String>,
    /// Page to adopt when attaching; first page when unset
    pub attach_target_id: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: defaults::BROWSER_HEADLESS,
            window_width: defaults::WINDOW_WIDTH,
            window_height: defaults::WINDOW_HEIGHT,
            user_agent: defaults::USER_AGENT.to_string(),
            args: defaults::BROWSER_ARGS.iter().map(|s| (*s).to_string()).collect(),
            executable: None,
            attach_ws_url: None,
            attach_target_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pause between codes
    pub inter_code_delay_ms: u64,
    /// Buffered events per subscriber
    pub event_channel_capacity: usize,
}

impl BatchConfig {
    pub const fn inter_code_delay(&self) -> Duration {
        Duration::from_millis(self.inter_code_delay_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inter_code_delay_ms: defaults::INTER_CODE_DELAY_MS,
            event_channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadsheetConfig {
    /// Header of the column holding the codes (case-insensitive)
    pub code_column_header: String,
    /// Inserted between file stem and timestamp for fallback copies
    pub fallback_suffix: String,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        Self {
            code_column_header: defaults::CODE_COLUMN_HEADER.to_string(),
            fallback_suffix: defaults::FALLBACK_SUFFIX.to_string(),
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Keep only the most recent log file (delete all others)
    pub keep_only_latest: bool,

    /// Module-specific log level filters (e.g., "chromiumoxide": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            keep_only_latest: defaults::LOG_KEEP_ONLY_LATEST,
            module_filters: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Loads defaults, then the config file (explicit or the per-user one), then env overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path));
            }
            None => {
                if let Some(dir) = ConfigManager::config_dir() {
                    builder = builder.add_source(config::File::from(dir.join("config")).required(false));
                }
            }
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Validation {
            message: message.to_string(),
        };

        if url::Url::parse(&self.site.target_url).is_err() {
            return Err(ConfigError::Validation {
                message: format!("site.target_url is not a valid URL: {}", self.site.target_url),
            });
        }
        if self.site.input_selectors.is_empty() {
            return Err(invalid("site.input_selectors must not be empty"));
        }
        if self.site.submit_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(invalid("site.submit_keywords must contain at least one keyword"));
        }
        if self.site.results_row_selector.trim().is_empty() {
            return Err(invalid("site.results_row_selector must not be empty"));
        }
        if self.site.fallback().is_none() {
            return Err(invalid("site.fallback_layout has no matching entry in site.layouts"));
        }
        if self.automation.results_timeout_ms == 0 {
            return Err(invalid("automation.results_timeout_ms must be greater than 0"));
        }
        if self.automation.results_poll_interval_ms == 0 {
            return Err(invalid("automation.results_poll_interval_ms must be greater than 0"));
        }
        if self.automation.navigation_timeout_ms == 0 {
            return Err(invalid("automation.navigation_timeout_ms must be greater than 0"));
        }
        if self.batch.event_channel_capacity == 0 {
            return Err(invalid("batch.event_channel_capacity must be greater than 0"));
        }
        if self.spreadsheet.code_column_header.trim().is_empty() {
            return Err(invalid("spreadsheet.code_column_header must not be empty"));
        }
        Ok(())
    }
}

/// Locates and writes the per-user configuration file
pub struct ConfigManager;

impl ConfigManager {
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
    }

    pub fn default_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    /// Writes the default configuration as pretty JSON, creating parent directories
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let write_error = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(&AppConfig::default())
            .map_err(|e| write_error(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| write_error(e.to_string()))?;

        info!("✅ Wrote default configuration: {:?}", path);
        Ok(())
    }
}

/// Default configuration values
pub mod defaults {
    /// Additional attempts after the first one
    pub const MAX_RETRIES: u32 = 2;

    /// Lets page-side validation run after the input events
    pub const DELAY_AFTER_INPUT_MS: u64 = 50;

    /// Lets results render after submit
    pub const DELAY_AFTER_CLICK_MS: u64 = 500;

    /// Fixed backoff between attempts
    pub const DELAY_BETWEEN_RETRIES_MS: u64 = 500;

    pub const RESULTS_TIMEOUT_MS: u64 = 5000;
    pub const RESULTS_POLL_INTERVAL_MS: u64 = 50;
    pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;
    pub const ATTACH_SETTLE_MS: u64 = 500;

    pub const INTER_CODE_DELAY_MS: u64 = 500;
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

    pub const BROWSER_HEADLESS: bool = false;
    pub const WINDOW_WIDTH: u32 = 1280;
    pub const WINDOW_HEIGHT: u32 = 720;
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    pub const BROWSER_ARGS: &[&str] = &[
        "--disable-blink-features=AutomationControlled",
        "--no-sandbox",
        "--disable-setuid-sandbox",
    ];

    pub const CODE_COLUMN_HEADER: &str = "ricerca";
    pub const FALLBACK_SUFFIX: &str = "_output";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_FILE_NAME: &str = "nsis-checker.log";
    pub const LOG_MAX_FILES: u32 = 10;
    pub const LOG_AUTO_CLEANUP: bool = true;
    pub const LOG_KEEP_ONLY_LATEST: bool = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LayoutVersion;
    use crate::infrastructure::site_profile::LayoutSelection;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.automation.max_attempts(), 3);
        assert_eq!(config.automation.results_timeout(), Duration::from_millis(5000));
        assert_eq!(config.batch.inter_code_delay(), Duration::from_millis(500));
        assert_eq!(config.spreadsheet.code_column_header, "ricerca");
    }

    #[test]
    fn test_load_partial_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{ "automation": {{ "max_retries": 4 }}, "site": {{ "layout": "v7" }}, "browser": {{ "headless": true }} }}"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.automation.max_retries, 4);
        assert_eq!(config.automation.delay_after_click_ms, defaults::DELAY_AFTER_CLICK_MS);
        assert_eq!(config.site.layout, LayoutSelection::Fixed(LayoutVersion::Legacy7));
        assert!(config.browser.headless);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[batch]\ninter_code_delay_ms = 1200\n\n[logging]\nlevel = \"debug\"").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.batch.inter_code_delay_ms, 1200);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_zero_poll_interval() {
        let mut config = AppConfig::default();
        config.automation.results_poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let mut config = AppConfig::default();
        config.site.target_url = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("target_url"));
    }

    #[test]
    fn test_write_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        ConfigManager::write_default(&path).unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.site, SiteProfile::nsis());
        assert_eq!(config.automation, AutomationConfig::default());
    }
}
