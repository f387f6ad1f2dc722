//! Logging system configuration and initialization
//!
//! - Console and/or file output, file written through a non-blocking appender
//! - Optional JSON file format
//! - `RUST_LOG` overrides the configured filter
//! - Log files stored in `logs/` next to the executable, previous log rotated by timestamp

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::Local;
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Dependencies that are noisy below TRACE
const QUIET_TARGETS: &[(&str, &str)] = &[
    ("chromiumoxide", "warn"),
    ("chromiumoxide::conn", "error"),
    ("chromiumoxide::handler", "error"),
    ("tungstenite", "warn"),
    ("async_tungstenite", "warn"),
    ("hyper", "warn"),
    ("umya_spreadsheet", "warn"),
];

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Builds the filter directives for a configured level.
///
/// Dependency noise is suppressed unless the level asks for TRACE;
/// explicit `module_filters` win over both.
pub fn filter_directives(config: &LoggingConfig) -> Vec<String> {
    let mut directives = vec![config.level.clone()];

    if !config.level.to_lowercase().contains("trace") {
        directives.extend(QUIET_TARGETS.iter().map(|(target, level)| format!("{target}={level}")));
    }

    let mut modules: Vec<_> = config.module_filters.iter().collect();
    modules.sort();
    directives.extend(modules.into_iter().map(|(target, level)| format!("{target}={level}")));
    directives
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut filter = EnvFilter::new(&config.level);
    for directive in filter_directives(config).iter().skip(1) {
        match directive.parse() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(e) => eprintln!("Ignoring invalid log directive '{}': {}", directive, e),
        }
    }
    filter
}

/// Initialize logging with custom configuration
///
/// # Environment Variable Override
/// ```bash
/// # Show CDP traffic while debugging selectors
/// RUST_LOG="debug,chromiumoxide=debug" nsis-checker codes.xlsx
/// ```
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let log_dir = get_log_directory();
    let env_filter = build_env_filter(&config);

    let file_writer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        rotate_existing_log_file(&log_dir, &config.file_name)?;
        if config.auto_cleanup_logs {
            cleanup_old_logs(&log_dir, &config)?;
        }

        let file_appender = rolling::never(&log_dir, &config.file_name);
        let (writer, guard) = non_blocking(file_appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(guard);
        Some(writer)
    } else {
        None
    };

    let json_file_layer = file_writer.clone().filter(|_| config.json_format).map(|writer| {
        fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_timer(LocalTimeFormatter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
    });

    // Minimal formatting for plain files: time + level + message
    let plain_file_layer = file_writer.filter(|_| !config.json_format).map(|writer| {
        fmt::Layer::new()
            .with_writer(writer)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
            .with_ansi(false)
    });

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    });

    Registry::default()
        .with(env_filter)
        .with(json_file_layer)
        .with(plain_file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("📝 Logging system initialized");
    info!("Log directory: {:?}", log_dir);
    info!("Log level: {}", config.level);
    info!(
        "File output: {} (json: {}), console output: {}",
        config.file_output, config.json_format, config.console_output
    );

    Ok(())
}

/// Rotate existing log file by renaming it with its timestamp
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<()> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(&log_file_path)
        .map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let datetime: chrono::DateTime<Local> = file_time.into();

    let file_stem = log_file_name.trim_end_matches(".log");
    let timestamped_name = format!("{}.{}.log", file_stem, datetime.format("%Y%m%dT%H%M%S"));
    let timestamped_path = log_dir.join(&timestamped_name);

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;

    Ok(())
}

/// Clean up old log files based on configuration
fn cleanup_old_logs(log_dir: &Path, config: &LoggingConfig) -> Result<usize> {
    let mut log_files = Vec::new();

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.is_file() && path.extension().is_some_and(|ext| ext == "log");
        if !is_log {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            log_files.push((path, modified));
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let keep = if config.keep_only_latest {
        1
    } else {
        config.max_files as usize
    };

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }

    Ok(removed)
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== NSIS Checker System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }

    info!("Log directory: {:?}", get_log_directory());
    info!("=======================================");
}
