//! Command-line host
//!
//! Stands in for the desktop shell: loads codes from a workbook, runs one
//! batch with console progress, maps Ctrl-C to a cooperative stop and writes
//! the results back.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::application::BatchOrchestrator;
use crate::domain::{BatchEvent, Code, LogLevel, ProcessingResult};
use crate::infrastructure::config::{AppConfig, ConfigManager};
use crate::infrastructure::logging::{init_logging_with_config, log_system_info};
use crate::infrastructure::site_profile::LayoutSelection;
use crate::infrastructure::spreadsheet::{SaveReport, SpreadsheetAdapter};
use crate::infrastructure::{AutomationEngine, ChromiumAttachLauncher, ChromiumLauncher, SurfaceLauncher};

#[derive(Parser, Debug)]
#[command(name = "nsis-checker", version, about = "Looks up NSIS practice states and writes them back to a workbook")]
pub struct Cli {
    /// Workbook (.xlsx) with a "Ricerca" column of codes
    pub workbook: Option<PathBuf>,

    /// Config file (toml/json); defaults to the per-user config dir
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Attach to a running browser's DevTools websocket instead of launching one
    #[arg(long, value_name = "WS_URL")]
    pub attach: Option<String>,

    /// Target id of the page to adopt when attaching
    #[arg(long, requires = "attach")]
    pub target: Option<String>,

    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Result row layout: auto, v7 or v11
    #[arg(long)]
    pub layout: Option<LayoutSelection>,

    /// Write the default configuration and exit; defaults to the per-user config file
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub write_default_config: Option<Option<PathBuf>>,
}

impl Cli {
    /// Command-line flags win over file and environment settings
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(ws_url) = &self.attach {
            config.browser.attach_ws_url = Some(ws_url.clone());
        }
        if let Some(target) = &self.target {
            config.browser.attach_target_id = Some(target.clone());
        }
        if let Some(layout) = self.layout {
            config.site.layout = layout;
        }
    }
}

pub fn build_launcher(config: &AppConfig) -> Arc<dyn SurfaceLauncher> {
    match &config.browser.attach_ws_url {
        Some(ws_url) => Arc::new(ChromiumAttachLauncher::new(
            ws_url.clone(),
            config.browser.attach_target_id.clone(),
            config.automation.attach_settle(),
        )),
        None => Arc::new(ChromiumLauncher::new(config.browser.clone())),
    }
}

fn print_event(event: &BatchEvent) {
    match event {
        BatchEvent::ProgressUpdate { current, total } => println!("[{current}/{total}]"),
        BatchEvent::StatusUpdate { message } => println!("» {message}"),
        BatchEvent::BadgeUpdate { badges } if badges.total() > 0 => println!("  {badges}"),
        BatchEvent::LogMessage { level: LogLevel::Error, message, .. } => eprintln!("✖ {message}"),
        BatchEvent::Summary(summary) => println!("✔ {}", summary.message()),
        _ => {}
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Some(target) = &cli.write_default_config {
        let path = target
            .clone()
            .or_else(ConfigManager::default_config_path)
            .ok_or_else(|| anyhow!("No user config directory, pass a path to --write-default-config"))?;
        ConfigManager::write_default(&path)?;
        println!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    init_logging_with_config(config.logging.clone())?;
    log_system_info();

    let workbook = cli
        .workbook
        .clone()
        .ok_or_else(|| anyhow!("No workbook given (see --help)"))?;

    let adapter = Arc::new(SpreadsheetAdapter::new(config.spreadsheet.clone()));
    let codes: Vec<Code> = {
        let adapter = Arc::clone(&adapter);
        let path = workbook.clone();
        tokio::task::spawn_blocking(move || adapter.load_codes(&path))
            .await
            .context("Workbook loader panicked")?
            .with_context(|| format!("Failed to read codes from {}", workbook.display()))?
    };
    if codes.is_empty() {
        warn!("⚠️ No codes found in {:?}", workbook);
        return Ok(());
    }

    let profile = Arc::new(config.site.clone());
    let engine = AutomationEngine::new(build_launcher(&config), Arc::clone(&profile), config.automation.clone());
    let orchestrator = Arc::new(BatchOrchestrator::new(engine, profile, config.batch.clone()));

    let mut events = orchestrator.events().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Console fell behind, {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let stopper = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("Ctrl-C received, stopping after the current code...");
                orchestrator.stop_processing();
            }
        })
    };

    let outcome = orchestrator.start_processing(codes).await;
    stopper.abort();

    let (results, batch_error): (Vec<ProcessingResult>, Option<anyhow::Error>) = match outcome {
        Ok(results) => (results, None),
        Err(e) => {
            error!("❌ {}", e);
            (orchestrator.results(), Some(e.into()))
        }
    };

    if !results.is_empty() {
        let report: SaveReport = {
            let adapter = Arc::clone(&adapter);
            let path = workbook.clone();
            tokio::task::spawn_blocking(move || adapter.save_results(&path, &results))
                .await
                .context("Workbook writer panicked")?
                .with_context(|| format!("Failed to save results to {}", workbook.display()))?
        };
        info!("💾 Results written to {:?}", report.output_path);
        if report.used_fallback_copy {
            println!("Original workbook was locked; results saved to {}", report.output_path.display());
        }
        if !report.stats.skipped_codes.is_empty() {
            println!("Codes without a matching row: {}", report.stats.skipped_codes.join(", "));
        }
    }

    drop(orchestrator);
    printer.abort();

    batch_error.map_or(Ok(()), Err)
}
