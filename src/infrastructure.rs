//! Infrastructure layer: browser surfaces, the automation engine, spreadsheet
//! I/O, configuration and logging.

pub mod automation_engine;
pub mod chromium_surface;
pub mod config;
pub mod logging;
pub mod scripts;
pub mod site_profile;
pub mod spreadsheet;
pub mod surface;

// Re-export commonly used items
pub use automation_engine::{AutomationEngine, EngineError, FetchStep, StepFailure};
pub use chromium_surface::{ChromiumAttachLauncher, ChromiumLauncher};
pub use config::{AppConfig, AutomationConfig, BatchConfig, BrowserSettings, ConfigError, ConfigManager, SpreadsheetConfig};
pub use logging::init_logging_with_config;
pub use scripts::{PageScript, ScriptKind};
pub use site_profile::{BadgeRule, FieldLayout, FieldSpec, LayoutSelection, SiteProfile};
pub use spreadsheet::{SaveReport, SpreadsheetAdapter, SpreadsheetError};
pub use surface::{Surface, SurfaceError, SurfaceLauncher, SurfaceOwnership};
