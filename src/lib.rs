//! NSIS Checker - batch lookup of practice states on the NSIS portal
//!
//! Drives a browser surface through the NSIS consultation form for each code
//! in a workbook, maps the result rows to named fields, tallies status badges
//! and writes everything back to the workbook.

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

pub use application::{BatchError, BatchOrchestrator};
pub use domain::{BatchEvent, Code, FetchResult, ProcessingResult};
pub use infrastructure::{AppConfig, AutomationEngine};
