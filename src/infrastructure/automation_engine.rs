//! Automation engine
//!
//! Owns the single browsing surface and runs the per-code fetch cycle:
//!
//! ```text
//! INPUT ──► SUBMIT ──► WAIT ──► EXTRACT ──► done
//!   │         │          │         │
//!   └─────────┴──────────┴─────────┴──► retry (fixed backoff, at most max_retries more)
//! ```
//!
//! Every step failure is a [`StepFailure`] and gets the same treatment: the
//! attempt is forfeited. Only a lost surface escapes as an [`EngineError`].

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::domain::{Code, FetchResult};

use super::config::AutomationConfig;
use super::scripts::{self, PageScript};
use super::site_profile::{SiteProfile, UNKNOWN_STATE};
use super::surface::{Surface, SurfaceError, SurfaceLauncher, SurfaceOwnership};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Surface initialization failed: {0}")]
    Initialization(#[source] SurfaceError),

    #[error("Initial navigation to {url} timed out after {timeout_ms} ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("Surface lost: {0}")]
    SurfaceLost(#[source] SurfaceError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

impl EngineError {
    /// Fatal errors abort the whole batch
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Initialization(_) | Self::NavigationTimeout { .. } | Self::SurfaceLost(_) => true,
            Self::Surface(e) => e.is_fatal(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    Input,
    Submit,
    Wait,
    Extract,
}

impl fmt::Display for FetchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "INPUT"),
            Self::Submit => write!(f, "SUBMIT"),
            Self::Wait => write!(f, "WAIT"),
            Self::Extract => write!(f, "EXTRACT"),
        }
    }
}

/// Non-fatal reason an attempt was forfeited
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    #[error("input field not found (tried {tried} selectors)")]
    InputNotFound { tried: usize },

    #[error("submit control not found")]
    SubmitNotFound,

    #[error("no results after {timeout_ms} ms")]
    ResultsTimeout { timeout_ms: u64 },

    #[error("results row has no cells")]
    EmptyRow,

    #[error("{step} step failed: {message}")]
    Script { step: FetchStep, message: String },
}

impl StepFailure {
    pub const fn step(&self) -> FetchStep {
        match self {
            Self::InputNotFound { .. } => FetchStep::Input,
            Self::SubmitNotFound => FetchStep::Submit,
            Self::ResultsTimeout { .. } => FetchStep::Wait,
            Self::EmptyRow => FetchStep::Extract,
            Self::Script { step, .. } => *step,
        }
    }
}

enum StepError {
    Retry(StepFailure),
    Fatal(SurfaceError),
}

impl From<StepFailure> for StepError {
    fn from(failure: StepFailure) -> Self {
        Self::Retry(failure)
    }
}

type StepResult<T> = Result<T, StepError>;

/// Sorts a surface error raised inside a step into retry or abort
fn step_error(surface: &dyn Surface, step: FetchStep, error: SurfaceError) -> StepError {
    if error.is_fatal() || !surface.is_alive() {
        StepError::Fatal(error)
    } else {
        StepError::Retry(StepFailure::Script {
            step,
            message: error.to_string(),
        })
    }
}

/// What the submit scan found
#[derive(Debug, Clone, PartialEq, Eq)]
enum SubmitAction {
    Clicked { text: String },
    Navigate { href: String, text: String },
}

impl SubmitAction {
    fn from_value(value: &serde_json::Value) -> Option<Self> {
        let text = value.get("text").and_then(|t| t.as_str()).unwrap_or_default().to_string();
        match value.get("action").and_then(|a| a.as_str()) {
            Some("click") => Some(Self::Clicked { text }),
            Some("navigate") => value
                .get("href")
                .and_then(|h| h.as_str())
                .map(|href| Self::Navigate {
                    href: href.to_string(),
                    text,
                }),
            _ => None,
        }
    }
}

/// Resolves a possibly relative href against the page URL
fn resolve_href(base: Option<&str>, href: &str) -> Result<String, url::ParseError> {
    match base.and_then(|b| url::Url::parse(b).ok()) {
        Some(base) => base.join(href).map(String::from),
        None => url::Url::parse(href).map(String::from),
    }
}

pub struct AutomationEngine {
    launcher: Arc<dyn SurfaceLauncher>,
    profile: Arc<SiteProfile>,
    timing: AutomationConfig,
    surface: Option<Box<dyn Surface>>,
}

impl AutomationEngine {
    pub fn new(launcher: Arc<dyn SurfaceLauncher>, profile: Arc<SiteProfile>, timing: AutomationConfig) -> Self {
        Self {
            launcher,
            profile,
            timing,
            surface: None,
        }
    }

    /// No side effects
    pub fn is_ready(&self) -> bool {
        self.surface.as_ref().is_some_and(|s| s.is_alive())
    }

    pub fn surface_id(&self) -> Option<&str> {
        self.surface.as_deref().map(|s| s.id())
    }

    /// Acquires the surface, brings it to the portal and installs containment.
    ///
    /// A second call while a live surface is held does nothing. On failure the
    /// freshly acquired surface is released before the error is returned.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        match self.surface.as_deref().map(|s| (s.is_alive(), s.id().to_string())) {
            Some((true, id)) => {
                debug!("Engine already initialized on surface {}", id);
                return Ok(());
            }
            Some((false, id)) => {
                warn!("⚠️ Held surface {} is dead, acquiring a new one", id);
                self.cleanup().await;
            }
            None => {}
        }

        info!("🔧 Initializing automation engine");
        let surface = self
            .launcher
            .acquire()
            .await
            .map_err(EngineError::Initialization)?;

        if let Err(e) = self.prepare(surface.as_ref()).await {
            error!("❌ Engine initialization failed: {}", e);
            release(surface.as_ref()).await;
            return Err(e);
        }

        info!("✅ Automation engine ready on surface {} ({:?})", surface.id(), surface.ownership());
        self.surface = Some(surface);
        Ok(())
    }

    async fn prepare(&self, surface: &dyn Surface) -> Result<(), EngineError> {
        match surface.ownership() {
            SurfaceOwnership::Owned => {
                let url = &self.profile.target_url;
                info!("🌐 Navigating to {}", url);
                match timeout(self.timing.navigation_timeout(), surface.navigate(url)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(EngineError::NavigationTimeout {
                            url: url.clone(),
                            timeout_ms: self.timing.navigation_timeout_ms,
                        });
                    }
                }
            }
            SurfaceOwnership::Attached => {
                sleep(self.timing.attach_settle()).await;
                let current = surface.current_url().await?;
                info!("📎 Adopting attached surface at {}", current.as_deref().unwrap_or("<unknown>"));
            }
        }

        self.install_containment(surface).await?;
        Ok(())
    }

    async fn install_containment(&self, surface: &dyn Surface) -> Result<(), SurfaceError> {
        surface.evaluate(&scripts::install_containment()).await?;
        debug!("Navigation containment installed");
        Ok(())
    }

    /// Runs up to `max_retries + 1` attempts of the fetch cycle for one code.
    ///
    /// Step failures are folded into a failed `FetchResult`; only surface loss
    /// is returned as an error.
    pub async fn fetch_state_for_code(&self, code: &Code) -> Result<FetchResult, EngineError> {
        let Some(surface) = self.surface.as_deref() else {
            warn!("Fetch requested for {} before initialization", code);
            return Ok(FetchResult::failed(code.clone(), "Surface not initialized", 0));
        };

        let max_attempts = self.timing.max_attempts();
        let mut last_failure: Option<StepFailure> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                sleep(self.timing.delay_between_retries()).await;
            }
            if !surface.is_alive() {
                return Err(EngineError::SurfaceLost(SurfaceError::Closed));
            }

            debug!("🔍 Code {} attempt {}/{}", code, attempt, max_attempts);
            match self.run_attempt(surface, code).await {
                Ok(cells) => {
                    let state = cells
                        .get(self.profile.state_index)
                        .filter(|s| !s.is_empty())
                        .cloned()
                        .unwrap_or_else(|| UNKNOWN_STATE.to_string());
                    if attempt > 1 {
                        info!("Code {} succeeded on attempt {}", code, attempt);
                    }
                    return Ok(FetchResult::succeeded(code.clone(), state, cells, attempt));
                }
                Err(StepError::Retry(failure)) => {
                    warn!(
                        "⚠️ Code {} attempt {}/{} failed at {}: {}",
                        code,
                        attempt,
                        max_attempts,
                        failure.step(),
                        failure
                    );
                    last_failure = Some(failure);
                }
                Err(StepError::Fatal(e)) => {
                    error!("❌ Surface lost while processing {}: {}", code, e);
                    return Err(EngineError::SurfaceLost(e));
                }
            }
        }

        let reason = last_failure.map_or_else(|| "no attempt made".to_string(), |f| f.to_string());
        Ok(FetchResult::failed(
            code.clone(),
            format!("Failed after {max_attempts} attempts: {reason}"),
            max_attempts,
        ))
    }

    async fn run_attempt(&self, surface: &dyn Surface, code: &Code) -> StepResult<Vec<String>> {
        self.step_input(surface, code).await?;
        sleep(self.timing.delay_after_input()).await;

        self.step_submit(surface).await?;
        sleep(self.timing.delay_after_click()).await;

        self.step_wait(surface).await?;
        self.step_extract(surface).await
    }

    async fn eval(&self, surface: &dyn Surface, step: FetchStep, script: &PageScript) -> StepResult<serde_json::Value> {
        surface
            .evaluate(script)
            .await
            .map_err(|e| step_error(surface, step, e))
    }

    async fn step_input(&self, surface: &dyn Surface, code: &Code) -> StepResult<()> {
        let selectors = &self.profile.input_selectors;
        let script = scripts::fill_input(selectors, code.as_str());
        let value = self.eval(surface, FetchStep::Input, &script).await?;

        match value.get("selector").and_then(|s| s.as_str()) {
            Some(selector) => {
                debug!("Filled {} into {}", code, selector);
                Ok(())
            }
            None => Err(StepFailure::InputNotFound {
                tried: selectors.len(),
            }
            .into()),
        }
    }

    async fn step_submit(&self, surface: &dyn Surface) -> StepResult<()> {
        let script = scripts::scan_submit(
            &self.profile.control_selector,
            &self.profile.anchor_selector,
            &self.profile.submit_keywords,
        );
        let value = self.eval(surface, FetchStep::Submit, &script).await?;

        match SubmitAction::from_value(&value) {
            Some(SubmitAction::Clicked { text }) => {
                debug!("Clicked submit control '{}'", text);
                Ok(())
            }
            Some(SubmitAction::Navigate { href, text }) => {
                let base = surface
                    .current_url()
                    .await
                    .map_err(|e| step_error(surface, FetchStep::Submit, e))?;
                let target = resolve_href(base.as_deref(), &href).map_err(|e| StepFailure::Script {
                    step: FetchStep::Submit,
                    message: format!("unusable href '{href}': {e}"),
                })?;
                debug!("Submit link '{}' navigates to {}", text, target);

                surface
                    .navigate(&target)
                    .await
                    .map_err(|e| step_error(surface, FetchStep::Submit, e))?;
                self.install_containment(surface)
                    .await
                    .map_err(|e| step_error(surface, FetchStep::Submit, e))?;
                Ok(())
            }
            None => Err(StepFailure::SubmitNotFound.into()),
        }
    }

    async fn step_wait(&self, surface: &dyn Surface) -> StepResult<()> {
        let script = scripts::selector_present(&self.profile.results_row_selector);
        let deadline = Instant::now() + self.timing.results_timeout();

        loop {
            let value = self.eval(surface, FetchStep::Wait, &script).await?;
            if value.as_bool() == Some(true) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(StepFailure::ResultsTimeout {
                    timeout_ms: self.timing.results_timeout_ms,
                }
                .into());
            }
            sleep(self.timing.results_poll_interval()).await;
        }
    }

    async fn step_extract(&self, surface: &dyn Surface) -> StepResult<Vec<String>> {
        let script = scripts::read_row_cells(&self.profile.results_row_selector);
        let value = self.eval(surface, FetchStep::Extract, &script).await?;

        let cells: Vec<String> = serde_json::from_value(value).map_err(|e| StepFailure::Script {
            step: FetchStep::Extract,
            message: format!("cells are not a string array: {e}"),
        })?;

        if cells.is_empty() {
            return Err(StepFailure::EmptyRow.into());
        }
        debug!("Extracted {} cells", cells.len());
        Ok(cells)
    }

    /// Best effort: back to the portal home (owned) or a plain reload (attached)
    pub async fn reload_page(&self) {
        let Some(surface) = self.surface.as_deref() else {
            debug!("reload_page: no surface");
            return;
        };

        let reloaded = match surface.ownership() {
            SurfaceOwnership::Owned => surface.navigate(&self.profile.target_url).await,
            SurfaceOwnership::Attached => surface.reload().await,
        };
        if let Err(e) = reloaded {
            warn!("⚠️ Page reload failed: {}", e);
            return;
        }
        if let Err(e) = self.install_containment(surface).await {
            warn!("⚠️ Containment reinstall after reload failed: {}", e);
        }
    }

    /// Releases the surface; safe to call repeatedly
    pub async fn cleanup(&mut self) {
        if let Some(surface) = self.surface.take() {
            release(surface.as_ref()).await;
            info!("🧹 Automation engine cleaned up");
        }
    }
}

/// Closes owned surfaces and detaches from attached ones, logging failures
async fn release(surface: &dyn Surface) {
    let result = match surface.ownership() {
        SurfaceOwnership::Owned => surface.close().await,
        SurfaceOwnership::Attached => surface.detach().await,
    };
    if let Err(e) = result {
        warn!("⚠️ Failed to release surface {}: {}", surface.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submit_action_parsing() {
        assert_eq!(
            SubmitAction::from_value(&json!({"action": "click", "text": "Cerca"})),
            Some(SubmitAction::Clicked { text: "Cerca".into() })
        );
        assert_eq!(
            SubmitAction::from_value(&json!({"action": "navigate", "href": "/r?x=1", "text": "Invia"})),
            Some(SubmitAction::Navigate {
                href: "/r?x=1".into(),
                text: "Invia".into()
            })
        );
        assert_eq!(SubmitAction::from_value(&json!({"action": "navigate"})), None);
        assert_eq!(SubmitAction::from_value(&serde_json::Value::Null), None);
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(
            resolve_href(Some("https://www.impresa.gov.it/intro/info/news.html"), "/nsis/cerca?c=1").unwrap(),
            "https://www.impresa.gov.it/nsis/cerca?c=1"
        );
        assert_eq!(
            resolve_href(None, "https://example.org/a").unwrap(),
            "https://example.org/a"
        );
        assert!(resolve_href(None, "relative/only").is_err());
    }

    #[test]
    fn test_step_failure_reports_its_step() {
        assert_eq!(StepFailure::InputNotFound { tried: 4 }.step(), FetchStep::Input);
        assert_eq!(StepFailure::ResultsTimeout { timeout_ms: 1 }.step(), FetchStep::Wait);
        assert_eq!(
            StepFailure::Script {
                step: FetchStep::Submit,
                message: "x".into()
            }
            .to_string(),
            "SUBMIT step failed: x"
        );
    }

    #[test]
    fn test_engine_error_fatality() {
        assert!(EngineError::SurfaceLost(SurfaceError::Closed).is_fatal());
        assert!(!EngineError::Surface(SurfaceError::Script("x".into())).is_fatal());
        assert!(
            EngineError::NavigationTimeout {
                url: "u".into(),
                timeout_ms: 1
            }
            .is_fatal()
        );
    }
}
