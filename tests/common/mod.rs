//! Scripted portal used by the integration tests
//!
//! `FakePortal` answers each page script by kind and records what the engine
//! did to it. Launchers hand out surfaces that share one portal, so a test can
//! inspect acquisitions, navigations and teardown after the fact.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nsis_checker_lib::domain::Code;
use nsis_checker_lib::infrastructure::config::{AutomationConfig, BatchConfig};
use nsis_checker_lib::infrastructure::scripts::{PageScript, ScriptKind};
use nsis_checker_lib::infrastructure::site_profile::{NSIS_URL, SiteProfile};
use nsis_checker_lib::infrastructure::surface::{Surface, SurfaceError, SurfaceLauncher, SurfaceOwnership};

pub const SURFACE_ID: &str = "fake-page-1";

#[derive(Debug)]
pub struct PortalState {
    // behaviour
    pub ownership: SurfaceOwnership,
    pub launch_error: Option<SurfaceError>,
    pub input_found: bool,
    pub submit: Value,
    pub results_ready: bool,
    pub rows: HashMap<String, Vec<String>>,
    pub default_row: Vec<String>,
    /// Surface dies on this fill (1-based)
    pub die_on_fill: Option<usize>,
    pub navigate_delay: Duration,
    pub url: String,

    // observations
    pub alive: bool,
    pub acquires: usize,
    pub closes: usize,
    pub detaches: usize,
    pub reloads: usize,
    pub navigations: Vec<String>,
    pub evaluations: HashMap<ScriptKind, usize>,
    pub filled: Vec<String>,
    current: Option<String>,
}

impl Default for PortalState {
    fn default() -> Self {
        Self {
            ownership: SurfaceOwnership::Owned,
            launch_error: None,
            input_found: true,
            submit: json!({ "action": "click", "text": "Cerca" }),
            results_ready: true,
            rows: HashMap::new(),
            default_row: v7_row("DEFAULT", "APERTA"),
            die_on_fill: None,
            navigate_delay: Duration::ZERO,
            url: "about:blank".to_string(),
            alive: false,
            acquires: 0,
            closes: 0,
            detaches: 0,
            reloads: 0,
            navigations: Vec::new(),
            evaluations: HashMap::new(),
            filled: Vec::new(),
            current: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakePortal {
    state: Mutex<PortalState>,
}

impl FakePortal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(configure: impl FnOnce(&mut PortalState)) -> Arc<Self> {
        let portal = Self::new();
        configure(&mut portal.state());
        portal
    }

    pub fn state(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap()
    }

    pub fn evaluations(&self, kind: ScriptKind) -> usize {
        self.state().evaluations.get(&kind).copied().unwrap_or(0)
    }

    pub fn kill(&self) {
        self.state().alive = false;
    }

    pub fn launcher(self: &Arc<Self>) -> Arc<dyn SurfaceLauncher> {
        Arc::new(FakeLauncher {
            portal: Arc::clone(self),
        })
    }
}

pub struct FakeLauncher {
    portal: Arc<FakePortal>,
}

#[async_trait]
impl SurfaceLauncher for FakeLauncher {
    async fn acquire(&self) -> Result<Box<dyn Surface>, SurfaceError> {
        let ownership = {
            let mut state = self.portal.state();
            state.acquires += 1;
            if let Some(error) = state.launch_error.clone() {
                return Err(error);
            }
            state.alive = true;
            if state.ownership == SurfaceOwnership::Attached && state.url == "about:blank" {
                state.url = NSIS_URL.to_string();
            }
            state.ownership
        };
        Ok(Box::new(FakeSurface {
            portal: Arc::clone(&self.portal),
            ownership,
        }))
    }
}

pub struct FakeSurface {
    portal: Arc<FakePortal>,
    ownership: SurfaceOwnership,
}

/// Pulls the code out of `const value = "...";` in the fill script
fn filled_code(source: &str) -> Option<String> {
    let start = source.find("const value = ")? + "const value = ".len();
    let end = start + source[start..].find(";\n")?;
    serde_json::from_str(&source[start..end]).ok()
}

#[async_trait]
impl Surface for FakeSurface {
    fn id(&self) -> &str {
        SURFACE_ID
    }

    fn ownership(&self) -> SurfaceOwnership {
        self.ownership
    }

    fn is_alive(&self) -> bool {
        self.portal.state().alive
    }

    async fn evaluate(&self, script: &PageScript) -> Result<Value, SurfaceError> {
        let mut state = self.portal.state();
        if !state.alive {
            return Err(SurfaceError::Closed);
        }
        *state.evaluations.entry(script.kind).or_insert(0) += 1;

        match script.kind {
            ScriptKind::InstallContainment => Ok(json!(true)),
            ScriptKind::FillInput => {
                let code = filled_code(&script.source).unwrap_or_default();
                state.filled.push(code.clone());
                if state.die_on_fill == Some(state.filled.len()) {
                    state.alive = false;
                    return Err(SurfaceError::Closed);
                }
                if !state.input_found {
                    return Ok(Value::Null);
                }
                state.current = Some(code);
                Ok(json!({ "selector": "input[type=\"text\"]" }))
            }
            ScriptKind::ScanSubmit => Ok(state.submit.clone()),
            ScriptKind::SelectorPresent => Ok(json!(state.results_ready)),
            ScriptKind::ReadRowCells => {
                let row = state
                    .current
                    .as_ref()
                    .and_then(|code| state.rows.get(code))
                    .unwrap_or(&state.default_row);
                Ok(json!(row))
            }
        }
    }

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        let delay = self.portal.state().navigate_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.portal.state();
        if !state.alive {
            return Err(SurfaceError::Closed);
        }
        state.navigations.push(url.to_string());
        state.url = url.to_string();
        Ok(())
    }

    async fn reload(&self) -> Result<(), SurfaceError> {
        let mut state = self.portal.state();
        if !state.alive {
            return Err(SurfaceError::Closed);
        }
        state.reloads += 1;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>, SurfaceError> {
        let state = self.portal.state();
        if !state.alive {
            return Err(SurfaceError::Closed);
        }
        Ok(Some(state.url.clone()))
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        let mut state = self.portal.state();
        state.closes += 1;
        state.alive = false;
        Ok(())
    }

    async fn detach(&self) -> Result<(), SurfaceError> {
        self.portal.state().detaches += 1;
        Ok(())
    }
}

/// Seven-cell result row with `state` in the status column
pub fn v7_row(code: &str, state: &str) -> Vec<String> {
    [
        "3002 90 91",
        "IN-2024-001",
        state,
        "12/03/2024",
        "OUT-2024-009",
        "NO-123",
        code,
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

pub fn codes(raw: &[&str]) -> Vec<Code> {
    Code::parse_all(raw.iter().copied())
}

pub fn fast_timing() -> AutomationConfig {
    AutomationConfig {
        max_retries: 2,
        delay_after_input_ms: 10,
        delay_after_click_ms: 10,
        delay_between_retries_ms: 20,
        results_timeout_ms: 200,
        results_poll_interval_ms: 10,
        navigation_timeout_ms: 1_000,
        attach_settle_ms: 10,
    }
}

pub fn fast_batch() -> BatchConfig {
    BatchConfig {
        inter_code_delay_ms: 20,
        event_channel_capacity: 1_000,
    }
}

pub fn profile() -> Arc<SiteProfile> {
    Arc::new(SiteProfile::nsis())
}
