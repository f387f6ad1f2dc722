//! Chromium-backed surfaces (chromiumoxide / CDP)
//!
//! `ChromiumLauncher` starts its own browser and owns the page.
//! `ChromiumAttachLauncher` connects to a running browser's DevTools socket and
//! adopts an existing page, e.g. a webview the user is already looking at.

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Handler, Page};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::BrowserSettings;
use super::scripts::PageScript;
use super::surface::{Surface, SurfaceError, SurfaceLauncher, SurfaceOwnership};

/// Runs the CDP event loop; flips `closed` once the connection is gone
fn spawn_handler_task(mut handler: Handler, closed: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("chromiumoxide handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
        warn!("🔌 Browser connection closed");
    })
}

pub struct ChromiumSurface {
    id: String,
    ownership: SurfaceOwnership,
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler_task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl ChromiumSurface {
    fn new(
        page: Page,
        browser: Browser,
        handler_task: JoinHandle<()>,
        closed: Arc<AtomicBool>,
        ownership: SurfaceOwnership,
    ) -> Self {
        Self {
            id: page.target_id().inner().clone(),
            ownership,
            page,
            browser: Mutex::new(Some(browser)),
            handler_task,
            closed,
        }
    }

    fn ensure_alive(&self) -> Result<(), SurfaceError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SurfaceError::Closed)
        }
    }

    /// Maps a CDP error, treating anything after connection loss as `Closed`
    fn map_err(&self, make: fn(String) -> SurfaceError, e: impl std::fmt::Display) -> SurfaceError {
        if self.is_alive() {
            make(e.to_string())
        } else {
            SurfaceError::Closed
        }
    }

    async fn disconnect(&self) {
        self.browser.lock().await.take();
        self.handler_task.abort();
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Surface for ChromiumSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn ownership(&self) -> SurfaceOwnership {
        self.ownership
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn evaluate(&self, script: &PageScript) -> Result<serde_json::Value, SurfaceError> {
        self.ensure_alive()?;
        let result = self
            .page
            .evaluate(script.source.as_str())
            .await
            .map_err(|e| self.map_err(SurfaceError::Script, e))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        self.ensure_alive()?;
        self.page
            .goto(url)
            .await
            .map_err(|e| self.map_err(SurfaceError::Navigation, e))?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), SurfaceError> {
        self.ensure_alive()?;
        self.page
            .reload()
            .await
            .map_err(|e| self.map_err(SurfaceError::Navigation, e))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>, SurfaceError> {
        self.ensure_alive()?;
        self.page
            .url()
            .await
            .map_err(|e| self.map_err(SurfaceError::Script, e))
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        if !self.is_alive() {
            return Ok(());
        }
        info!("🧹 Closing browser surface {}", self.id);

        if let Err(e) = self.page.clone().close().await {
            debug!("Page close failed (browser may already be gone): {}", e);
        }
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Browser wait failed: {}", e);
            }
        }
        self.disconnect().await;
        Ok(())
    }

    async fn detach(&self) -> Result<(), SurfaceError> {
        info!("🔓 Detaching from surface {} (page left open)", self.id);
        self.disconnect().await;
        Ok(())
    }
}

/// Launches a dedicated browser per acquire
pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    pub const fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self) -> Result<BrowserConfig, SurfaceError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.settings.window_width, self.settings.window_height)
            .args(self.settings.args.iter().map(String::as_str));

        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }

        builder.build().map_err(SurfaceError::Launch)
    }
}

#[async_trait]
impl SurfaceLauncher for ChromiumLauncher {
    async fn acquire(&self) -> Result<Box<dyn Surface>, SurfaceError> {
        info!(
            "🚀 Launching browser (headless: {}, {}x{})",
            self.settings.headless, self.settings.window_width, self.settings.window_height
        );
        let config = self.browser_config()?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| SurfaceError::Launch(e.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(SurfaceError::Launch(format!("failed to open page: {e}")));
            }
        };
        if let Err(e) = page.set_user_agent(self.settings.user_agent.as_str()).await {
            warn!("⚠️ Failed to set user agent: {}", e);
        }

        let surface = ChromiumSurface::new(page, browser, handler_task, closed, SurfaceOwnership::Owned);
        info!("✅ Browser surface ready: {}", surface.id());
        Ok(Box::new(surface))
    }
}

/// Adopts a page of an already running browser
pub struct ChromiumAttachLauncher {
    ws_url: String,
    target_id: Option<String>,
    discovery_delay: Duration,
}

impl ChromiumAttachLauncher {
    pub fn new(ws_url: impl Into<String>, target_id: Option<String>, discovery_delay: Duration) -> Self {
        Self {
            ws_url: ws_url.into(),
            target_id,
            discovery_delay,
        }
    }
}

#[async_trait]
impl SurfaceLauncher for ChromiumAttachLauncher {
    async fn acquire(&self) -> Result<Box<dyn Surface>, SurfaceError> {
        info!("🔗 Attaching to browser at {}", self.ws_url);
        let (mut browser, handler) = Browser::connect(self.ws_url.as_str())
            .await
            .map_err(|e| SurfaceError::Launch(e.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let lookup = async {
            browser
                .fetch_targets()
                .await
                .map_err(|e| SurfaceError::TargetNotFound(e.to_string()))?;
            // Targets attach asynchronously after discovery
            tokio::time::sleep(self.discovery_delay).await;
            let pages = browser
                .pages()
                .await
                .map_err(|e| SurfaceError::TargetNotFound(e.to_string()))?;

            match &self.target_id {
                Some(wanted) => pages
                    .into_iter()
                    .find(|p| p.target_id().inner() == wanted)
                    .ok_or_else(|| SurfaceError::TargetNotFound(wanted.clone())),
                None => pages
                    .into_iter()
                    .next()
                    .ok_or_else(|| SurfaceError::TargetNotFound("browser has no open pages".to_string())),
            }
        };

        let page = match lookup.await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(e);
            }
        };

        let surface = ChromiumSurface::new(page, browser, handler_task, closed, SurfaceOwnership::Attached);
        info!("✅ Attached to surface {}", surface.id());
        Ok(Box::new(surface))
    }
}
