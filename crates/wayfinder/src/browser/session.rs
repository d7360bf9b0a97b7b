use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::{debug, info};

use super::engine::{AriaSelector, AutomationEngine, ElementId, PageId};
use super::surface::{flatten, locate};
use crate::errors::{AgentError, AgentResult};
use crate::models::element::ElementSnapshot;
use crate::settings::BrowserSettings;
use crate::tools::{BrowserTool, ElementTarget, ScrollDirection};

const RESOLVE_INTERVAL: Duration = Duration::from_millis(100);
// Extra time for the engine to report its own error before the action is cut off
const TIMEOUT_GRACE: Duration = Duration::from_millis(500);

/// The one live browser of the process.
///
/// Actions are serialized by an internal lock, so concurrent runs never interleave within a
/// single action. They may still interleave between actions. A session built with
/// [`BrowserSession::launch`] starts the browser on its first action.
pub struct BrowserSession {
    engine: OnceCell<Arc<dyn AutomationEngine>>,
    settings: BrowserSettings,
    lock: Mutex<()>,
    action_timeout: Duration,
}

impl BrowserSession {
    pub fn new(engine: Arc<dyn AutomationEngine>, action_timeout: Duration) -> Self {
        Self {
            engine: OnceCell::from(engine),
            settings: BrowserSettings::default(),
            lock: Mutex::new(()),
            action_timeout,
        }
    }

    pub fn launch(settings: &BrowserSettings) -> Self {
        Self {
            engine: OnceCell::new(),
            settings: settings.clone(),
            lock: Mutex::new(()),
            action_timeout: Duration::from_secs(settings.action_timeout),
        }
    }

    async fn engine(&self) -> Result<&Arc<dyn AutomationEngine>> {
        self.engine
            .get_or_try_init(|| start_engine(&self.settings))
            .await
    }

    /// Run one tool against the browser. Every failure, including a timeout, comes back as
    /// an `AgentError` for the caller to render as a tool result.
    pub async fn execute(&self, tool: &BrowserTool) -> AgentResult<String> {
        let _guard = self.lock.lock().await;
        debug!(tool = tool.name(), "executing browser action");

        let deadline = Instant::now() + self.action_timeout;
        let action = self.perform(tool, deadline);
        match tokio::time::timeout_at(deadline + TIMEOUT_GRACE, action).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(AgentError::ExecutionError(e.to_string())),
            Err(_) => Err(AgentError::ExecutionError(format!(
                "{} timed out after {}s",
                tool.name(),
                self.action_timeout.as_secs()
            ))),
        }
    }

    async fn perform(&self, tool: &BrowserTool, deadline: Instant) -> Result<String> {
        // Answering needs no browser
        if let BrowserTool::FinalAnswer { text } = tool {
            return Ok(text.clone());
        }
        let engine = self.engine().await?.as_ref();

        match tool {
            BrowserTool::OpenSession { url } => {
                let page = engine.new_page().await?;
                engine.goto(&page, url).await?;
                info!(%url, %page, "opened browser window");
                Ok(format!(
                    "Opened a new browser window on {}. Call read_surface to see the page.",
                    url
                ))
            }
            BrowserTool::LoadPage { url } => {
                let page = match current_page(engine).await {
                    Ok(page) => page,
                    Err(_) => engine.new_page().await?,
                };
                engine.goto(&page, url).await?;
                Ok(format!(
                    "Webpage {} loaded successfully. Call read_surface to see its elements.",
                    url
                ))
            }
            BrowserTool::ReadSurface => {
                let page = current_page(engine).await?;
                let snapshot = snapshot(engine, &page).await?;
                debug!(elements = snapshot.elements.len(), "read page surface");
                Ok(serde_json::to_string(&snapshot)?)
            }
            BrowserTool::Click(target) => {
                let (page, element) = self.resolve(engine, target, deadline).await?;
                engine.click(&page, &element).await?;
                Ok(format!("Clicked {} \"{}\".", target.role, target.name))
            }
            BrowserTool::Type { target, text } => {
                let (page, element) = self.resolve(engine, target, deadline).await?;
                engine.type_text(&page, &element, text).await?;
                Ok(format!(
                    "Typed \"{}\" into {} \"{}\".",
                    text, target.role, target.name
                ))
            }
            BrowserTool::Scroll { direction } => {
                let page = current_page(engine).await?;
                engine.scroll(&page, *direction).await?;
                let label = match direction {
                    ScrollDirection::Up => "up",
                    ScrollDirection::Down => "down",
                };
                Ok(format!("Scrolled {}.", label))
            }
            BrowserTool::FinalAnswer { text } => Ok(text.clone()),
        }
    }

    /// Find the target on the current page, waiting for it to render until `deadline`
    async fn resolve(
        &self,
        engine: &dyn AutomationEngine,
        target: &ElementTarget,
        deadline: Instant,
    ) -> Result<(PageId, ElementId)> {
        loop {
            let page = current_page(engine).await?;
            let tree = engine.accessibility_snapshot(&page).await?;

            match locate(&flatten(&tree), target) {
                Ok(nth) => {
                    let selector = AriaSelector {
                        role: target.role.clone(),
                        name: target.name.clone(),
                        nth,
                    };
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let element = engine.wait_for_selector(&page, &selector, remaining).await?;
                    return Ok((page, element));
                }
                Err(e) if Instant::now() + RESOLVE_INTERVAL >= deadline => {
                    return Err(anyhow!("{}. Call read_surface to refresh the page state.", e));
                }
                Err(e) => {
                    debug!(error = %e, "target not rendered yet");
                    tokio::time::sleep(RESOLVE_INTERVAL).await;
                }
            }
        }
    }
}

#[cfg(feature = "chromium")]
async fn start_engine(settings: &BrowserSettings) -> Result<Arc<dyn AutomationEngine>> {
    let engine = super::chromium::ChromiumEngine::launch(settings.headless).await?;
    info!(headless = settings.headless, "launched browser");
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "chromium"))]
async fn start_engine(_settings: &BrowserSettings) -> Result<Arc<dyn AutomationEngine>> {
    Err(anyhow!(
        "Browser support is not compiled in. Rebuild with `--features chromium` to drive a local Chrome."
    ))
}

/// The most recently opened tab
async fn current_page(engine: &dyn AutomationEngine) -> Result<PageId> {
    engine
        .list_pages()
        .await?
        .pop()
        .ok_or_else(|| anyhow!("No browser window is open. Call open_session first."))
}

async fn snapshot(engine: &dyn AutomationEngine, page: &PageId) -> Result<ElementSnapshot> {
    let title = engine.title(page).await?;
    let tree = engine.accessibility_snapshot(page).await?;
    Ok(ElementSnapshot::new(title, flatten(&tree)))
}
