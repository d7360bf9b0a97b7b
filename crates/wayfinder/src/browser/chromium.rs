use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::engine::{AriaSelector, AutomationEngine, AxNode, ElementId, PageId};
use crate::tools::ScrollDirection;

const TARGET_ATTRIBUTE: &str = "data-wayfinder-target";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

// Role and name computation shared by the snapshot and the selector scripts, so that both
// count elements the same way.
const PRELUDE: &str = r#"
const wfClean = (s) => (s || '').replace(/\s+/g, ' ').trim().slice(0, 120);
const wfRole = (el) => {
  const explicit = el.getAttribute('role');
  if (explicit) return explicit.trim().split(' ')[0];
  const tag = el.tagName.toLowerCase();
  switch (tag) {
    case 'a': return el.hasAttribute('href') ? 'link' : '';
    case 'button': return 'button';
    case 'select': return (el.multiple || el.size > 1) ? 'listbox' : 'combobox';
    case 'textarea': return 'textbox';
    case 'option': return 'option';
    case 'nav': return 'navigation';
    case 'main': return 'main';
    case 'header': return 'banner';
    case 'footer': return 'contentinfo';
    case 'aside': return 'complementary';
    case 'form': return 'form';
    case 'dialog': return 'dialog';
    case 'section': return 'region';
    case 'article': return 'article';
    case 'li': return 'listitem';
    case 'h1': case 'h2': case 'h3': case 'h4': case 'h5': case 'h6': return 'heading';
    case 'input': {
      const type = (el.getAttribute('type') || 'text').toLowerCase();
      if (type === 'hidden') return '';
      if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
      if (type === 'checkbox') return 'checkbox';
      if (type === 'radio') return 'radio';
      if (type === 'range') return 'slider';
      if (type === 'number') return 'spinbutton';
      if (el.hasAttribute('list')) return 'combobox';
      return type === 'search' ? 'searchbox' : 'textbox';
    }
    default: return '';
  }
};
const wfName = (el) => {
  const label = el.getAttribute('aria-label');
  if (label && wfClean(label)) return wfClean(label);
  const labelledBy = el.getAttribute('aria-labelledby');
  if (labelledBy) {
    const text = labelledBy.split(/\s+/).map((id) => document.getElementById(id))
      .filter(Boolean).map((n) => n.textContent).join(' ');
    if (wfClean(text)) return wfClean(text);
  }
  const tag = el.tagName.toLowerCase();
  if (el.labels && el.labels.length) {
    return wfClean(Array.from(el.labels).map((l) => l.textContent).join(' '));
  }
  if (tag === 'input') {
    const type = (el.type || '').toLowerCase();
    if (type === 'submit') return wfClean(el.value || 'Submit');
    if (type === 'reset') return wfClean(el.value || 'Reset');
    if (type === 'button') return wfClean(el.value);
    if (type === 'image') return wfClean(el.alt);
    return wfClean(el.getAttribute('placeholder') || el.getAttribute('title'));
  }
  if (tag === 'textarea' || tag === 'select') {
    return wfClean(el.getAttribute('placeholder') || el.getAttribute('title'));
  }
  if (['article', 'section', 'form', 'dialog'].includes(tag)) {
    const heading = el.querySelector('h1, h2, h3, h4, h5, h6');
    return heading ? wfClean(heading.textContent) : '';
  }
  if (['nav', 'main', 'header', 'footer', 'aside', 'li'].includes(tag)) return '';
  return wfClean(el.innerText || el.textContent || el.getAttribute('title'));
};
const wfVisible = (el) => {
  const style = getComputedStyle(el);
  if (style.display === 'none' || style.visibility === 'hidden') return false;
  const rect = el.getBoundingClientRect();
  return rect.width > 0 && rect.height > 0;
};
"#;

const SNAPSHOT_SCRIPT: &str = r#"
const wfWalk = (el, out) => {
  for (const child of el.children) {
    if (getComputedStyle(child).display === 'none') continue;
    const role = wfRole(child);
    if (role && wfVisible(child)) {
      const node = { role, name: wfName(child), children: [] };
      out.push(node);
      wfWalk(child, node.children);
    } else {
      wfWalk(child, out);
    }
  }
};
const root = { role: 'RootWebArea', name: document.title, children: [] };
if (document.body) wfWalk(document.body, root.children);
return root;
"#;

const MARK_SCRIPT: &str = r#"
document.querySelectorAll('[__ATTR__]').forEach((e) => e.removeAttribute('__ATTR__'));
const matches = Array.from(document.querySelectorAll('*'))
  .filter((el) => wfVisible(el) && wfRole(el) === __ROLE__ && wfName(el) === __NAME__);
const el = matches[__NTH__];
if (!el) return false;
el.setAttribute('__ATTR__', __TOKEN__);
el.scrollIntoView({ block: 'center' });
return true;
"#;

fn wrap(body: &str) -> String {
    ["(() => {", PRELUDE, body, "})()"].concat()
}

/// A locally launched Chrome driven over the devtools protocol
pub struct ChromiumEngine {
    browser: Mutex<Browser>,
    pages: Mutex<Vec<(PageId, Page)>>,
    next_id: AtomicUsize,
    _handler: JoinHandle<()>,
}

impl ChromiumEngine {
    pub async fn launch(headless: bool) -> Result<Self> {
        info!(headless, "launching chromium");

        let builder = BrowserConfig::builder().no_sandbox().viewport(None);
        let builder = if headless {
            builder
        } else {
            builder.with_head().arg("--start-maximized")
        };
        let config = builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        // The handler drives the websocket connection and must be polled for the whole
        // lifetime of the browser
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("chromium handler event loop ended");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            pages: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            _handler: handler,
        })
    }

    async fn page(&self, id: &PageId) -> Result<Page> {
        self.pages
            .lock()
            .await
            .iter()
            .find(|(page_id, _)| page_id == id)
            .map(|(_, page)| page.clone())
            .ok_or_else(|| anyhow!("Tab {} is no longer open", id))
    }

    fn register(&self, pages: &mut Vec<(PageId, Page)>, page: Page) -> PageId {
        let id = PageId(format!("tab-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        pages.push((id.clone(), page));
        id
    }

    /// Bring the tab list in line with the targets the browser reports. Tabs opened by the
    /// page itself are appended as the newest, closed ones are dropped.
    async fn sync_pages(&self) -> Result<Vec<PageId>> {
        let live = self
            .browser
            .lock()
            .await
            .pages()
            .await
            .context("Failed to list browser tabs")?;

        let mut pages = self.pages.lock().await;
        pages.retain(|(_, known)| live.iter().any(|p| p.target_id() == known.target_id()));
        for page in live {
            let seen = pages
                .iter()
                .any(|(_, known)| known.target_id() == page.target_id());
            if !seen {
                let id = self.register(&mut pages, page);
                debug!(%id, "picked up a tab opened by the page");
            }
        }

        Ok(pages.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(page: &Page, script: String) -> Result<T> {
        page.evaluate(script)
            .await
            .context("Script evaluation failed")?
            .into_value::<T>()
            .context("Unexpected script result")
    }
}

#[async_trait]
impl AutomationEngine for ChromiumEngine {
    async fn list_pages(&self) -> Result<Vec<PageId>> {
        self.sync_pages().await
    }

    async fn new_page(&self) -> Result<PageId> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("Failed to open a new tab")?;
        let mut pages = self.pages.lock().await;
        Ok(self.register(&mut pages, page))
    }

    async fn goto(&self, page: &PageId, url: &str) -> Result<()> {
        let page = self.page(page).await?;
        page.goto(url)
            .await
            .with_context(|| format!("Navigation to {} failed", url))?;
        Ok(())
    }

    async fn title(&self, page: &PageId) -> Result<String> {
        let page = self.page(page).await?;
        Ok(page.get_title().await?.unwrap_or_default())
    }

    async fn accessibility_snapshot(&self, page: &PageId) -> Result<AxNode> {
        let page = self.page(page).await?;
        Self::evaluate(&page, wrap(SNAPSHOT_SCRIPT)).await
    }

    async fn wait_for_selector(
        &self,
        page: &PageId,
        selector: &AriaSelector,
        timeout: Duration,
    ) -> Result<ElementId> {
        let page = self.page(page).await?;
        let token = uuid::Uuid::new_v4().to_string();
        let script = wrap(
            &MARK_SCRIPT
                .replace("__ATTR__", TARGET_ATTRIBUTE)
                .replace("__ROLE__", &serde_json::to_string(&selector.role)?)
                .replace("__NAME__", &serde_json::to_string(&selector.name)?)
                .replace("__NTH__", &selector.nth.to_string())
                .replace("__TOKEN__", &serde_json::to_string(&token)?),
        );

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if Self::evaluate::<bool>(&page, script.clone()).await? {
                return Ok(ElementId(token));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow!("Timed out waiting for visible {}", selector));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&self, page: &PageId, element: &ElementId) -> Result<()> {
        let page = self.page(page).await?;
        page.find_element(format!("[{}=\"{}\"]", TARGET_ATTRIBUTE, element.0))
            .await
            .context("Element disappeared before it could be clicked")?
            .click()
            .await
            .context("Click failed")?;
        Ok(())
    }

    async fn type_text(&self, page: &PageId, element: &ElementId, text: &str) -> Result<()> {
        let page = self.page(page).await?;
        page.find_element(format!("[{}=\"{}\"]", TARGET_ATTRIBUTE, element.0))
            .await
            .context("Element disappeared before text could be typed")?
            .type_str(text)
            .await
            .context("Typing failed")?;
        Ok(())
    }

    async fn scroll(&self, page: &PageId, direction: ScrollDirection) -> Result<()> {
        let page = self.page(page).await?;
        let sign = match direction {
            ScrollDirection::Up => "-",
            ScrollDirection::Down => "",
        };
        page.evaluate(format!("window.scrollBy(0, {}window.innerHeight)", sign))
            .await
            .context("Scrolling failed")?;
        Ok(())
    }
}
