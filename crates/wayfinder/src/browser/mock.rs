use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::engine::{AriaSelector, AutomationEngine, AxNode, ElementId, PageId};
use super::surface::flatten;
use crate::tools::ScrollDirection;

#[derive(Default)]
struct State {
    sites: HashMap<String, (String, AxNode)>,
    links: HashMap<(String, String), String>,
    popups: HashMap<(String, String), String>,
    // Tree shown instead of the real one for the next n reads of a url
    loading: HashMap<String, (AxNode, usize)>,
    pages: Vec<(PageId, Option<String>)>,
    actions: Vec<String>,
}

/// An in-memory browser serving canned pages, for tests
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<State>>,
    delay: Option<Duration>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `tree` with `title` at `url`
    pub fn with_page(self, url: &str, title: &str, tree: AxNode) -> Self {
        self.state
            .lock()
            .unwrap()
            .sites
            .insert(url.to_string(), (title.to_string(), tree));
        self
    }

    /// Clicking the element with this role and name navigates to `url`
    pub fn with_link(self, role: &str, name: &str, url: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .links
            .insert((role.to_string(), name.to_string()), url.to_string());
        self
    }

    /// Clicking the element with this role and name opens `url` in a new tab
    pub fn with_popup(self, role: &str, name: &str, url: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .popups
            .insert((role.to_string(), name.to_string()), url.to_string());
        self
    }

    /// The page at `url` shows `partial` for its first `reads` reads before it finishes rendering
    pub fn with_slow_render(self, url: &str, partial: AxNode, reads: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .loading
            .insert(url.to_string(), (partial, reads));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Clicks, typing and scrolling performed so far
    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    /// URL shown by each open tab
    pub fn urls(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .unwrap()
            .pages
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn site(&self, page: &PageId) -> Result<(String, AxNode)> {
        let mut state = self.state.lock().unwrap();
        let url = state
            .pages
            .iter()
            .find(|(id, _)| id == page)
            .and_then(|(_, url)| url.clone())
            .ok_or_else(|| anyhow!("Page {} has nothing loaded", page))?;
        let (title, tree) = state
            .sites
            .get(&url)
            .cloned()
            .ok_or_else(|| anyhow!("net::ERR_NAME_NOT_RESOLVED at {}", url))?;

        match state.loading.get_mut(&url) {
            Some((partial, reads)) if *reads > 0 => {
                *reads -= 1;
                Ok((title, partial.clone()))
            }
            _ => Ok((title, tree)),
        }
    }

    fn title_of(&self, page: &PageId) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .pages
            .iter()
            .find(|(id, _)| id == page)
            .and_then(|(_, url)| url.as_ref())
            .and_then(|url| state.sites.get(url))
            .map(|(title, _)| title.clone())
            .ok_or_else(|| anyhow!("Page {} has nothing loaded", page))
    }

    fn decode(element: &ElementId) -> (String, String, String) {
        let mut parts = element.0.splitn(3, '\u{1f}');
        let role = parts.next().unwrap_or_default().to_string();
        let name = parts.next().unwrap_or_default().to_string();
        let nth = parts.next().unwrap_or_default().to_string();
        (role, name, nth)
    }
}

#[async_trait]
impl AutomationEngine for MockEngine {
    async fn list_pages(&self) -> Result<Vec<PageId>> {
        self.pause().await;
        Ok(self
            .state
            .lock()
            .unwrap()
            .pages
            .iter()
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn new_page(&self) -> Result<PageId> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        let id = PageId(format!("page-{}", state.pages.len()));
        state.pages.push((id.clone(), None));
        Ok(id)
    }

    async fn goto(&self, page: &PageId, url: &str) -> Result<()> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        if !state.sites.contains_key(url) {
            return Err(anyhow!("net::ERR_NAME_NOT_RESOLVED at {}", url));
        }
        let entry = state
            .pages
            .iter_mut()
            .find(|(id, _)| id == page)
            .ok_or_else(|| anyhow!("Page {} is closed", page))?;
        entry.1 = Some(url.to_string());
        Ok(())
    }

    async fn title(&self, page: &PageId) -> Result<String> {
        self.title_of(page)
    }

    async fn accessibility_snapshot(&self, page: &PageId) -> Result<AxNode> {
        Ok(self.site(page)?.1)
    }

    async fn wait_for_selector(
        &self,
        page: &PageId,
        selector: &AriaSelector,
        _timeout: Duration,
    ) -> Result<ElementId> {
        let (_, tree) = self.site(page)?;
        let count = flatten(&tree)
            .iter()
            .filter(|e| e.role == selector.role && e.name == selector.name)
            .count();
        if selector.nth >= count {
            return Err(anyhow!("Timed out waiting for {}", selector));
        }
        Ok(ElementId(format!(
            "{}\u{1f}{}\u{1f}{}",
            selector.role, selector.name, selector.nth
        )))
    }

    async fn click(&self, page: &PageId, element: &ElementId) -> Result<()> {
        let (role, name, nth) = Self::decode(element);
        let mut state = self.state.lock().unwrap();
        state
            .actions
            .push(format!("click {} \"{}\" #{}", role, name, nth));

        let key = (role, name);
        if let Some(url) = state.popups.get(&key).cloned() {
            let id = PageId(format!("page-{}", state.pages.len()));
            state.pages.push((id, Some(url)));
        } else if let Some(url) = state.links.get(&key).cloned() {
            if let Some(entry) = state.pages.iter_mut().find(|(id, _)| id == page) {
                entry.1 = Some(url);
            }
        }
        Ok(())
    }

    async fn type_text(&self, _page: &PageId, element: &ElementId, text: &str) -> Result<()> {
        let (role, name, nth) = Self::decode(element);
        self.state
            .lock()
            .unwrap()
            .actions
            .push(format!("type \"{}\" into {} \"{}\" #{}", text, role, name, nth));
        Ok(())
    }

    async fn scroll(&self, _page: &PageId, direction: ScrollDirection) -> Result<()> {
        let label = match direction {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        };
        self.state
            .lock()
            .unwrap()
            .actions
            .push(format!("scroll {}", label));
        Ok(())
    }
}
