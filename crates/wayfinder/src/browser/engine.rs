use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::tools::ScrollDirection;

/// Opaque handle of a browser tab
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub String);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of an element resolved by `wait_for_selector`; only valid until the next
/// navigation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

/// A node of the accessibility tree as reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxNode {
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub children: Vec<AxNode>,
}

impl AxNode {
    pub fn new<R: Into<String>, N: Into<String>>(role: R, name: N) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<AxNode>) -> Self {
        self.children = children;
        self
    }
}

/// The `nth` visible element (document order) whose accessible role and name match exactly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AriaSelector {
    pub role: String,
    pub name: String,
    pub nth: usize,
}

impl fmt::Display for AriaSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.role, self.name)?;
        if self.nth > 0 {
            write!(f, " (match #{})", self.nth)?;
        }
        Ok(())
    }
}

/// Outbound interface to a browser automation engine
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Open tabs, oldest first
    async fn list_pages(&self) -> Result<Vec<PageId>>;

    async fn new_page(&self) -> Result<PageId>;

    async fn goto(&self, page: &PageId, url: &str) -> Result<()>;

    async fn title(&self, page: &PageId) -> Result<String>;

    /// The accessibility tree of the page, restricted to rendered nodes
    async fn accessibility_snapshot(&self, page: &PageId) -> Result<AxNode>;

    /// Wait until the selected element is visible
    async fn wait_for_selector(
        &self,
        page: &PageId,
        selector: &AriaSelector,
        timeout: Duration,
    ) -> Result<ElementId>;

    async fn click(&self, page: &PageId, element: &ElementId) -> Result<()>;

    async fn type_text(&self, page: &PageId, element: &ElementId, text: &str) -> Result<()>;

    async fn scroll(&self, page: &PageId, direction: ScrollDirection) -> Result<()>;
}
