use serde::{Deserialize, Serialize};

/// One interactive element on the page, addressed by its accessible role and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub role: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    /// Position among siblings sharing role, name and parent; only set when that is ambiguous
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl Element {
    pub fn new<R: Into<String>, N: Into<String>>(role: R, name: N) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            parent_role: None,
            parent_name: None,
            index: None,
        }
    }

    pub fn with_parent<R: Into<String>, N: Into<String>>(mut self, role: R, name: N) -> Self {
        self.parent_role = Some(role.into());
        self.parent_name = Some(name.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// What `read_surface` returns: the page title plus its interactive elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub page_title: String,
    pub elements: Vec<Element>,
}

impl ElementSnapshot {
    pub fn new<T: Into<String>>(page_title: T, elements: Vec<Element>) -> Self {
        Self {
            page_title: page_title.into(),
            elements,
        }
    }

    /// Parse the tool output of a previous `read_surface` call
    pub fn from_json(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
