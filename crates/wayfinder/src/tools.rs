//! The fixed set of browser tools offered to the model.
//!
//! Each tool is declared once with its JSON schema. The same schema is sent to the model
//! and used to validate whatever arguments come back before they are turned into a typed
//! [`BrowserTool`].
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

pub const OPEN_SESSION: &str = "open_session";
pub const LOAD_PAGE: &str = "load_page";
pub const READ_SURFACE: &str = "read_surface";
pub const CLICK: &str = "click";
pub const TYPE_TEXT: &str = "type_text";
pub const SCROLL: &str = "scroll";
pub const FINAL_ANSWER: &str = "final_answer";

/// How the model addresses an element from the last `read_surface` output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementTarget {
    pub role: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ElementTarget {
    pub fn new<R: Into<String>, N: Into<String>>(role: R, name: N) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            parent_role: None,
            parent_name: None,
            index: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrowserTool {
    OpenSession { url: String },
    LoadPage { url: String },
    ReadSurface,
    Click(ElementTarget),
    Type { target: ElementTarget, text: String },
    Scroll { direction: ScrollDirection },
    FinalAnswer { text: String },
}

impl BrowserTool {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserTool::OpenSession { .. } => OPEN_SESSION,
            BrowserTool::LoadPage { .. } => LOAD_PAGE,
            BrowserTool::ReadSurface => READ_SURFACE,
            BrowserTool::Click(_) => CLICK,
            BrowserTool::Type { .. } => TYPE_TEXT,
            BrowserTool::Scroll { .. } => SCROLL,
            BrowserTool::FinalAnswer { .. } => FINAL_ANSWER,
        }
    }
}

#[derive(Deserialize)]
struct UrlArgs {
    url: String,
}

#[derive(Deserialize)]
struct TypeArgs {
    #[serde(flatten)]
    target: ElementTarget,
    text: String,
}

#[derive(Deserialize)]
struct ScrollArgs {
    #[serde(default)]
    direction: ScrollDirection,
}

#[derive(Deserialize)]
struct FinalAnswerArgs {
    text: String,
}

fn target_properties() -> serde_json::Map<String, Value> {
    let properties = json!({
        "role": {
            "type": "string",
            "description": "The exact accessible role reported by read_surface, e.g. 'button' or 'link'."
        },
        "name": {
            "type": "string",
            "description": "The exact accessible name reported by read_surface. Do not shorten it."
        },
        "parentRole": {
            "type": "string",
            "description": "Role of the parent reported by read_surface, used to tell duplicates apart."
        },
        "parentName": {
            "type": "string",
            "description": "Name of the parent reported by read_surface, used to tell duplicates apart."
        },
        "index": {
            "type": "integer",
            "minimum": 0,
            "description": "Index reported by read_surface. Only use it when no parent is reported."
        }
    });
    match properties {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        let open_session = Tool::new(
            OPEN_SESSION,
            "Open a new visible browser window on the given URL. Call this first.",
            json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {"type": "string", "description": "URL to open"}
                }
            }),
        );

        let load_page = Tool::new(
            LOAD_PAGE,
            "Direct the current browser tab to load a webpage.",
            json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {"type": "string", "description": "URL of the website to load"}
                }
            }),
        );

        let read_surface = Tool::new(
            READ_SURFACE,
            "Return the page title and the interactive elements (role and name) of the current tab. \
            Call it after every navigation or interaction.",
            json!({
                "type": "object",
                "properties": {}
            }),
        );

        let click = Tool::new(
            CLICK,
            "Click the element with the given role and name on the current page.",
            json!({
                "type": "object",
                "required": ["role", "name"],
                "properties": target_properties(),
            }),
        );

        let mut type_properties = target_properties();
        type_properties.insert(
            "text".to_string(),
            json!({"type": "string", "description": "The text to type"}),
        );
        let type_text = Tool::new(
            TYPE_TEXT,
            "Type text into the element with the given role and name. Click the element first to focus it.",
            json!({
                "type": "object",
                "required": ["role", "name", "text"],
                "properties": type_properties,
            }),
        );

        let scroll = Tool::new(
            SCROLL,
            "Scroll the current page by one screen.",
            json!({
                "type": "object",
                "properties": {
                    "direction": {
                        "type": "string",
                        "enum": ["up", "down"],
                        "default": "down",
                        "description": "Direction to scroll in"
                    }
                }
            }),
        );

        let final_answer = Tool::new(
            FINAL_ANSWER,
            "Always use this tool to give the final answer to the user.",
            json!({
                "type": "object",
                "required": ["text"],
                "properties": {
                    "text": {"type": "string", "description": "The final response to the user"}
                }
            }),
        );

        Self {
            tools: vec![
                open_session,
                load_page,
                read_surface,
                click,
                type_text,
                scroll,
                final_answer,
            ],
        }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Validate a model-supplied call against the tool's schema and decode it
    pub fn parse(&self, call: &ToolCall) -> AgentResult<BrowserTool> {
        let tool = self.get(&call.name).ok_or_else(|| AgentError::ToolNotFound {
            name: call.name.clone(),
            available: self.names().join(", "),
        })?;

        // Some models send `null` for tools without arguments
        let arguments = match &call.arguments {
            Value::Null => json!({}),
            other => other.clone(),
        };

        let validator = jsonschema::validator_for(&tool.input_schema)
            .map_err(|e| AgentError::Internal(format!("Invalid schema for {}: {}", tool.name, e)))?;
        let violations: Vec<String> = validator
            .iter_errors(&arguments)
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{} at {}", error, path)
                }
            })
            .collect();
        if !violations.is_empty() {
            debug!(tool = %call.name, ?violations, "rejected tool arguments");
            return Err(AgentError::InvalidParameters(format!(
                "Arguments for {} do not match its schema: {}",
                call.name,
                violations.join("; ")
            )));
        }

        let decoded = match call.name.as_str() {
            OPEN_SESSION => decode::<UrlArgs>(&arguments)
                .and_then(|a| checked_url(a.url))
                .map(|url| BrowserTool::OpenSession { url }),
            LOAD_PAGE => decode::<UrlArgs>(&arguments)
                .and_then(|a| checked_url(a.url))
                .map(|url| BrowserTool::LoadPage { url }),
            READ_SURFACE => Ok(BrowserTool::ReadSurface),
            CLICK => decode::<ElementTarget>(&arguments).map(BrowserTool::Click),
            TYPE_TEXT => decode::<TypeArgs>(&arguments).map(|a| BrowserTool::Type {
                target: a.target,
                text: a.text,
            }),
            SCROLL => decode::<ScrollArgs>(&arguments).map(|a| BrowserTool::Scroll {
                direction: a.direction,
            }),
            FINAL_ANSWER => {
                decode::<FinalAnswerArgs>(&arguments).map(|a| BrowserTool::FinalAnswer { text: a.text })
            }
            other => Err(AgentError::Internal(format!("No decoder for tool {}", other))),
        }?;

        Ok(decoded)
    }
}

fn decode<T: serde::de::DeserializeOwned>(arguments: &Value) -> AgentResult<T> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| AgentError::InvalidParameters(e.to_string()))
}

/// Accept absolute URLs as given and bare hosts like `example.com` as https
fn checked_url(raw: String) -> AgentResult<String> {
    if Url::parse(&raw).is_ok() {
        return Ok(raw);
    }
    let prefixed = format!("https://{}", raw.trim());
    match Url::parse(&prefixed) {
        Ok(_) => Ok(prefixed),
        Err(e) => Err(AgentError::InvalidParameters(format!(
            "\"{}\" is not a valid URL: {}",
            raw, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall::new("call_1", name, arguments)
    }

    #[test]
    fn test_registry_exposes_every_tool() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.names(),
            vec![
                "open_session",
                "load_page",
                "read_surface",
                "click",
                "type_text",
                "scroll",
                "final_answer"
            ]
        );
        for tool in registry.tools() {
            assert_eq!(tool.input_schema["type"], "object");
        }
    }

    #[test]
    fn test_unknown_tool_lists_valid_names() {
        let registry = ToolRegistry::new();
        let err = registry.parse(&call("Frobnicate", json!({}))).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Frobnicate not found"));
        for name in registry.names() {
            assert!(text.contains(name));
        }
    }

    #[test]
    fn test_parse_click_with_disambiguation() {
        let registry = ToolRegistry::new();
        let parsed = registry
            .parse(&call(
                "click",
                json!({"role": "link", "name": "Docs", "parentRole": "navigation", "parentName": "Main", "index": 1}),
            ))
            .unwrap();
        assert_eq!(
            parsed,
            BrowserTool::Click(ElementTarget {
                role: "link".to_string(),
                name: "Docs".to_string(),
                parent_role: Some("navigation".to_string()),
                parent_name: Some("Main".to_string()),
                index: Some(1),
            })
        );
    }

    #[test]
    fn test_parse_type_text() {
        let registry = ToolRegistry::new();
        let parsed = registry
            .parse(&call(
                "type_text",
                json!({"role": "searchbox", "name": "Search", "text": "shoes"}),
            ))
            .unwrap();
        assert_eq!(
            parsed,
            BrowserTool::Type {
                target: ElementTarget::new("searchbox", "Search"),
                text: "shoes".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_required_argument_is_rejected() {
        let registry = ToolRegistry::new();
        let err = registry
            .parse(&call("click", json!({"role": "button"})))
            .unwrap_err();
        match err {
            AgentError::InvalidParameters(msg) => assert!(msg.contains("name")),
            other => panic!("Expected InvalidParameters, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.parse(&call("load_page", json!({"url": 42}))),
            Err(AgentError::InvalidParameters(_))
        ));
        assert!(matches!(
            registry.parse(&call("scroll", json!({"direction": "sideways"}))),
            Err(AgentError::InvalidParameters(_))
        ));
        assert!(matches!(
            registry.parse(&call("click", json!("not an object"))),
            Err(AgentError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_scroll_defaults_down_and_null_args_are_accepted() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.parse(&call("scroll", Value::Null)).unwrap(),
            BrowserTool::Scroll {
                direction: ScrollDirection::Down
            }
        );
        assert_eq!(
            registry.parse(&call("scroll", json!({"direction": "up"}))).unwrap(),
            BrowserTool::Scroll {
                direction: ScrollDirection::Up
            }
        );
        assert_eq!(
            registry.parse(&call("read_surface", Value::Null)).unwrap(),
            BrowserTool::ReadSurface
        );
    }

    #[test]
    fn test_final_answer() {
        let registry = ToolRegistry::new();
        let parsed = registry
            .parse(&call("final_answer", json!({"text": "$19.99"})))
            .unwrap();
        assert_eq!(parsed.name(), FINAL_ANSWER);
        assert_eq!(
            parsed,
            BrowserTool::FinalAnswer {
                text: "$19.99".to_string()
            }
        );
    }

    #[test]
    fn test_urls_are_checked() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.parse(&call("load_page", json!({"url": "https://shop.test"}))),
            Ok(BrowserTool::LoadPage {
                url: "https://shop.test".to_string()
            })
        );
        assert_eq!(
            registry.parse(&call("open_session", json!({"url": "shop.test/red"}))),
            Ok(BrowserTool::OpenSession {
                url: "https://shop.test/red".to_string()
            })
        );
        assert!(matches!(
            registry.parse(&call("load_page", json!({"url": ""}))),
            Err(AgentError::InvalidParameters(_))
        ));
    }
}
