use serde::{Deserialize, Serialize};

use super::role::Role;
use super::tool::ToolCall;

/// A message in an agent transcript, tagged by the role that produced it.
///
/// Messages are never edited once they are appended to a transcript; the context
/// builder produces rewritten copies when it needs a different rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        name: String,
        call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// An assistant message carrying only text
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Add a requested tool call to an assistant message. Other roles are returned as-is.
    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        if let Message::Assistant { tool_calls, .. } = &mut self {
            tool_calls.push(call);
        }
        self
    }

    pub fn tool<N, I, C>(name: N, call_id: I, content: C) -> Self
    where
        N: Into<String>,
        I: Into<String>,
        C: Into<String>,
    {
        Message::Tool {
            name: name.into(),
            call_id: call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Tool calls requested by an assistant message; empty for every other role
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// The single call the agent acts upon for this turn
    pub fn first_tool_call(&self) -> Option<&ToolCall> {
        self.tool_calls().first()
    }

    /// Name of the tool that produced this result, if this is a tool message
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Message::Tool { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_tool_calls() {
        let message = Message::assistant("")
            .with_tool_call(ToolCall::new("1", "load_page", json!({"url": "https://a.b"})))
            .with_tool_call(ToolCall::new("2", "read_surface", json!({})));

        assert_eq!(message.role(), Role::Assistant);
        assert_eq!(message.tool_calls().len(), 2);
        assert_eq!(message.first_tool_call().unwrap().name, "load_page");
    }

    #[test]
    fn test_tool_calls_ignored_for_other_roles() {
        let message = Message::user("hi").with_tool_call(ToolCall::new("1", "x", json!({})));
        assert!(message.tool_calls().is_empty());
        assert_eq!(message.content(), "hi");
    }

    #[test]
    fn test_serialization_is_tagged_by_role() -> anyhow::Result<()> {
        let message = Message::tool("read_surface", "call_1", "{}");
        let value = serde_json::to_value(&message)?;
        assert_eq!(value["role"], "tool");
        assert_eq!(value["name"], "read_surface");
        assert_eq!(value["call_id"], "call_1");

        let back: Message = serde_json::from_value(value)?;
        assert_eq!(back, message);
        Ok(())
    }
}
