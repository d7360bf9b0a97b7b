use crate::models::message::Message;
use crate::tools::READ_SURFACE;

pub const DEFAULT_WINDOW: usize = 10;

const STALE_SURFACE: &str = "[Old Tool Output Truncated] Elements from previous state.";

/// Turns a full transcript into the bounded prompt sent to the primary model.
///
/// The prompt is the system prompt, the goal, the latest page snapshot if it fell out of
/// the window, and then the last `window` transcript messages. Only the freshest
/// `read_surface` output is ever shown in full. Tool results are rendered as user text so
/// that a window cut between a call and its result is still a valid conversation.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
    window: usize,
}

impl ContextBuilder {
    pub fn new<S: Into<String>>(system_prompt: S, window: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            window,
        }
    }

    pub fn build(&self, transcript: &[Message], goal: &str) -> Vec<Message> {
        let start = transcript.len().saturating_sub(self.window);
        let latest_surface = transcript
            .iter()
            .rposition(|m| m.tool_name() == Some(READ_SURFACE));

        let mut prompt = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(format!("User Goal: {}", goal)),
        ];

        if let Some(index) = latest_surface.filter(|&i| i < start) {
            prompt.push(Message::user(format!(
                "[Context - Last Known Page State]\n(from previous turn)\n{}",
                transcript[index].content()
            )));
        }

        for (index, message) in transcript.iter().enumerate().skip(start) {
            match message {
                Message::System { .. } => {}
                Message::User { content } => prompt.push(Message::user(content.clone())),
                Message::Assistant {
                    content,
                    tool_calls,
                } => {
                    let text = if content.is_empty() && !tool_calls.is_empty() {
                        let names: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                        format!("[Tool Call: {}]", names.join(", "))
                    } else {
                        content.clone()
                    };
                    prompt.push(Message::assistant(text));
                }
                Message::Tool { name, content, .. } if name == READ_SURFACE => {
                    if Some(index) == latest_surface {
                        prompt.push(Message::user(content.clone()));
                    } else {
                        prompt.push(Message::user(STALE_SURFACE));
                    }
                }
                Message::Tool { name, content, .. } => {
                    prompt.push(Message::user(format!("Tool \"{}\" Output: {}", name, content)));
                }
            }
        }

        prompt
    }
}
