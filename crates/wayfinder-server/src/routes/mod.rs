pub mod conversations;
pub mod health;
pub mod query;
pub mod workflows;

use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn error_response(status: StatusCode, error: impl ToString) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(query::routes(state.clone()))
        .merge(conversations::routes(state.clone()))
        .merge(workflows::routes(state))
}

#[cfg(test)]
pub(crate) mod test_support {
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use wayfinder::agent::AgentContext;
    use wayfinder::browser::BrowserSession;
    use wayfinder::models::message::Message;
    use wayfinder::models::tool::{Tool, ToolCall};
    use wayfinder::providers::base::{CompletionOptions, Provider, Usage};
    use wayfinder::service::AgentService;
    use wayfinder::settings::{AgentSettings, BrowserSettings};
    use wayfinder::store::MemoryStore;

    use crate::state::AppState;

    /// Replies with a fixed script, then with empty text
    pub struct ScriptedProvider {
        replies: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[Tool],
            _options: &CompletionOptions,
        ) -> Result<(Message, Usage)> {
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.is_empty() {
                Message::assistant("")
            } else {
                replies.remove(0)
            };
            Ok((reply, Usage::default()))
        }
    }

    pub fn answer(text: &str) -> Vec<Message> {
        vec![
            Message::assistant("").with_tool_call(ToolCall::new(
                "call_1",
                "final_answer",
                serde_json::json!({ "text": text }),
            )),
            Message::assistant(r#"{"isGoalMet": true, "reason": "answered"}"#),
        ]
    }

    /// App state over an in-memory store. The browser is never started unless a scripted
    /// reply asks for a browser tool.
    pub fn state(replies: Vec<Message>) -> AppState {
        let context = AgentContext {
            provider: Arc::new(ScriptedProvider {
                replies: Mutex::new(replies),
            }),
            browser: Arc::new(BrowserSession::launch(&BrowserSettings::default())),
            store: Arc::new(MemoryStore::new()),
            settings: AgentSettings::default(),
        };
        AppState::new(AgentService::new(context).unwrap())
    }

    pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(method)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(method)
            .body(Body::empty())
            .unwrap()
    }

    pub async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
