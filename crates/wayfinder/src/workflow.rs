//! Turning a finished conversation into a replayable workflow, and replaying it.
//!
//! Extraction works on the persisted conversation log only, so any past conversation can be
//! saved. Replay runs the recorded steps against the browser without consulting a model.
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::errors::{ParseError, WorkflowError};
use crate::models::role::Role;
use crate::models::tool::ToolCall;
use crate::models::workflow::{StepResult, Workflow, WorkflowStep};
use crate::prompt_template::Prompt;
use crate::providers::base::{CompletionOptions, Provider};
use crate::secondary::{ask, parse_object};
use crate::store::{MessageRecord, Store};
use crate::tools::{ToolRegistry, FINAL_ANSWER};

lazy_static! {
    static ref EXECUTING_TOOL: Regex = Regex::new(r"Executing tool: (.*?) Args: (.*)").unwrap();
}

/// Substrings that mark a logged tool result as failed
const ERROR_MARKERS: [&str; 4] = [
    "Error:",
    "Tool execution error:",
    "Error retrieving",
    "Error clicking",
];

fn is_error(content: &str) -> bool {
    ERROR_MARKERS.iter().any(|marker| content.contains(marker))
}

fn logged_calls(content: &str) -> Vec<(String, Value)> {
    content
        .lines()
        .filter_map(|line| EXECUTING_TOOL.captures(line))
        .filter_map(|captures| {
            let name = captures[1].trim().to_string();
            match serde_json::from_str(captures[2].trim()) {
                Ok(args) => Some((name, args)),
                Err(e) => {
                    debug!(%name, error = %e, "skipping tool log line with unreadable arguments");
                    None
                }
            }
        })
        .filter(|(name, _)| name != FINAL_ANSWER)
        .collect()
}

/// Collect the successful tool calls of a conversation log, in order.
///
/// Each assistant row listing tool calls is paired, call by call, with the tool rows that
/// directly follow it. Pairing stops at the first row that is not a tool result.
pub fn extract_steps(messages: &[MessageRecord]) -> Vec<WorkflowStep> {
    let mut steps = Vec::new();

    for (i, message) in messages.iter().enumerate() {
        if message.role != Role::Assistant {
            continue;
        }
        let calls = logged_calls(&message.content);
        if calls.is_empty() {
            continue;
        }

        let results = messages[i + 1..]
            .iter()
            .take_while(|m| m.role == Role::Tool);
        for ((name, args), result) in calls.into_iter().zip(results) {
            if is_error(&result.content) {
                debug!(%name, "skipping failed tool call");
                continue;
            }
            steps.push(WorkflowStep::succeeded(name, args));
        }
    }

    steps
}

/// Extract, title and store a workflow from a conversation
pub async fn save_workflow(
    provider: &dyn Provider,
    store: &dyn Store,
    conversation_id: &str,
    model: Option<String>,
    timeout: Duration,
) -> Result<Workflow, WorkflowError> {
    let messages = store.get_messages(conversation_id)?;
    if messages.is_empty() {
        return Err(WorkflowError::EmptyConversation(conversation_id.to_string()));
    }

    let steps = extract_steps(&messages);
    if steps.is_empty() {
        return Err(WorkflowError::NothingToSave);
    }

    let goal = messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("User Goal");
    let (title, description) = title_workflow(provider, goal, &steps, model, timeout).await?;

    let tool_calls = serde_json::to_string(&steps).map_err(anyhow::Error::from)?;
    let id = store.create_workflow(&title, &description, &tool_calls)?;
    info!(%id, %title, steps = steps.len(), "saved workflow");

    Ok(Workflow {
        id,
        title,
        description,
        tools: steps,
        created_at: Some(chrono::Utc::now()),
    })
}

async fn title_workflow(
    provider: &dyn Provider,
    goal: &str,
    steps: &[WorkflowStep],
    model: Option<String>,
    timeout: Duration,
) -> Result<(String, String), ParseError> {
    // Arguments are rendered as JSON text
    let listed: Vec<Value> = steps
        .iter()
        .map(|s| json!({"name": s.name, "args": s.args.to_string()}))
        .collect();
    let prompt = Prompt::WorkflowTitle
        .render(&json!({"goal": goal, "steps": listed}))
        .map_err(|e| ParseError::Prompt(e.to_string()))?;

    let options = CompletionOptions::json()
        .with_model(model)
        .with_temperature(0.7)
        .with_max_tokens(500);
    let reply = ask(provider, prompt, &options, timeout).await?;
    let object = parse_object(&reply)?;

    let field = |key: &str, default: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(default)
            .to_string()
    };
    Ok((
        field("title", "Untitled Workflow"),
        field("description", "No description"),
    ))
}

/// Run the steps in order, stopping at the first failure. The failing step is the last
/// entry of the result.
pub async fn replay(
    registry: &ToolRegistry,
    browser: &BrowserSession,
    steps: &[WorkflowStep],
) -> Vec<StepResult> {
    let mut results = Vec::new();

    for (i, step) in steps.iter().enumerate() {
        let call = ToolCall::new(format!("replay_{}", i), &step.name, step.args.clone());
        let outcome = match registry.parse(&call) {
            Ok(tool) => browser.execute(&tool).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(output) => results.push(StepResult::success(&step.name, output)),
            Err(e) => {
                warn!(step = i, tool = %step.name, error = %e, "workflow replay stopped");
                results.push(StepResult::error(&step.name, e.to_string()));
                break;
            }
        }
    }

    results
}
