use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of a single tool invocation. These never escape the dispatcher: they are
/// rendered into the tool result the model sees on its next turn.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool {name} not found. Available tools: {available}")]
    ToolNotFound { name: String, available: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution error: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// A secondary model call (filter, verifier, workflow titling) gave no usable answer.
/// Each caller decides its own fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("model call failed: {0}")]
    ModelCall(String),

    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("response was not valid JSON: {0}")]
    InvalidJson(String),

    #[error("response is missing field `{0}`")]
    MissingField(&'static str),

    #[error("could not render prompt: {0}")]
    Prompt(String),
}

/// Fatal outcomes of an agent run. Everything recoverable is folded back into the
/// transcript instead.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Recursion limit of {limit} reached without the goal being verified")]
    RecursionLimit { limit: usize },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Conversation store failure: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("No successful tool calls found to save.")]
    NothingToSave,

    #[error("No messages found for conversation {0}")]
    EmptyConversation(String),

    #[error("Workflow {0} not found")]
    NotFound(String),

    #[error("Failed to parse LLM output: {0}")]
    Titling(#[from] ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
