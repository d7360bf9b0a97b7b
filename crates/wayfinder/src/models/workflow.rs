use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
}

/// One recorded browser action of a saved workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub args: Value,
    pub status: StepStatus,
}

impl WorkflowStep {
    pub fn succeeded<S: Into<String>>(name: S, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
            status: StepStatus::Success,
        }
    }
}

/// A named, replayable sequence of successful browser actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tools: Vec<WorkflowStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStatus {
    Success,
    Error,
}

/// Outcome of replaying one workflow step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: ReplayStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn success<N: Into<String>, R: Into<String>>(name: N, result: R) -> Self {
        Self {
            name: name.into(),
            status: ReplayStatus::Success,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn error<N: Into<String>, E: Into<String>>(name: N, error: E) -> Self {
        Self {
            name: name.into(),
            status: ReplayStatus::Error,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ReplayStatus::Error
    }
}
