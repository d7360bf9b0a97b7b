//! The inbound interface shared by the HTTP server and the CLI.
use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::{log_line, Agent, AgentContext, Cancellation};
use crate::browser::BrowserSession;
use crate::errors::{AgentError, RunError};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::workflow::{StepResult, Workflow};
use crate::providers::base::Provider;
use crate::providers::factory::get_provider;
use crate::settings::Settings;
use crate::store::{FileStore, MessageRecord, Store};
use crate::workflow;

lazy_static! {
    static ref TOOL_OUTPUT: Regex = Regex::new(r"^Tool Output \((.*?)\): ([\s\S]*)$").unwrap();
}

const TITLE_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub messages: Vec<ChatMessage>,
    pub final_answer: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedMessage {
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveWorkflowResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWorkflowResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Conversation title derived from the first message
pub fn conversation_title(message: &str) -> String {
    let head: String = message.chars().take(TITLE_CHARS).collect();
    format!("{}...", head)
}

/// Rebuild a transcript from a persisted log so a conversation can be continued
pub fn transcript_from_log(records: &[MessageRecord]) -> Vec<Message> {
    records
        .iter()
        .filter_map(|record| match record.role {
            Role::User => Some(Message::user(record.content.clone())),
            Role::Assistant => Some(Message::assistant(record.content.clone())),
            Role::Tool => {
                let (name, content) = match TOOL_OUTPUT.captures(&record.content) {
                    Some(captures) => (captures[1].to_string(), captures[2].to_string()),
                    None => ("unknown".to_string(), record.content.clone()),
                };
                Some(Message::tool(name, "", content))
            }
            Role::System => None,
        })
        .collect()
}

fn chat_message(message: &Message) -> ChatMessage {
    let content = match message {
        Message::Assistant { .. } => log_line(message).unwrap_or_default(),
        other => other.content().to_string(),
    };
    ChatMessage {
        role: message.role(),
        content,
    }
}

/// Runs queries and manages conversations and workflows on top of one agent
pub struct AgentService {
    agent: Agent,
    context: AgentContext,
}

impl AgentService {
    pub fn new(context: AgentContext) -> Result<Self, AgentError> {
        let agent = Agent::new(context.clone())?;
        Ok(Self { agent, context })
    }

    /// Wire up the OpenAI-compatible provider, a browser launched on first use and the file
    /// store under the configured data directory
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let provider: Arc<dyn Provider + Send + Sync> =
            Arc::from(get_provider(settings.provider.into_config())?);
        let data_dir = settings.storage.data_dir();
        info!(data_dir = %data_dir.display(), "opening conversation store");

        let context = AgentContext {
            provider,
            browser: Arc::new(BrowserSession::launch(&settings.browser)),
            store: Arc::new(FileStore::open(data_dir)?),
            settings: settings.agent,
        };
        Ok(Self::new(context)?)
    }

    pub fn store(&self) -> &dyn Store {
        self.context.store.as_ref()
    }

    /// Run `message` to a verified answer, in a new conversation or continuing an existing one
    pub async fn run_query(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<QueryResponse, RunError> {
        let store = self.store();
        let (conversation_id, prior) = match conversation_id {
            Some(id) => (id.to_string(), store.get_messages(id)?),
            None => (store.create_conversation(&conversation_title(message))?, Vec::new()),
        };

        let goal = prior
            .iter()
            .find(|r| r.role == Role::User)
            .map(|r| r.content.clone())
            .unwrap_or_else(|| message.to_string());

        store.add_message(&conversation_id, Role::User, message)?;
        let mut transcript = transcript_from_log(&prior);
        transcript.push(Message::user(message));

        info!(%conversation_id, resumed = !prior.is_empty(), "running query");
        let outcome = self
            .agent
            .run(&goal, transcript, &conversation_id, cancel)
            .await?;

        Ok(QueryResponse {
            messages: outcome.transcript.iter().map(chat_message).collect(),
            final_answer: outcome.final_answer,
            conversation_id,
        })
    }

    pub fn get_history(&self) -> Result<Vec<ConversationSummary>> {
        Ok(self
            .store()
            .get_conversations()?
            .into_iter()
            .map(|c| ConversationSummary {
                id: c.id,
                title: c.title,
                created_at: c.created_at,
            })
            .collect())
    }

    pub fn load_conversation(&self, conversation_id: &str) -> Result<Vec<LoggedMessage>> {
        Ok(self
            .store()
            .get_messages(conversation_id)?
            .into_iter()
            .map(|m| LoggedMessage {
                role: m.role,
                content: m.content,
                created_at: m.created_at,
            })
            .collect())
    }

    pub fn delete_conversation(&self, conversation_id: &str) -> Result<DeleteResponse> {
        let success = self.store().delete_conversation(conversation_id)?;
        Ok(DeleteResponse { success })
    }

    pub async fn save_workflow(&self, conversation_id: &str) -> SaveWorkflowResponse {
        let saved = workflow::save_workflow(
            self.context.provider.as_ref(),
            self.store(),
            conversation_id,
            self.context.settings.titling_model.clone(),
            self.context.settings.model_timeout(),
        )
        .await;

        match saved {
            Ok(workflow) => SaveWorkflowResponse {
                success: true,
                workflow: Some(workflow),
                error: None,
            },
            Err(e) => {
                warn!(%conversation_id, error = %e, "could not save workflow");
                SaveWorkflowResponse {
                    success: false,
                    workflow: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Saved workflows, newest first. Records that no longer decode are skipped.
    pub fn get_workflows(&self) -> Result<Vec<Workflow>> {
        Ok(self
            .store()
            .get_workflows()?
            .into_iter()
            .filter_map(|record| match Workflow::try_from(record) {
                Ok(workflow) => Some(workflow),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable workflow");
                    None
                }
            })
            .collect())
    }

    pub async fn run_workflow(&self, id: &str) -> RunWorkflowResponse {
        let workflow = match self.store().get_workflow(id) {
            Ok(Some(record)) => Workflow::try_from(record),
            Ok(None) => Err(anyhow::anyhow!("Workflow not found")),
            Err(e) => Err(e),
        };

        match workflow {
            Ok(workflow) => {
                info!(%id, steps = workflow.tools.len(), "replaying workflow");
                let results = workflow::replay(
                    self.agent.registry(),
                    &self.context.browser,
                    &workflow.tools,
                )
                .await;
                RunWorkflowResponse {
                    success: true,
                    results,
                    error: None,
                }
            }
            Err(e) => RunWorkflowResponse {
                success: false,
                results: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}
