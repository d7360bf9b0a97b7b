//! Conversation and workflow persistence.
//!
//! The agent only relies on the [`Store`] contract. [`MemoryStore`] keeps everything in
//! process; [`FileStore`] writes JSON documents under a data directory, one append-only
//! JSONL log per conversation.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::role::Role;
use crate::models::workflow::{Workflow, WorkflowStep};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub title: String,
    /// Milliseconds since the epoch
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Increasing within a conversation, starting at 1
    pub id: i64,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    /// JSON-encoded array of steps
    pub tool_calls: String,
    pub created_at: i64,
}

impl TryFrom<WorkflowRecord> for Workflow {
    type Error = anyhow::Error;

    fn try_from(record: WorkflowRecord) -> Result<Self> {
        let tools: Vec<WorkflowStep> = serde_json::from_str(&record.tool_calls)
            .with_context(|| format!("Workflow {} has corrupt steps", record.id))?;
        Ok(Workflow {
            id: record.id,
            title: record.title,
            description: record.description,
            tools,
            created_at: chrono::DateTime::from_timestamp_millis(record.created_at),
        })
    }
}

/// Read/write contract of the persisted conversation log
pub trait Store: Send + Sync {
    fn create_conversation(&self, title: &str) -> Result<String>;

    fn add_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<()>;

    /// Messages of a conversation, oldest first
    fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>>;

    /// Conversations, newest first
    fn get_conversations(&self) -> Result<Vec<ConversationRecord>>;

    /// Returns whether the conversation existed
    fn delete_conversation(&self, conversation_id: &str) -> Result<bool>;

    fn create_workflow(&self, title: &str, description: &str, tool_calls: &str) -> Result<String>;

    fn get_workflow(&self, id: &str) -> Result<Option<WorkflowRecord>>;

    /// Workflows, newest first
    fn get_workflows(&self) -> Result<Vec<WorkflowRecord>>;
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Default)]
struct MemoryData {
    conversations: Vec<ConversationRecord>,
    messages: HashMap<String, Vec<MessageRecord>>,
    workflows: Vec<WorkflowRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<std::sync::MutexGuard<'_, MemoryData>> {
        self.data.lock().map_err(|_| anyhow!("Store lock poisoned"))
    }
}

impl Store for MemoryStore {
    fn create_conversation(&self, title: &str) -> Result<String> {
        let id = new_id();
        let mut data = self.data()?;
        data.conversations.push(ConversationRecord {
            id: id.clone(),
            title: title.to_string(),
            created_at: now_millis(),
        });
        data.messages.insert(id.clone(), Vec::new());
        Ok(id)
    }

    fn add_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<()> {
        let mut data = self.data()?;
        let messages = data
            .messages
            .get_mut(conversation_id)
            .ok_or_else(|| anyhow!("Conversation {} not found", conversation_id))?;
        messages.push(MessageRecord {
            id: messages.len() as i64 + 1,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now_millis(),
        });
        Ok(())
    }

    fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        Ok(self
            .data()?
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let mut conversations = self.data()?.conversations.clone();
        conversations.reverse();
        Ok(conversations)
    }

    fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        let mut data = self.data()?;
        let before = data.conversations.len();
        data.conversations.retain(|c| c.id != conversation_id);
        data.messages.remove(conversation_id);
        Ok(data.conversations.len() != before)
    }

    fn create_workflow(&self, title: &str, description: &str, tool_calls: &str) -> Result<String> {
        let id = new_id();
        self.data()?.workflows.push(WorkflowRecord {
            id: id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            tool_calls: tool_calls.to_string(),
            created_at: now_millis(),
        });
        Ok(id)
    }

    fn get_workflow(&self, id: &str) -> Result<Option<WorkflowRecord>> {
        Ok(self.data()?.workflows.iter().find(|w| w.id == id).cloned())
    }

    fn get_workflows(&self) -> Result<Vec<WorkflowRecord>> {
        let mut workflows = self.data()?.workflows.clone();
        workflows.reverse();
        Ok(workflows)
    }
}

/// Layout under the data directory:
///
/// ```text
/// conversations/<id>.json   conversation record
/// conversations/<id>.jsonl  message log, one record per line
/// workflows/<id>.json       workflow record
/// ```
pub struct FileStore {
    root: PathBuf,
    // Serializes writers; readers see whole lines only because every append is one write
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("conversations"))
            .with_context(|| format!("Failed to create data directory {}", root.display()))?;
        fs::create_dir_all(root.join("workflows"))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn conversation_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.root.join("conversations").join(format!("{}.json", safe_id(id)?)))
    }

    fn log_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.root.join("conversations").join(format!("{}.jsonl", safe_id(id)?)))
    }

    fn workflow_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.root.join("workflows").join(format!("{}.json", safe_id(id)?)))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| anyhow!("Store lock poisoned"))
    }

    fn read_log(path: &Path) -> Result<Vec<MessageRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(path)?);
        let mut messages = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            messages.push(serde_json::from_str(&line)?);
        }
        Ok(messages)
    }

    fn read_documents<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
        let mut documents = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let file = fs::File::open(&path)?;
                documents.push(
                    serde_json::from_reader(file)
                        .with_context(|| format!("Corrupt record {}", path.display()))?,
                );
            }
        }
        Ok(documents)
    }
}

// Ids become file names
fn safe_id(id: &str) -> Result<&str> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        Ok(id)
    } else {
        Err(anyhow!("Invalid id: {}", id))
    }
}

impl Store for FileStore {
    fn create_conversation(&self, title: &str) -> Result<String> {
        let _guard = self.lock()?;
        let record = ConversationRecord {
            id: new_id(),
            title: title.to_string(),
            created_at: now_millis(),
        };
        fs::write(
            self.conversation_path(&record.id)?,
            serde_json::to_vec(&record)?,
        )?;
        Ok(record.id)
    }

    fn add_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<()> {
        let _guard = self.lock()?;
        if !self.conversation_path(conversation_id)?.exists() {
            return Err(anyhow!("Conversation {} not found", conversation_id));
        }

        let path = self.log_path(conversation_id)?;
        let next_id = Self::read_log(&path)?.last().map_or(1, |m| m.id + 1);
        let record = MessageRecord {
            id: next_id,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now_millis(),
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;
        Ok(())
    }

    fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        Self::read_log(&self.log_path(conversation_id)?)
    }

    fn get_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let mut conversations: Vec<ConversationRecord> =
            Self::read_documents(&self.root.join("conversations"))?;
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(conversations)
    }

    fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        let _guard = self.lock()?;
        let record = self.conversation_path(conversation_id)?;
        let existed = record.exists();
        if existed {
            fs::remove_file(record)?;
        }
        let log = self.log_path(conversation_id)?;
        if log.exists() {
            fs::remove_file(log)?;
        }
        Ok(existed)
    }

    fn create_workflow(&self, title: &str, description: &str, tool_calls: &str) -> Result<String> {
        let _guard = self.lock()?;
        let record = WorkflowRecord {
            id: new_id(),
            title: title.to_string(),
            description: description.to_string(),
            tool_calls: tool_calls.to_string(),
            created_at: now_millis(),
        };
        fs::write(self.workflow_path(&record.id)?, serde_json::to_vec(&record)?)?;
        Ok(record.id)
    }

    fn get_workflow(&self, id: &str) -> Result<Option<WorkflowRecord>> {
        let path = match self.workflow_path(id) {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_reader(fs::File::open(path)?)?))
    }

    fn get_workflows(&self) -> Result<Vec<WorkflowRecord>> {
        let mut workflows: Vec<WorkflowRecord> =
            Self::read_documents(&self.root.join("workflows"))?;
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workflows)
    }
}
