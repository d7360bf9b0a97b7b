use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::context::ContextBuilder;
use crate::errors::{AgentError, AgentResult, RunError};
use crate::filter::RelevanceFilter;
use crate::models::element::ElementSnapshot;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::ToolCall;
use crate::prompt_template::Prompt;
use crate::providers::base::{CompletionOptions, Provider};
use crate::settings::AgentSettings;
use crate::store::Store;
use crate::tools::{BrowserTool, ToolRegistry, FINAL_ANSWER};
use crate::verifier::GoalVerifier;

/// Everything a run needs from the outside world
#[derive(Clone)]
pub struct AgentContext {
    pub provider: Arc<dyn Provider>,
    pub browser: Arc<BrowserSession>,
    pub store: Arc<dyn Store>,
    pub settings: AgentSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Ask the model for the next step
    Agent,
    /// Execute the requested tool
    Tool,
    /// Check a proposed final answer
    Verify,
    Done,
}

/// Cancels an in-flight run. Clones share the same signal.
#[derive(Clone)]
pub struct Cancellation {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

/// What one run carries from node to node. `goal_met` only ever turns true, through
/// [`AgentRunState::accept`].
#[derive(Debug, Clone)]
pub struct AgentRunState {
    pub goal: String,
    pub transcript: Vec<Message>,
    goal_met: bool,
    final_answer: Option<String>,
}

impl AgentRunState {
    pub fn new<S: Into<String>>(goal: S, transcript: Vec<Message>) -> Self {
        Self {
            goal: goal.into(),
            transcript,
            goal_met: false,
            final_answer: None,
        }
    }

    pub fn goal_met(&self) -> bool {
        self.goal_met
    }

    /// Record a verified answer. The first accepted answer is kept.
    fn accept(&mut self, answer: String) {
        if !self.goal_met {
            self.goal_met = true;
            self.final_answer = Some(answer);
        }
    }

    fn into_outcome(self) -> RunOutcome {
        RunOutcome {
            transcript: self.transcript,
            final_answer: self.final_answer.unwrap_or_default(),
        }
    }
}

/// The result of a run that reached a verified answer
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub transcript: Vec<Message>,
    pub final_answer: String,
}

/// Drives one goal through the AGENT / TOOL / VERIFY loop until the verifier accepts an
/// answer. Turns are persisted to the conversation log as they happen.
pub struct Agent {
    context: AgentContext,
    registry: ToolRegistry,
    window: ContextBuilder,
}

impl Agent {
    pub fn new(context: AgentContext) -> AgentResult<Self> {
        let registry = ToolRegistry::new();
        let system_prompt = Prompt::System
            .render(&serde_json::json!({ "tools": registry.tools() }))
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        let window = ContextBuilder::new(system_prompt, context.settings.window_size);

        Ok(Self {
            context,
            registry,
            window,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run until the goal is verified.
    ///
    /// `transcript` is the conversation so far and should end with the new user message,
    /// which the caller has already persisted. `goal` is what the verifier judges against.
    pub async fn run(
        &self,
        goal: &str,
        transcript: Vec<Message>,
        conversation_id: &str,
        cancel: &Cancellation,
    ) -> Result<RunOutcome, RunError> {
        let limit = self.context.settings.recursion_limit;
        let mut run = AgentRunState::new(goal, transcript);
        let mut state = AgentState::Agent;
        let mut steps = 0;

        while state != AgentState::Done {
            if cancel.is_cancelled() {
                info!(conversation_id, "run cancelled");
                return Err(RunError::Cancelled);
            }
            if steps >= limit {
                warn!(conversation_id, limit, "recursion limit reached");
                return Err(RunError::RecursionLimit { limit });
            }
            steps += 1;

            let next = match state {
                AgentState::Agent => {
                    self.agent_turn(&run.goal, &mut run.transcript, conversation_id, cancel)
                        .await?
                }
                AgentState::Tool => {
                    self.tool_turn(&run.goal, &mut run.transcript, conversation_id, cancel)
                        .await?
                }
                AgentState::Verify => {
                    match self
                        .verify_turn(&run.goal, &mut run.transcript, conversation_id, cancel)
                        .await?
                    {
                        Some(answer) => {
                            run.accept(answer);
                            AgentState::Done
                        }
                        None => AgentState::Agent,
                    }
                }
                AgentState::Done => AgentState::Done,
            };
            debug!(
                from = ?state,
                to = ?next,
                step = steps,
                goal_met = run.goal_met(),
                "transition"
            );
            state = next;
        }

        Ok(run.into_outcome())
    }

    async fn agent_turn(
        &self,
        goal: &str,
        transcript: &mut Vec<Message>,
        conversation_id: &str,
        cancel: &Cancellation,
    ) -> Result<AgentState, RunError> {
        let messages = self.window.build(transcript, goal);
        let timeout = self.context.settings.model_timeout();
        let options = CompletionOptions::default();

        let call = self.context.provider.complete(&messages, self.registry.tools(), &options);
        let reply = match guarded(cancel, tokio::time::timeout(timeout, call)).await? {
            Ok(Ok((message, usage))) => {
                debug!(?usage, "model replied");
                message
            }
            Ok(Err(e)) => {
                warn!(error = %e, "model call failed");
                Message::assistant(format!("Error calling model: {}", e))
            }
            Err(_) => {
                warn!(timeout = timeout.as_secs(), "model call timed out");
                Message::assistant(format!(
                    "Error calling model: no response after {}s",
                    timeout.as_secs()
                ))
            }
        };

        let next = match reply.first_tool_call() {
            Some(call) if call.name == FINAL_ANSWER => AgentState::Verify,
            Some(_) => AgentState::Tool,
            None => AgentState::Agent,
        };

        if let Some(line) = log_line(&reply) {
            self.persist(conversation_id, Role::Assistant, &line)?;
        }
        transcript.push(reply);
        Ok(next)
    }

    async fn tool_turn(
        &self,
        goal: &str,
        transcript: &mut Vec<Message>,
        conversation_id: &str,
        cancel: &Cancellation,
    ) -> Result<AgentState, RunError> {
        let Some(call) = last_tool_call(transcript) else {
            return Ok(AgentState::Agent);
        };

        let content = match guarded(cancel, self.dispatch(goal, &call)).await? {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool call failed");
                format!("Error: {}", e)
            }
        };

        self.persist(
            conversation_id,
            Role::Tool,
            &format!("Tool Output ({}): {}", call.name, content),
        )?;
        transcript.push(Message::tool(call.name, call.id, content));
        Ok(AgentState::Agent)
    }

    async fn dispatch(&self, goal: &str, call: &ToolCall) -> AgentResult<String> {
        let tool = self.registry.parse(call)?;
        info!(tool = tool.name(), arguments = %call.arguments, "executing tool");
        let output = self.context.browser.execute(&tool).await?;

        if tool != BrowserTool::ReadSurface {
            return Ok(output);
        }
        let Some(snapshot) = ElementSnapshot::from_json(&output) else {
            return Ok(output);
        };

        let filter = RelevanceFilter::new(
            &*self.context.provider,
            self.context.settings.filter_budget,
            self.context.settings.filter_model.clone(),
            self.context.settings.model_timeout(),
        );
        let filtered = filter.filter(goal, snapshot).await;
        serde_json::to_string(&filtered).map_err(|e| AgentError::Internal(e.to_string()))
    }

    /// Returns the accepted answer, or `None` when the agent has to keep going
    async fn verify_turn(
        &self,
        goal: &str,
        transcript: &mut Vec<Message>,
        conversation_id: &str,
        cancel: &Cancellation,
    ) -> Result<Option<String>, RunError> {
        let Some(call) = last_tool_call(transcript) else {
            return Ok(None);
        };

        let answer = match self.registry.parse(&call) {
            Ok(BrowserTool::FinalAnswer { text }) => text,
            Ok(_) => return Ok(None),
            Err(e) => {
                // Malformed final answers go back to the model like any other tool error
                let content = format!("Error: {}", e);
                self.persist(
                    conversation_id,
                    Role::Tool,
                    &format!("Tool Output ({}): {}", call.name, content),
                )?;
                transcript.push(Message::tool(call.name, call.id, content));
                return Ok(None);
            }
        };

        let verifier = GoalVerifier::new(
            &*self.context.provider,
            self.context.settings.verifier_model.clone(),
            self.context.settings.verifier_timeout(),
        );
        let verdict = guarded(cancel, verifier.verify(goal, transcript, &answer)).await?;

        if verdict.met {
            return Ok(Some(answer));
        }

        let corrective = verdict.corrective_message();
        self.persist(conversation_id, Role::User, corrective.content())?;
        transcript.push(corrective);
        Ok(None)
    }

    fn persist(&self, conversation_id: &str, role: Role, content: &str) -> Result<(), RunError> {
        self.context
            .store
            .add_message(conversation_id, role, content)
            .map_err(RunError::Store)
    }
}

/// Await `future` unless the run is cancelled first
async fn guarded<F: Future>(cancel: &Cancellation, future: F) -> Result<F::Output, RunError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled),
        output = future => Ok(output),
    }
}

fn last_tool_call(transcript: &[Message]) -> Option<ToolCall> {
    transcript
        .iter()
        .rev()
        .find(|m| matches!(m, Message::Assistant { .. }))
        .and_then(|m| m.first_tool_call())
        .cloned()
}

/// How an assistant turn is written to the conversation log. Text-only turns with no text
/// are not logged.
pub fn log_line(message: &Message) -> Option<String> {
    let calls = message.tool_calls();
    if let Some(answer) = calls.iter().find(|c| c.name == FINAL_ANSWER) {
        return Some(answer.arguments.to_string());
    }
    if !calls.is_empty() {
        let lines: Vec<String> = calls
            .iter()
            .map(|c| format!("Executing tool: {} Args: {}", c.name, c.arguments))
            .collect();
        return Some(lines.join("\n"));
    }
    match message.content() {
        "" => None,
        text => Some(text.to_string()),
    }
}
