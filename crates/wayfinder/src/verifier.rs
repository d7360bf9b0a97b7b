use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::ParseError;
use crate::models::message::Message;
use crate::prompt_template::Prompt;
use crate::providers::base::{CompletionOptions, Provider};
use crate::secondary::{ask, parse_object_lenient};

const HISTORY_ENTRIES: usize = 4;
const HISTORY_CHARS: usize = 300;

/// The verifier's judgement on a proposed final answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub met: bool,
    pub reason: String,
}

impl Verdict {
    /// The user message that sends the agent back to work after a rejected answer
    pub fn corrective_message(&self) -> Message {
        Message::user(format!(
            "[Verifier Feedback]: The goal is NOT yet met. Reason: {}. Please continue trying.",
            self.reason
        ))
    }
}

pub struct GoalVerifier<'a> {
    provider: &'a dyn Provider,
    model: Option<String>,
    timeout: Duration,
}

impl<'a> GoalVerifier<'a> {
    pub fn new(provider: &'a dyn Provider, model: Option<String>, timeout: Duration) -> Self {
        Self {
            provider,
            model,
            timeout,
        }
    }

    /// Judge `answer` against the goal. A reply that cannot be read counts as not met, while
    /// a call that never produced a reply lets the answer through.
    pub async fn verify(&self, goal: &str, history: &[Message], answer: &str) -> Verdict {
        match self.judge(goal, history, answer).await {
            Ok(verdict) => {
                info!(met = verdict.met, reason = %verdict.reason, "verifier verdict");
                verdict
            }
            Err(e) => {
                let verdict = fallback(&e);
                warn!(error = %e, met = verdict.met, "verifier did not give a verdict");
                verdict
            }
        }
    }

    async fn judge(
        &self,
        goal: &str,
        history: &[Message],
        answer: &str,
    ) -> Result<Verdict, ParseError> {
        let prompt = Prompt::Verifier
            .render(&json!({
                "goal": goal,
                "answer": answer,
                "history": recent_history(history),
            }))
            .map_err(|e| ParseError::Prompt(e.to_string()))?;

        let options = CompletionOptions::json()
            .with_model(self.model.clone())
            .with_temperature(0.0)
            .with_max_tokens(500);
        let reply = ask(self.provider, prompt, &options, self.timeout).await?;

        let object = parse_object_lenient(&reply)?;
        let met = object
            .get("isGoalMet")
            .and_then(Value::as_bool)
            .ok_or(ParseError::MissingField("isGoalMet"))?;
        let reason = object
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("No reason given")
            .to_string();

        Ok(Verdict { met, reason })
    }
}

/// Only an unreachable or silent endpoint lets the answer through
fn fallback(error: &ParseError) -> Verdict {
    match error {
        ParseError::ModelCall(_) | ParseError::Timeout(_) => Verdict {
            met: true,
            reason: format!("Verifier unavailable: {}", error),
        },
        ParseError::Prompt(_) => Verdict {
            met: false,
            reason: format!("The verifier could not be asked: {}", error),
        },
        ParseError::InvalidJson(_) | ParseError::MissingField(_) => Verdict {
            met: false,
            reason: "The verifier response could not be understood".to_string(),
        },
    }
}

fn recent_history(history: &[Message]) -> Vec<Value> {
    let relevant: Vec<&Message> = history
        .iter()
        .filter(|m| !matches!(m, Message::System { .. }))
        .collect();
    let start = relevant.len().saturating_sub(HISTORY_ENTRIES);

    relevant[start..]
        .iter()
        .map(|m| {
            let content: String = m.content().chars().take(HISTORY_CHARS).collect();
            json!({"role": m.role().as_str(), "content": content})
        })
        .collect()
}
