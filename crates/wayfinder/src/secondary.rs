//! Plumbing shared by the single-prompt model calls that expect a JSON object back.
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

use crate::errors::ParseError;
use crate::models::message::Message;
use crate::providers::base::{CompletionOptions, Provider};

lazy_static! {
    static ref JSON_SPAN: Regex = Regex::new(r"\{[\s\S]*\}").unwrap();
}

/// Send one user prompt and return the text of the reply
pub async fn ask(
    provider: &dyn Provider,
    prompt: String,
    options: &CompletionOptions,
    timeout: Duration,
) -> Result<String, ParseError> {
    let messages = [Message::user(prompt)];
    match tokio::time::timeout(timeout, provider.complete(&messages, &[], options)).await {
        Ok(Ok((message, _usage))) => Ok(message.content().to_string()),
        Ok(Err(e)) => Err(ParseError::ModelCall(e.to_string())),
        Err(_) => Err(ParseError::Timeout(timeout.as_secs())),
    }
}

/// Parse a reply as a JSON object
pub fn parse_object(text: &str) -> Result<serde_json::Map<String, Value>, ParseError> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ParseError::InvalidJson(format!("expected an object, got {}", other))),
        Err(e) => Err(ParseError::InvalidJson(e.to_string())),
    }
}

/// Like [`parse_object`], but falls back to the outermost `{...}` span for replies that
/// wrap the object in prose or code fences
pub fn parse_object_lenient(text: &str) -> Result<serde_json::Map<String, Value>, ParseError> {
    parse_object(text).or_else(|direct| match JSON_SPAN.find(text) {
        Some(span) => parse_object(span.as_str()),
        None => Err(direct),
    })
}
