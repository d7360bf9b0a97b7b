use anyhow::Result;
use console::style;
use wayfinder::service::AgentService;

use super::Output;
use crate::render;

pub fn history(service: &AgentService, output: Output) -> Result<()> {
    let history = service.get_history()?;
    output.emit(&history, |history| {
        if history.is_empty() {
            println!("{}", style("No conversations yet").dim());
        }
        for conversation in history {
            println!(
                "{}  {}  {}",
                style(&conversation.id).dim(),
                render::timestamp(conversation.created_at),
                conversation.title
            );
        }
    })
}

pub fn show(service: &AgentService, id: &str, output: Output) -> Result<()> {
    let messages = service.load_conversation(id)?;
    output.emit(&messages, |messages| {
        if messages.is_empty() {
            println!("{}", style(format!("No messages found for {}", id)).dim());
        }
        for message in messages {
            println!("{}", render::message(message.role, &message.content));
        }
    })
}

pub fn delete(service: &AgentService, id: &str, output: Output) -> Result<()> {
    let response = service.delete_conversation(id)?;
    output.emit(&response, |response| {
        if response.success {
            println!("Deleted conversation {}", id);
        } else {
            println!("{}", style(format!("Conversation {} not found", id)).red());
        }
    })
}
