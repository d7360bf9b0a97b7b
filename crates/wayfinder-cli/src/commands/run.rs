use anyhow::Result;
use cliclack::spinner;
use console::style;
use wayfinder::agent::Cancellation;
use wayfinder::service::AgentService;

use super::Output;
use crate::render;

pub async fn execute(
    service: &AgentService,
    message: &str,
    conversation: Option<&str>,
    output: Output,
) -> Result<()> {
    let cancel = Cancellation::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let spin = (!output.json).then(|| {
        let spin = spinner();
        spin.start("working on it");
        spin
    });
    let result = service.run_query(message, conversation, &cancel).await;
    if let Some(spin) = spin {
        spin.stop("");
    }

    let response = result?;
    output.emit(&response, |response| {
        for message in &response.messages {
            println!("{}", render::message(message.role, &message.content));
        }
        println!();
        println!("{} {}", style("Answer:").green().bold(), response.final_answer);
        println!(
            "{}",
            style(format!("conversation {}", response.conversation_id)).dim()
        );
    })
}
