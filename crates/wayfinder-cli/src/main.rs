mod commands;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wayfinder::service::AgentService;
use wayfinder::settings::Settings;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a goal in the browser until the answer is verified
    Run {
        /// What you want done
        message: String,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
    },
    /// List past conversations
    History,
    /// Print the log of a conversation
    Show { id: String },
    /// Delete a conversation
    Delete { id: String },
    /// Save the successful browser actions of a conversation as a workflow
    SaveWorkflow { conversation: String },
    /// List saved workflows
    Workflows,
    /// Replay a saved workflow
    Replay { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = AgentService::from_settings(Settings::new()?)?;
    let output = commands::Output { json: cli.json };

    match cli.command {
        Command::Run {
            message,
            conversation,
        } => commands::run::execute(&service, &message, conversation.as_deref(), output).await,
        Command::History => commands::conversations::history(&service, output),
        Command::Show { id } => commands::conversations::show(&service, &id, output),
        Command::Delete { id } => commands::conversations::delete(&service, &id, output),
        Command::SaveWorkflow { conversation } => {
            commands::workflows::save(&service, &conversation, output).await
        }
        Command::Workflows => commands::workflows::list(&service, output),
        Command::Replay { id } => commands::workflows::replay(&service, &id, output).await,
    }
}
