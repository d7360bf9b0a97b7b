use anyhow::{bail, Result};
use console::style;
use wayfinder::service::AgentService;

use super::Output;
use crate::render;

pub async fn save(service: &AgentService, conversation: &str, output: Output) -> Result<()> {
    let response = service.save_workflow(conversation).await;
    output.emit(&response, |response| match (&response.workflow, &response.error) {
        (Some(workflow), _) => {
            println!(
                "Saved {} {}",
                style(&workflow.title).bold(),
                style(format!("({})", workflow.id)).dim()
            );
            println!("{}", workflow.description);
            for step in &workflow.tools {
                println!("  {}", render::step(&step.name, &step.args));
            }
        }
        (None, error) => println!(
            "{} {}",
            style("Could not save workflow:").red(),
            error.as_deref().unwrap_or("unknown error")
        ),
    })?;

    if !response.success {
        bail!("workflow was not saved");
    }
    Ok(())
}

pub fn list(service: &AgentService, output: Output) -> Result<()> {
    let workflows = service.get_workflows()?;
    output.emit(&workflows, |workflows| {
        if workflows.is_empty() {
            println!("{}", style("No saved workflows").dim());
        }
        for workflow in workflows {
            println!(
                "{}  {} {}",
                style(&workflow.id).dim(),
                style(&workflow.title).bold(),
                style(format!("[{} steps]", workflow.tools.len())).dim()
            );
            println!("    {}", workflow.description);
        }
    })
}

pub async fn replay(service: &AgentService, id: &str, output: Output) -> Result<()> {
    let response = service.run_workflow(id).await;
    output.emit(&response, |response| {
        if let Some(error) = &response.error {
            println!("{} {}", style("Could not run workflow:").red(), error);
        }
        for result in &response.results {
            println!("{}", render::step_result(result));
        }
    })?;

    let failed = !response.success || response.results.iter().any(|r| r.is_error());
    if failed {
        bail!("workflow replay did not complete");
    }
    Ok(())
}
