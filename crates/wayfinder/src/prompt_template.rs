use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

/// Prompt templates compiled into the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    System,
    Filter,
    Verifier,
    WorkflowTitle,
}

impl Prompt {
    fn source(&self) -> &'static str {
        match self {
            Prompt::System => include_str!("prompts/system.md"),
            Prompt::Filter => include_str!("prompts/filter.md"),
            Prompt::Verifier => include_str!("prompts/verifier.md"),
            Prompt::WorkflowTitle => include_str!("prompts/workflow_title.md"),
        }
    }

    /// Render the template, trimming the whitespace the template files end with
    pub fn render<T: Serialize>(&self, context_data: &T) -> Result<String, TeraError> {
        load_prompt(self.source(), context_data).map(|rendered| rendered.trim().to_string())
    }
}

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}
