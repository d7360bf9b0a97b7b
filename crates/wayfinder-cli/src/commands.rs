pub mod conversations;
pub mod run;
pub mod workflows;

use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print `value` as JSON when asked to, otherwise run `pretty`
    pub fn emit<T: Serialize>(&self, value: &T, pretty: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            pretty(value);
        }
        Ok(())
    }
}
