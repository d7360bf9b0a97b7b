use console::style;
use serde_json::Value;
use wayfinder::models::role::Role;
use wayfinder::models::workflow::StepResult;

const PREVIEW_CHARS: usize = 240;

fn preview(content: &str) -> String {
    let mut shown: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        shown.push_str("...");
    }
    shown
}

/// One transcript line, with tool output shortened
pub fn message(role: Role, content: &str) -> String {
    let label = match role {
        Role::User => style("user").cyan().bold(),
        Role::Assistant => style("assistant").green().bold(),
        Role::Tool => style("tool").yellow(),
        Role::System => style("system").magenta(),
    };
    let body = match role {
        Role::Tool => style(preview(content)).dim().to_string(),
        _ => content.to_string(),
    };
    format!("{:>10} {}", label, body)
}

pub fn step(name: &str, args: &Value) -> String {
    format!("{} {}", style(name).bold(), args)
}

pub fn step_result(result: &StepResult) -> String {
    match (&result.result, &result.error) {
        (_, Some(error)) => format!("{} {} {}", style("✗").red(), result.name, style(error).red()),
        (Some(output), None) => format!(
            "{} {} {}",
            style("✓").green(),
            result.name,
            style(preview(output)).dim()
        ),
        (None, None) => format!("{} {}", style("✓").green(), result.name),
    }
}

pub fn timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain(text: String) -> String {
        console::strip_ansi_codes(&text).to_string()
    }

    #[test]
    fn test_tool_output_is_shortened() {
        let line = plain(message(Role::Tool, &"x".repeat(1000)));
        assert!(line.contains("tool"));
        assert!(line.ends_with("..."));
        assert!(line.len() < 300);

        let line = plain(message(Role::Assistant, &"y".repeat(1000)));
        assert!(line.ends_with(&"y".repeat(1000)));
    }

    #[test]
    fn test_step_result() {
        let ok = plain(step_result(&StepResult::success("load_page", "Navigated")));
        assert!(ok.contains("load_page") && ok.contains("Navigated"));

        let failed = plain(step_result(&StepResult::error("click", "Unknown tool: click")));
        assert!(failed.contains("Unknown tool: click"));
    }

    #[test]
    fn test_step_and_timestamp() {
        let line = plain(step("load_page", &json!({"url": "https://example.com"})));
        assert_eq!(line, r#"load_page {"url":"https://example.com"}"#);
        assert_eq!(timestamp(0), "1970-01-01 00:00");
    }
}
