use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::ParseError;
use crate::models::element::{Element, ElementSnapshot};
use crate::prompt_template::Prompt;
use crate::providers::base::{CompletionOptions, Provider};
use crate::secondary::{ask, parse_object};

pub const DEFAULT_BUDGET: usize = 32_000;

/// Keep leading elements while their serialized size fits in `budget` characters.
/// Returns the kept elements and how many were dropped.
pub fn cap_elements(elements: Vec<Element>, budget: usize) -> (Vec<Element>, usize) {
    let total = elements.len();
    let mut size = 0;
    let mut kept = Vec::new();

    for element in elements {
        let length = serde_json::to_string(&element)
            .map(|s| s.chars().count())
            .unwrap_or(usize::MAX);
        if size + length > budget {
            break;
        }
        size += length;
        kept.push(element);
    }

    let dropped = total - kept.len();
    (kept, dropped)
}

// What the model sends back; only role and name are required
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Selection {
    role: String,
    name: String,
    #[serde(default)]
    parent_role: Option<String>,
    #[serde(default)]
    parent_name: Option<String>,
    #[serde(default)]
    index: Option<usize>,
}

impl Selection {
    fn matches(&self, element: &Element) -> bool {
        self.role == element.role
            && self.name == element.name
            && self
                .parent_role
                .as_ref()
                .map_or(true, |r| element.parent_role.as_ref() == Some(r))
            && self
                .parent_name
                .as_ref()
                .map_or(true, |n| element.parent_name.as_ref() == Some(n))
            && self.index.map_or(true, |i| element.index == Some(i))
    }
}

/// Compresses `read_surface` output to the elements that matter for the goal
pub struct RelevanceFilter<'a> {
    provider: &'a dyn Provider,
    budget: usize,
    model: Option<String>,
    timeout: Duration,
}

impl<'a> RelevanceFilter<'a> {
    pub fn new(
        provider: &'a dyn Provider,
        budget: usize,
        model: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            budget,
            model,
            timeout,
        }
    }

    /// Never fails: when the model cannot help, the size-capped snapshot is returned as is
    pub async fn filter(&self, goal: &str, snapshot: ElementSnapshot) -> ElementSnapshot {
        let (capped, dropped) = cap_elements(snapshot.elements, self.budget);
        if dropped > 0 {
            info!(kept = capped.len(), dropped, "truncated element list to fit the filter budget");
        }

        if capped.is_empty() {
            return ElementSnapshot::new(snapshot.page_title, capped);
        }

        match self.select(goal, &capped).await {
            Ok(selected) => {
                debug!(before = capped.len(), after = selected.len(), "filtered elements");
                ElementSnapshot::new(snapshot.page_title, selected)
            }
            Err(e) => {
                warn!(error = %e, "element filter failed, passing elements through");
                ElementSnapshot::new(snapshot.page_title, capped)
            }
        }
    }

    async fn select(&self, goal: &str, capped: &[Element]) -> Result<Vec<Element>, ParseError> {
        let elements = serde_json::to_string(capped)
            .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
        let prompt = Prompt::Filter
            .render(&json!({"goal": goal, "elements": elements}))
            .map_err(|e| ParseError::Prompt(e.to_string()))?;

        let options = CompletionOptions::json()
            .with_model(self.model.clone())
            .with_temperature(0.0)
            .with_max_tokens(4000);
        let reply = ask(self.provider, prompt, &options, self.timeout).await?;

        let object = parse_object(&reply)?;
        let entries = object
            .get("elements")
            .and_then(|e| e.as_array())
            .ok_or(ParseError::MissingField("elements"))?;
        let selections: Vec<Selection> = entries
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect();

        // Anything the model made up has no counterpart in `capped` and disappears here
        Ok(capped
            .iter()
            .filter(|element| selections.iter().any(|s| s.matches(element)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::providers::mock::MockProvider;

    fn snapshot() -> ElementSnapshot {
        ElementSnapshot::new(
            "Shop",
            vec![
                Element::new("searchbox", "Search"),
                Element::new("link", "Careers"),
                Element::new("link", "Red shoes"),
                Element::new("button", "Buy").with_parent("article", "Red shoes"),
                Element::new("button", "Buy").with_parent("article", "Blue shoes"),
            ],
        )
    }

    fn filter(provider: &MockProvider) -> RelevanceFilter<'_> {
        RelevanceFilter::new(provider, DEFAULT_BUDGET, None, Duration::from_secs(1))
    }

    #[test]
    fn test_cap_elements() {
        let elements = snapshot().elements;
        let one = serde_json::to_string(&elements[0]).unwrap().len();

        let (kept, dropped) = cap_elements(elements.clone(), one);
        assert_eq!(kept, vec![elements[0].clone()]);
        assert_eq!(dropped, 4);

        let (kept, dropped) = cap_elements(elements.clone(), 0);
        assert!(kept.is_empty());
        assert_eq!(dropped, 5);

        let (kept, dropped) = cap_elements(elements.clone(), DEFAULT_BUDGET);
        assert_eq!(kept, elements);
        assert_eq!(dropped, 0);
    }

    #[tokio::test]
    async fn test_keeps_selected_elements_in_order() {
        let provider = MockProvider::new(vec![Message::assistant(
            r#"{"elements": [
                {"role": "button", "name": "Buy", "parentName": "Blue shoes"},
                {"role": "searchbox", "name": "Search"}
            ]}"#,
        )]);

        let result = filter(&provider).filter("buy blue shoes", snapshot()).await;
        assert_eq!(result.page_title, "Shop");
        assert_eq!(
            result.elements,
            vec![
                Element::new("searchbox", "Search"),
                Element::new("button", "Buy").with_parent("article", "Blue shoes"),
            ]
        );

        let request = &provider.requests()[0];
        assert!(request.options.json_response);
        assert_eq!(request.options.temperature, Some(0.0));
        assert!(request.messages[0].content().contains("buy blue shoes"));
    }

    #[tokio::test]
    async fn test_invented_elements_are_discarded() {
        let provider = MockProvider::new(vec![Message::assistant(
            r#"{"elements": [{"role": "button", "name": "Checkout"}, {"role": "link", "name": "Red shoes"}, "junk"]}"#,
        )]);

        let result = filter(&provider).filter("goal", snapshot()).await;
        assert_eq!(result.elements, vec![Element::new("link", "Red shoes")]);
    }

    #[tokio::test]
    async fn test_invalid_json_passes_through() {
        let provider = MockProvider::new(vec![Message::assistant("Sure, here are the elements")]);
        let result = filter(&provider).filter("goal", snapshot()).await;
        assert_eq!(result, snapshot());
    }

    #[tokio::test]
    async fn test_call_failure_passes_capped_list_through() {
        let provider = MockProvider::scripted(vec![Err("boom".to_string())]);
        let one = serde_json::to_string(&snapshot().elements[0]).unwrap().len();
        let filter = RelevanceFilter::new(&provider, one * 2, None, Duration::from_secs(1));

        let result = filter.filter("goal", snapshot()).await;
        let (capped, _) = cap_elements(snapshot().elements, one * 2);
        assert_eq!(result.elements, capped);
    }

    #[tokio::test]
    async fn test_empty_surface_skips_the_model() {
        let provider = MockProvider::new(vec![]);
        let result = filter(&provider)
            .filter("goal", ElementSnapshot::new("Blank", vec![]))
            .await;
        assert!(result.elements.is_empty());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_elements_key_passes_through() {
        let provider = MockProvider::new(vec![Message::assistant(r#"{"items": []}"#)]);
        let result = filter(&provider).filter("goal", snapshot()).await;
        assert_eq!(result, snapshot());
    }
}
