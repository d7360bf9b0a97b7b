use std::collections::HashMap;

use super::engine::AxNode;
use crate::models::element::Element;
use crate::tools::ElementTarget;

/// Roles a user can act upon. Everything else is only used as parent context.
pub const INTERACTIBLE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "combobox",
    "checkbox",
    "radio",
    "menuitem",
    "tab",
    "option",
    "switch",
    "slider",
    "spinbutton",
    "listbox",
];

// Named after the page itself, so useless for telling elements apart
const DOCUMENT_ROLES: &[&str] = &["RootWebArea", "WebArea", "document"];

struct Entry<'a> {
    role: &'a str,
    name: &'a str,
    parent: Option<(&'a str, &'a str)>,
}

fn collect<'a>(node: &'a AxNode, parent: Option<(&'a str, &'a str)>, out: &mut Vec<Entry<'a>>) {
    let name = node.name.trim();

    if !name.is_empty() && INTERACTIBLE_ROLES.contains(&node.role.as_str()) {
        out.push(Entry {
            role: &node.role,
            name,
            parent,
        });
    }

    let parent_for_children = if !name.is_empty() && !DOCUMENT_ROLES.contains(&node.role.as_str()) {
        Some((node.role.as_str(), name))
    } else {
        parent
    };

    for child in &node.children {
        collect(child, parent_for_children, out);
    }
}

/// Flatten an accessibility tree into the interactible elements, in document order.
///
/// Every element carries its nearest named ancestor. An index is attached only when
/// several elements share role, name and that ancestor, and counts within that group.
pub fn flatten(root: &AxNode) -> Vec<Element> {
    let mut entries = Vec::new();
    collect(root, None, &mut entries);

    let mut totals: HashMap<(&str, &str, Option<(&str, &str)>), usize> = HashMap::new();
    for entry in &entries {
        *totals.entry((entry.role, entry.name, entry.parent)).or_default() += 1;
    }

    let mut seen: HashMap<(&str, &str, Option<(&str, &str)>), usize> = HashMap::new();
    entries
        .iter()
        .map(|entry| {
            let key = (entry.role, entry.name, entry.parent);
            let mut element = Element::new(entry.role, entry.name);
            if let Some((role, name)) = entry.parent {
                element = element.with_parent(role, name);
            }
            if totals.get(&key).copied().unwrap_or(0) > 1 {
                let position = seen.entry(key).or_default();
                element = element.with_index(*position);
                *position += 1;
            }
            element
        })
        .collect()
}

/// Find which of the elements matching the target's role and name is meant.
///
/// Returns the position of the chosen element among all elements with that role and name,
/// which is what an aria selector counts.
pub fn locate(elements: &[Element], target: &ElementTarget) -> Result<usize, String> {
    let matches: Vec<(usize, &Element)> = elements
        .iter()
        .filter(|e| e.role == target.role && e.name == target.name)
        .enumerate()
        .collect();

    if matches.is_empty() {
        return Err(format!(
            "Element {} \"{}\" not found on the page",
            target.role, target.name
        ));
    }

    let by_parent: Vec<(usize, &Element)> = matches
        .into_iter()
        .filter(|(_, e)| {
            target
                .parent_role
                .as_ref()
                .map_or(true, |role| e.parent_role.as_ref() == Some(role))
                && target
                    .parent_name
                    .as_ref()
                    .map_or(true, |name| e.parent_name.as_ref() == Some(name))
        })
        .collect();

    if by_parent.is_empty() {
        return Err(format!(
            "Element {} \"{}\" not found inside {} \"{}\"",
            target.role,
            target.name,
            target.parent_role.as_deref().unwrap_or("any parent"),
            target.parent_name.as_deref().unwrap_or("")
        ));
    }

    match target.index {
        None => Ok(by_parent[0].0),
        Some(index) => by_parent
            .iter()
            .find(|(_, e)| e.index == Some(index))
            .or_else(|| by_parent.get(index))
            .map(|(nth, _)| *nth)
            .ok_or_else(|| {
                format!(
                    "Index {} is out of range: only {} matching {} \"{}\" elements",
                    index,
                    by_parent.len(),
                    target.role,
                    target.name
                )
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> AxNode {
        AxNode::new("RootWebArea", "Shop").with_children(vec![
            AxNode::new("navigation", "Main").with_children(vec![
                AxNode::new("link", "Home"),
                AxNode::new("link", "Deals"),
            ]),
            AxNode::new("main", "").with_children(vec![
                AxNode::new("searchbox", "Search"),
                AxNode::new("button", "Go"),
                AxNode::new("article", "Red shoes").with_children(vec![
                    AxNode::new("heading", "Red shoes"),
                    AxNode::new("button", "Add to cart"),
                ]),
                AxNode::new("article", "Blue shoes")
                    .with_children(vec![AxNode::new("button", "Add to cart")]),
                AxNode::new("generic", "").with_children(vec![
                    AxNode::new("link", "More"),
                    AxNode::new("link", "More"),
                    AxNode::new("text", "plain"),
                    AxNode::new("button", "   "),
                ]),
            ]),
            AxNode::new("contentinfo", "Footer").with_children(vec![AxNode::new("link", "Home")]),
        ])
    }

    #[test]
    fn test_flatten_keeps_only_named_interactible_elements() {
        let elements = flatten(&page());
        let pairs: Vec<(&str, &str)> = elements
            .iter()
            .map(|e| (e.role.as_str(), e.name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("link", "Home"),
                ("link", "Deals"),
                ("searchbox", "Search"),
                ("button", "Go"),
                ("button", "Add to cart"),
                ("button", "Add to cart"),
                ("link", "More"),
                ("link", "More"),
                ("link", "Home"),
            ]
        );
    }

    #[test]
    fn test_parents_and_indices() {
        let elements = flatten(&page());

        // Page root is never a parent
        assert_eq!(elements[2].parent_role, None);
        assert_eq!(elements[0].parent_name.as_deref(), Some("Main"));

        // Distinguished by parent: no index
        assert_eq!(elements[4].parent_name.as_deref(), Some("Red shoes"));
        assert_eq!(elements[5].parent_name.as_deref(), Some("Blue shoes"));
        assert_eq!(elements[4].index, None);
        assert_eq!(elements[5].index, None);

        // Same parent (none): positional index
        assert_eq!(elements[6].index, Some(0));
        assert_eq!(elements[7].index, Some(1));

        // Home links live under different landmarks
        assert_eq!(elements[8].parent_role.as_deref(), Some("contentinfo"));
        assert_eq!(elements[8].index, None);
    }

    #[test]
    fn test_locate_by_parent_then_index() {
        let elements = flatten(&page());

        let mut target = ElementTarget::new("button", "Add to cart");
        assert_eq!(locate(&elements, &target), Ok(0));

        target.parent_name = Some("Blue shoes".to_string());
        assert_eq!(locate(&elements, &target), Ok(1));

        let mut more = ElementTarget::new("link", "More");
        more.index = Some(1);
        assert_eq!(locate(&elements, &more), Ok(1));

        let mut home = ElementTarget::new("link", "Home");
        home.parent_role = Some("contentinfo".to_string());
        assert_eq!(locate(&elements, &home), Ok(1));
    }

    #[test]
    fn test_locate_errors() {
        let elements = flatten(&page());

        let err = locate(&elements, &ElementTarget::new("button", "Checkout")).unwrap_err();
        assert!(err.contains("not found"));

        let mut wrong_parent = ElementTarget::new("button", "Go");
        wrong_parent.parent_name = Some("Footer".to_string());
        assert!(locate(&elements, &wrong_parent).unwrap_err().contains("inside"));

        let mut out_of_range = ElementTarget::new("link", "More");
        out_of_range.index = Some(5);
        assert!(locate(&elements, &out_of_range)
            .unwrap_err()
            .contains("out of range"));
    }
}
