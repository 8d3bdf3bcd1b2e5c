//! DOM normalization: raw HTML to a flat list of semantic element descriptors.

use scraper::{ElementRef, Html};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::generator::{css_ident, css_string, xpath_literal};
use crate::types::ElementDescriptor;

/// Attributes that survive normalization, besides any `aria-*`
const STABLE_ATTRIBUTES: &[&str] = &[
    "id",
    "class",
    "data-testid",
    "role",
    "name",
    "type",
    "placeholder",
    "alt",
    "title",
];

/// Elements that never carry visible, targetable content
const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "meta", "link", "title", "base",
];

/// A normalized page snapshot
#[derive(Debug, Clone, Default)]
pub struct NormalizedDom {
    pub elements: Vec<ElementDescriptor>,
    /// Every element node the parser produced, including skipped ones
    pub total_elements: usize,
}

/// One step of the iterative depth-first walk
enum Visit<N> {
    Open {
        node: N,
        parent: Option<usize>,
        step: String,
    },
    Close(usize),
}

/// Parse HTML and describe every visible element in document order.
///
/// html5ever recovers from any malformed input, so this never fails; broken
/// fragments just end up as whatever the tree builder made of them.
///
/// The tree is walked once with an explicit stack. Skipped subtrees are
/// counted and pruned at their root, visible text chunks are collected in
/// document order and every element keeps the range of chunks it encloses.
pub fn normalize(html: &str) -> NormalizedDom {
    let document = Html::parse_document(html);
    let mut out = NormalizedDom::default();

    let mut chunks: Vec<&str> = Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut paths: Vec<String> = Vec::new();

    let root = document.root_element();
    let mut stack = vec![Visit::Open {
        node: *root,
        parent: None,
        step: root.value().name().to_string(),
    }];

    while let Some(visit) = stack.pop() {
        let (node, parent, step) = match visit {
            Visit::Close(index) => {
                spans[index].1 = chunks.len();
                continue;
            }
            Visit::Open { node, parent, step } => (node, parent, step),
        };

        if let Some(text) = node.value().as_text() {
            chunks.push(text);
            continue;
        }
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };

        if SKIPPED_TAGS.contains(&element.value().name()) {
            out.total_elements += element
                .descendants()
                .filter(|n| n.value().is_element())
                .count();
            continue;
        }
        out.total_elements += 1;

        let path = match parent {
            Some(p) => format!("{}/{}", paths[p], step),
            None => format!("/{}", step),
        };
        let index = out.elements.len();
        out.elements.push(describe(element, &path));
        spans.push((chunks.len(), chunks.len()));
        paths.push(path);
        stack.push(Visit::Close(index));

        let mut same_tag: HashMap<&str, usize> = HashMap::new();
        for child in element.children().filter_map(ElementRef::wrap) {
            *same_tag.entry(child.value().name()).or_default() += 1;
        }
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let children: Vec<_> = node
            .children()
            .filter(|child| child.value().is_element() || child.value().is_text())
            .map(|child| {
                let step = match ElementRef::wrap(child) {
                    Some(el) => path_step(el.value().name(), &same_tag, &mut seen),
                    None => String::new(),
                };
                Visit::Open {
                    node: child,
                    parent: Some(index),
                    step,
                }
            })
            .collect();
        stack.extend(children.into_iter().rev());
    }

    for (element, (start, end)) in out.elements.iter_mut().zip(&spans) {
        element.text = collapse_whitespace(&chunks[*start..*end].join(" "));
    }

    if !document.errors.is_empty() {
        debug!(
            "Normalized {} elements with {} parse errors recovered",
            out.elements.len(),
            document.errors.len()
        );
    }
    out
}

/// `tag` or `tag[n]` when the parent has several children with that tag
fn path_step<'a>(
    name: &'a str,
    same_tag: &HashMap<&str, usize>,
    seen: &mut HashMap<&'a str, usize>,
) -> String {
    let position = seen.entry(name).or_default();
    *position += 1;
    if same_tag.get(name).copied().unwrap_or(0) > 1 {
        format!("{}[{}]", name, position)
    } else {
        name.to_string()
    }
}

fn describe(element: ElementRef, path: &str) -> ElementDescriptor {
    let tag = element.value().name().to_ascii_lowercase();

    let mut attributes = BTreeMap::new();
    for (name, value) in element.value().attrs() {
        if STABLE_ATTRIBUTES.contains(&name) || name.starts_with("aria-") {
            attributes.insert(name.to_string(), value.to_string());
        }
    }

    let derived_selector = derive_selector(&tag, &attributes);
    let derived_xpath = Some(derive_xpath(&attributes, path));

    // Filled in once the walk has seen every descendant
    let text = String::new();

    ElementDescriptor {
        tag,
        attributes,
        text,
        derived_selector,
        derived_xpath,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty<'a>(attributes: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Best single CSS selector: test id, then id, then tag with classes.
fn derive_selector(tag: &str, attributes: &BTreeMap<String, String>) -> String {
    if let Some(testid) = non_empty(attributes, "data-testid") {
        return format!("[data-testid={}]", css_string(testid));
    }
    if let Some(id) = non_empty(attributes, "id") {
        return format!("#{}", css_ident(id));
    }
    let classes: Vec<String> = non_empty(attributes, "class")
        .map(|c| c.split_whitespace().map(css_ident).collect())
        .unwrap_or_default();
    if classes.is_empty() {
        tag.to_string()
    } else {
        format!("{}.{}", tag, classes.join("."))
    }
}

/// Attribute-anchored XPath when possible, otherwise the positional path from the root.
fn derive_xpath(attributes: &BTreeMap<String, String>, path: &str) -> String {
    if let Some(id) = non_empty(attributes, "id") {
        return format!("//*[@id={}]", xpath_literal(id));
    }
    if let Some(testid) = non_empty(attributes, "data-testid") {
        return format!("//*[@data-testid={}]", xpath_literal(testid));
    }
    path.to_string()
}

#[cfg(test)]
#[path = "dom_test.rs"]
mod dom_test;
