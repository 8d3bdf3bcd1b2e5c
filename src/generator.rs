//! Candidate generation from normalized elements.
//!
//! CSS and XPath candidates come from two independent passes over the same
//! element list. When a usage hint is supplied, elements whose visible text or
//! labelling attributes mention one of its keywords contribute a *semantic*
//! candidate that is placed ahead of every plain candidate.

use std::collections::HashSet;
use tracing::debug;

use crate::config::HealerConfig;
use crate::types::ElementDescriptor;

pub struct CandidateGenerator<'a> {
    config: &'a HealerConfig,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(config: &'a HealerConfig) -> Self {
        Self { config }
    }

    /// Lowercase keywords from a usage hint, stop words and short tokens removed.
    pub fn keywords(&self, usage_hint: &str) -> Vec<String> {
        usage_hint
            .to_lowercase()
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| ".,!?()[]{}\"':;".contains(c))
                    .to_string()
            })
            .filter(|w| w.chars().count() > 2 && !self.config.is_stop_word(w))
            .collect()
    }

    /// Ordered, unique CSS candidates; semantic matches first.
    pub fn generate_css(
        &self,
        elements: &[ElementDescriptor],
        failed_selector: &str,
        usage_hint: Option<&str>,
        limit: usize,
    ) -> Vec<String> {
        let keywords = usage_hint.map(|h| self.keywords(h)).unwrap_or_default();
        let cutoff = self.config.text_length_cutoff;

        let mut semantic = Vec::new();
        let mut plain = Vec::new();

        for el in elements {
            if let Some(testid) = el.attr("data-testid") {
                plain.push(format!("[data-testid={}]", css_string(testid)));
            }
            if let Some(id) = el.attr("id") {
                plain.push(format!("#{}", css_ident(id)));
            }
            if let Some(classes) = class_chain(el) {
                plain.push(format!(".{}", classes));
            }

            if !keywords.is_empty()
                && matches_keywords(el, &keywords)
                && let Some(selector) = semantic_selector(el, &keywords)
            {
                semantic.push(selector);
            }

            if let Some(text) = el.short_text(cutoff) {
                plain.push(format!("{}:has-text(\"{}\")", el.tag, escape_double_quoted(text)));
            }
        }

        debug!(
            "Generated {} semantic and {} plain CSS candidates for '{}'",
            semantic.len(),
            plain.len(),
            failed_selector
        );
        dedup_with_limit(semantic.into_iter().chain(plain), limit)
    }

    /// Ordered, unique XPath candidates, one per stable attribute plus text forms.
    pub fn generate_xpath(&self, elements: &[ElementDescriptor], limit: usize) -> Vec<String> {
        let cutoff = self.config.text_length_cutoff;
        let mut xpaths = Vec::new();

        for el in elements {
            for attr in ["id", "data-testid", "aria-label", "role"] {
                if let Some(value) = el.attr(attr) {
                    xpaths.push(format!("//*[@{}={}]", attr, xpath_literal(value)));
                }
            }
            let classes = el.classes();
            if !classes.is_empty() {
                xpaths.push(format!("//*[@class={}]", xpath_literal(&classes.join(" "))));
            }
            if let Some(text) = el.short_text(cutoff) {
                let literal = xpath_literal(text);
                xpaths.push(format!("//{}[contains(text(), {})]", el.tag, literal));
                xpaths.push(format!("//{}[text()={}]", el.tag, literal));
            }
            if let Some(name) = el.attr("name") {
                xpaths.push(format!("//*[@name={}]", xpath_literal(name)));
            }
            if el.tag == "input"
                && let Some(input_type) = el.attr("type")
            {
                xpaths.push(format!("//input[@type={}]", xpath_literal(input_type)));
            }
            for attr in ["placeholder", "alt", "title"] {
                if let Some(value) = el.attr(attr) {
                    xpaths.push(format!("//*[@{}={}]", attr, xpath_literal(value)));
                }
            }
        }

        dedup_with_limit(xpaths, limit)
    }
}

/// Keep the first occurrence of each string, stopping at `limit`.
pub fn dedup_with_limit<I>(selectors: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for selector in selectors {
        if out.len() >= limit {
            break;
        }
        if seen.insert(selector.clone()) {
            out.push(selector);
        }
    }
    out
}

fn class_chain(el: &ElementDescriptor) -> Option<String> {
    let classes: Vec<String> = el.classes().into_iter().map(css_ident).collect();
    if classes.is_empty() {
        None
    } else {
        Some(classes.join("."))
    }
}

fn matches_keywords(el: &ElementDescriptor, keywords: &[String]) -> bool {
    let haystacks = [
        el.text.to_lowercase(),
        el.attr("aria-label").unwrap_or_default().to_lowercase(),
        el.attr("title").unwrap_or_default().to_lowercase(),
        el.attr("alt").unwrap_or_default().to_lowercase(),
    ];
    keywords
        .iter()
        .any(|k| haystacks.iter().any(|h| h.contains(k.as_str())))
}

/// testid/id > class + aria-label > class > tag + aria-label > tag + title
fn semantic_selector(el: &ElementDescriptor, keywords: &[String]) -> Option<String> {
    if let Some(testid) = el.attr("data-testid") {
        return Some(format!("[data-testid={}]", css_string(testid)));
    }
    if let Some(id) = el.attr("id") {
        return Some(format!("#{}", css_ident(id)));
    }

    let classes = class_chain(el);
    let aria_label = el.attr("aria-label");

    match (classes, aria_label) {
        (Some(classes), Some(label)) => Some(format!(
            "{}.{}{}",
            el.tag,
            classes,
            attribute_match("aria-label", label, keywords)
        )),
        (Some(classes), None) => Some(format!("{}.{}", el.tag, classes)),
        (None, Some(label)) => Some(format!(
            "{}{}",
            el.tag,
            attribute_match("aria-label", label, keywords)
        )),
        (None, None) => el
            .attr("title")
            .map(|title| format!("{}{}", el.tag, attribute_match("title", title, keywords))),
    }
}

/// `[attr*='phrase']` over the span covering the matched keywords, or an exact
/// match on the whole value when no keyword occurs in it.
fn attribute_match(attr: &str, value: &str, keywords: &[String]) -> String {
    match keyword_phrase(value, keywords) {
        Some(phrase) => format!("[{}*={}]", attr, css_string(phrase)),
        None => format!("[{}={}]", attr, css_string(value)),
    }
}

fn keyword_phrase<'v>(value: &'v str, keywords: &[String]) -> Option<&'v str> {
    let lower = value.to_lowercase();
    // Byte offsets only carry over when lowercasing preserved the layout
    if lower.len() != value.len() {
        return None;
    }

    let mut span: Option<(usize, usize)> = None;
    for keyword in keywords {
        if let Some(start) = lower.find(keyword.as_str()) {
            let end = start + keyword.len();
            span = Some(match span {
                Some((s, e)) => (s.min(start), e.max(end)),
                None => (start, end),
            });
        }
    }

    let (start, end) = span?;
    if value.is_char_boundary(start) && value.is_char_boundary(end) {
        Some(&value[start..end])
    } else {
        None
    }
}

/// Quote a value as a CSS string literal.
pub fn css_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// Escape a value for use as a CSS identifier (`#id`, `.class`).
pub fn css_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        if i == 0 && c.is_ascii_digit() {
            out.push_str(&format!("\\3{} ", c));
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Quote a value as an XPath string literal, falling back to `concat()` when it
/// contains both quote kinds.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

fn escape_double_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
#[path = "generator_test.rs"]
mod generator_test;
