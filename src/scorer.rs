//! Candidate scoring and validation.
//!
//! Each candidate gets three sub-scores in `[0, 1]`:
//!
//! - **stability**: how likely the selector survives a redeploy (volatile
//!   tokens, positional indexes and deep paths are penalised)
//! - **semantic**: how much meaning the selector carries (test ids, ARIA
//!   attributes, roles and text beat bare classes)
//! - **validation**: whether it matches anything in the page HTML
//!
//! The final score is a weighted sum, except that a selector known to match
//! nothing is capped at a tenth of its base confidence.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

use crate::config::{HealerConfig, ScoringWeights};
use crate::types::{Candidate, SelectorKind, Validation, strip_quoted};

lazy_static! {
    static ref XPATH_INDEX: Regex = Regex::new(r"\[\s*\d+\s*\]").unwrap();
}

/// Engine-specific syntax that standard CSS engines reject
const UNSUPPORTED_CSS: &[&str] = &[":has-text(", ":text(", ":contains(", "[text()=", "[text():", ">>"];

const CSS_SEMANTIC_WEIGHTS: &[(&str, f64)] = &[
    ("data-testid", 0.4),
    ("aria-", 0.3),
    (":has-text", 0.2),
    ("#", 0.2),
    ("[role", 0.2),
    ("[alt", 0.2),
    ("[title", 0.15),
    ("[name", 0.1),
    (".", 0.1),
];

const XPATH_SEMANTIC_WEIGHTS: &[(&str, f64)] = &[
    ("@data-testid", 0.4),
    ("@aria-", 0.3),
    ("@role", 0.2),
    ("text()", 0.2),
    ("@alt", 0.2),
    ("@id", 0.15),
    ("@title", 0.15),
    ("@name", 0.1),
];

/// Scores candidates against one page.
///
/// The HTML is parsed once; every candidate is validated against the same tree.
pub struct Scorer<'a> {
    config: &'a HealerConfig,
    document: Option<Html>,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a HealerConfig, html: Option<&str>) -> Self {
        Self {
            config,
            document: html.map(Html::parse_document),
        }
    }

    pub fn score(&self, selector: &str, base_confidence: f64) -> Candidate {
        let kind = SelectorKind::detect(selector);
        Candidate::new(
            selector,
            kind,
            base_confidence,
            stability(selector, kind, self.config),
            semantic(selector, kind),
            self.validate(selector, kind),
            &self.config.weights,
        )
    }

    /// Check a selector against the page. Only CSS is checked; XPath and
    /// requests without HTML stay neutral.
    pub fn validate(&self, selector: &str, kind: SelectorKind) -> Validation {
        let Some(document) = &self.document else {
            return Validation::Unchecked;
        };
        if kind == SelectorKind::Xpath {
            return Validation::Unchecked;
        }
        if has_unsupported_syntax(selector) {
            return Validation::Absent;
        }

        match Selector::parse(selector) {
            Ok(parsed) => {
                if document.select(&parsed).next().is_some() {
                    Validation::Present
                } else {
                    Validation::Absent
                }
            }
            Err(_) => Validation::Absent,
        }
    }
}

/// True for pseudo-syntax that only some automation engines understand.
pub fn has_unsupported_syntax(selector: &str) -> bool {
    let bare = strip_quoted(selector);
    UNSUPPORTED_CSS.iter().any(|token| bare.contains(token))
}

pub fn stability(selector: &str, kind: SelectorKind, config: &HealerConfig) -> f64 {
    let mut score: f64 = 1.0;

    if config.is_volatile(selector) {
        score -= 0.5;
    }

    let bare = strip_quoted(selector);
    match kind {
        SelectorKind::Css => {
            if bare.contains(":nth-") {
                score -= 0.15;
            }
            if css_descendant_depth(&bare) > 3 {
                score -= 0.1;
            }
        }
        SelectorKind::Xpath => {
            if XPATH_INDEX.is_match(&bare) {
                score -= 0.15;
            }
            if xpath_depth(&bare) > 4 {
                score -= 0.2;
            }
            if bare.contains("contains(text()") && !bare.contains('@') {
                score -= 0.1;
            }
        }
    }

    score.clamp(0.0, 1.0)
}

pub fn semantic(selector: &str, kind: SelectorKind) -> f64 {
    let bare = strip_quoted(selector);
    let weights = match kind {
        SelectorKind::Css => CSS_SEMANTIC_WEIGHTS,
        SelectorKind::Xpath => XPATH_SEMANTIC_WEIGHTS,
    };
    let total: f64 = weights
        .iter()
        .filter(|(token, _)| bare.contains(token))
        .map(|(_, weight)| weight)
        .sum();
    total.min(1.0)
}

pub fn final_score(
    base_confidence: f64,
    stability: f64,
    semantic: f64,
    validation: Validation,
    weights: &ScoringWeights,
) -> f64 {
    if validation == Validation::Absent {
        return 0.1 * base_confidence;
    }
    weights.base * base_confidence + weights.stability * stability + weights.semantic * semantic
}

#[derive(PartialEq)]
enum Gap {
    None,
    Descendant,
    Explicit,
}

/// Descendant levels, counting only whitespace combinators outside brackets and parens.
///
/// `>`, `+` and `~` stay on the same level. For a selector list the deepest member wins.
fn css_descendant_depth(bare: &str) -> usize {
    let mut deepest = 0usize;
    let mut levels = 0usize;
    let mut nesting = 0i32;
    let mut in_compound = false;
    let mut gap = Gap::None;

    for c in bare.chars() {
        if nesting <= 0 {
            match c {
                ' ' | '\t' | '\n' => {
                    in_compound = false;
                    if gap == Gap::None {
                        gap = Gap::Descendant;
                    }
                    continue;
                }
                '>' | '+' | '~' => {
                    in_compound = false;
                    gap = Gap::Explicit;
                    continue;
                }
                ',' => {
                    deepest = deepest.max(levels);
                    levels = 0;
                    in_compound = false;
                    gap = Gap::None;
                    continue;
                }
                _ => {}
            }
        }
        match c {
            '[' | '(' => nesting += 1,
            ']' | ')' => nesting -= 1,
            _ => {}
        }
        if !in_compound {
            if levels == 0 || gap == Gap::Descendant {
                levels += 1;
            }
            in_compound = true;
            gap = Gap::None;
        }
    }
    deepest.max(levels)
}

/// Location steps in an XPath, outside predicates.
fn xpath_depth(bare: &str) -> usize {
    let mut steps = 0usize;
    let mut nesting = 0i32;
    let mut in_step = false;

    for c in bare.chars() {
        match c {
            '[' | '(' => nesting += 1,
            ']' | ')' => nesting -= 1,
            '/' if nesting <= 0 => in_step = false,
            _ if nesting <= 0 => {
                if !in_step {
                    steps += 1;
                    in_step = true;
                }
            }
            _ => {}
        }
    }
    steps
}

#[cfg(test)]
#[path = "scorer_test.rs"]
mod scorer_test;
