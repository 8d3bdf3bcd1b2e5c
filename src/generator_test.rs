// Unit tests for generator module

use super::*;
use std::collections::BTreeMap;

fn element(tag: &str, attrs: &[(&str, &str)], text: &str) -> ElementDescriptor {
    let attributes: BTreeMap<String, String> = attrs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ElementDescriptor {
        tag: tag.to_string(),
        attributes,
        text: text.to_string(),
        derived_selector: tag.to_string(),
        derived_xpath: None,
    }
}

fn webinar_link() -> ElementDescriptor {
    element(
        "a",
        &[("class", "cta_button"), ("aria-label", "Watch the webinar now")],
        "Watch the webinar",
    )
}

#[test]
fn test_keywords() {
    let config = HealerConfig::default();
    let generator = CandidateGenerator::new(&config);

    assert_eq!(generator.keywords("Click on the Submit button!"), vec!["submit"]);
    assert_eq!(generator.keywords("watch the webinar"), vec!["watch", "webinar"]);
    assert!(generator.keywords("to a of").is_empty());
}

#[test]
fn test_semantic_candidate_comes_first() {
    let config = HealerConfig::default();
    let generator = CandidateGenerator::new(&config);
    let elements = vec![
        element("button", &[("id", "menu")], "Menu"),
        webinar_link(),
    ];

    let css = generator.generate_css(
        &elements,
        "a.cta_button[aria-label^='Watch the webinar']",
        Some("watch the webinar"),
        40,
    );

    assert_eq!(css[0], "a.cta_button[aria-label*='Watch the webinar']");
    assert_eq!(
        &css[1..],
        &[
            "#menu",
            "button:has-text(\"Menu\")",
            ".cta_button",
            "a:has-text(\"Watch the webinar\")",
        ]
    );
}

#[test]
fn test_no_hint_means_no_semantic_candidates() {
    let config = HealerConfig::default();
    let generator = CandidateGenerator::new(&config);

    let css = generator.generate_css(&[webinar_link()], "#old", None, 40);
    assert_eq!(css, vec![".cta_button", "a:has-text(\"Watch the webinar\")"]);
}

#[test]
fn test_semantic_priority_falls_through() {
    let config = HealerConfig::default();
    let generator = CandidateGenerator::new(&config);
    let hint = Some("open settings");

    let with_testid = element(
        "button",
        &[("data-testid", "settings"), ("id", "s"), ("class", "btn")],
        "Settings",
    );
    let aria_only = element("button", &[("aria-label", "Open Settings panel")], "");
    let title_only = element("span", &[("title", "Settings")], "");

    let css = generator.generate_css(&[with_testid], "#x", hint, 40);
    assert_eq!(css[0], "[data-testid='settings']");

    let css = generator.generate_css(&[aria_only], "#x", hint, 40);
    assert_eq!(css, vec!["button[aria-label*='Open Settings']"]);

    let css = generator.generate_css(&[title_only], "#x", hint, 40);
    assert_eq!(css, vec!["span[title*='Settings']"]);
}

#[test]
fn test_keyword_only_in_text_uses_exact_label() {
    let config = HealerConfig::default();
    let generator = CandidateGenerator::new(&config);
    let el = element("a", &[("aria-label", "Primary action")], "Checkout");

    let css = generator.generate_css(&[el], "#x", Some("checkout"), 40);
    assert_eq!(css[0], "a[aria-label='Primary action']");
}

#[test]
fn test_css_dedup_and_limit() {
    let config = HealerConfig::default();
    let generator = CandidateGenerator::new(&config);
    let elements = vec![
        element("a", &[("class", "nav")], ""),
        element("a", &[("class", "nav")], ""),
        element("a", &[("class", "footer")], ""),
        element("a", &[("class", "legal")], ""),
    ];

    let css = generator.generate_css(&elements, "#x", None, 2);
    assert_eq!(css, vec![".nav", ".footer"]);
}

#[test]
fn test_long_text_is_not_a_candidate() {
    let config = HealerConfig::default();
    let generator = CandidateGenerator::new(&config);
    let long = "x".repeat(60);
    let el = element("p", &[], &long);

    assert!(generator.generate_css(&[el.clone()], "#x", None, 40).is_empty());
    assert!(generator.generate_xpath(&[el], 20).is_empty());
}

#[test]
fn test_xpath_order() {
    let config = HealerConfig::default();
    let generator = CandidateGenerator::new(&config);

    let xpaths = generator.generate_xpath(&[webinar_link()], 20);
    assert_eq!(
        xpaths,
        vec![
            "//*[@aria-label='Watch the webinar now']",
            "//*[@class='cta_button']",
            "//a[contains(text(), 'Watch the webinar')]",
            "//a[text()='Watch the webinar']",
        ]
    );
}

#[test]
fn test_xpath_input_type_only_for_inputs() {
    let config = HealerConfig::default();
    let generator = CandidateGenerator::new(&config);
    let input = element("input", &[("type", "email"), ("name", "email"), ("placeholder", "Email")], "");
    let button = element("button", &[("type", "submit")], "");

    let xpaths = generator.generate_xpath(&[input, button], 20);
    assert_eq!(
        xpaths,
        vec![
            "//*[@name='email']",
            "//input[@type='email']",
            "//*[@placeholder='Email']",
        ]
    );
}

#[test]
fn test_dedup_with_limit() {
    let out = dedup_with_limit(
        ["a", "b", "a", "c", "d"].iter().map(|s| s.to_string()),
        3,
    );
    assert_eq!(out, vec!["a", "b", "c"]);
}

#[test]
fn test_css_string_escaping() {
    assert_eq!(css_string("plain"), "'plain'");
    assert_eq!(css_string("it's"), r"'it\'s'");
    assert_eq!(css_string(r"a\b"), r"'a\\b'");
}

#[test]
fn test_css_ident_escaping() {
    assert_eq!(css_ident("submit-btn"), "submit-btn");
    assert_eq!(css_ident("a:b"), r"a\:b");
    assert_eq!(css_ident("9lives"), r"\39 lives");
}

#[test]
fn test_xpath_literal_quoting() {
    assert_eq!(xpath_literal("Save"), "'Save'");
    assert_eq!(xpath_literal("Don't"), "\"Don't\"");
    assert_eq!(
        xpath_literal(r#"Say "don't""#),
        r#"concat('Say "don', "'", 't"')"#
    );
}
