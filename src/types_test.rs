// Unit tests for types module

use super::*;

fn weights() -> ScoringWeights {
    ScoringWeights::default()
}

fn candidate(selector: &str, base: f64) -> Candidate {
    Candidate::new(
        selector,
        SelectorKind::detect(selector),
        base,
        1.0,
        0.5,
        Validation::Present,
        &weights(),
    )
}

#[test]
fn test_selector_kind_detect() {
    assert_eq!(SelectorKind::detect("//*[@id='x']"), SelectorKind::Xpath);
    assert_eq!(SelectorKind::detect("/html/body/div[2]"), SelectorKind::Xpath);
    assert_eq!(SelectorKind::detect("(//a)[1]"), SelectorKind::Xpath);
    assert_eq!(SelectorKind::detect("div[@class='x']"), SelectorKind::Xpath);
    assert_eq!(SelectorKind::detect("#submit"), SelectorKind::Css);
    assert_eq!(SelectorKind::detect("a.cta_button[aria-label^='Watch']"), SelectorKind::Css);
    // Slashes inside a quoted value do not make it XPath
    assert_eq!(SelectorKind::detect("a[href='//cdn.example.com']"), SelectorKind::Css);
}

#[test]
fn test_strip_quoted() {
    assert_eq!(strip_quoted("a[title='x.y z']"), "a[title='']");
    assert_eq!(strip_quoted(r#"b:has-text("Go #1")"#), r#"b:has-text("")"#);
    assert_eq!(strip_quoted(r"p[title='it\'s']"), "p[title='']");
}

#[test]
fn test_selector_type_flags() {
    assert!(SelectorType::Mixed.wants_css() && SelectorType::Mixed.wants_xpath());
    assert!(SelectorType::Css.wants_css() && !SelectorType::Css.wants_xpath());
    assert!(!SelectorType::Xpath.wants_css() && SelectorType::Xpath.wants_xpath());
    assert_eq!(SelectorType::default(), SelectorType::Mixed);
}

#[test]
fn test_element_descriptor_helpers() {
    let mut attributes = BTreeMap::new();
    attributes.insert("class".to_string(), "  btn   primary ".to_string());
    attributes.insert("title".to_string(), "   ".to_string());
    let el = ElementDescriptor {
        tag: "button".to_string(),
        attributes,
        text: "Submit".to_string(),
        derived_selector: "button.btn.primary".to_string(),
        derived_xpath: None,
    };

    assert_eq!(el.classes(), vec!["btn", "primary"]);
    assert_eq!(el.attr("title"), None);
    assert_eq!(el.attr("id"), None);
    assert_eq!(el.short_text(60), Some("Submit"));
    assert_eq!(el.short_text(6), None);
}

#[test]
fn test_element_descriptor_accepts_extractor_keys() {
    let el: ElementDescriptor = serde_json::from_value(serde_json::json!({
        "tag": "button",
        "text": "Submit",
        "selector": "#submit-btn",
        "xpath": "//*[@id='submit-btn']"
    }))
    .unwrap();

    assert_eq!(el.derived_selector, "#submit-btn");
    assert_eq!(el.derived_xpath.as_deref(), Some("//*[@id='submit-btn']"));
    assert!(el.attributes.is_empty());
}

#[test]
fn test_validation_values() {
    assert_eq!(Validation::Absent.value(), 0.0);
    assert_eq!(Validation::Unchecked.value(), 0.5);
    assert_eq!(Validation::Present.value(), 1.0);
}

#[test]
fn test_candidate_final_score_is_derived() {
    let c = candidate("#a", 0.5);
    let expected = 0.5 * 0.3 + 1.0 * 0.4 + 0.5 * 0.3;
    assert!((c.final_score() - expected).abs() < 1e-9);

    let absent = Candidate::new("#b", SelectorKind::Css, 0.8, 1.0, 1.0, Validation::Absent, &weights());
    assert!((absent.final_score() - 0.08).abs() < 1e-9);
}

#[test]
fn test_candidate_set_dedup_and_limit() {
    let mut set = CandidateSet::with_limit(2);
    assert!(set.push(candidate("#a", 0.5)));
    assert!(!set.push(candidate("#a", 0.9)));
    assert!(set.push(candidate("#A", 0.5)));
    assert!(set.is_full());
    assert!(!set.push(candidate("#c", 0.5)));

    let selectors: Vec<_> = set.iter().map(|c| c.selector()).collect();
    assert_eq!(selectors, vec!["#a", "#A"]);
    // First occurrence wins
    assert_eq!(set.iter().next().unwrap().base_confidence(), 0.5);
}

#[test]
fn test_heal_request_validation() {
    let empty_selector = HealRequest {
        failed_selector: "   ".to_string(),
        html: Some("<p>x</p>".to_string()),
        ..Default::default()
    };
    assert!(matches!(empty_selector.validate(), Err(HealerError::InvalidRequest(_))));

    let no_source = HealRequest {
        failed_selector: "#x".to_string(),
        html: Some("  ".to_string()),
        ..Default::default()
    };
    assert!(matches!(no_source.validate(), Err(HealerError::InvalidRequest(_))));

    let empty_list = HealRequest {
        failed_selector: "#x".to_string(),
        interactive_elements: Some(vec![]),
        ..Default::default()
    };
    assert!(empty_list.validate().is_ok());

    let bad_url = HealRequest {
        failed_selector: "#x".to_string(),
        html: Some("<p>x</p>".to_string()),
        page_url: Some("not a url".to_string()),
        ..Default::default()
    };
    assert!(bad_url.validate().is_err());
}

#[test]
fn test_heal_request_deserialize_defaults() {
    let req: HealRequest = serde_json::from_str(
        r##"{"failed_selector": "#old", "html": "<p></p>", "usage_hint": "  open menu "}"##,
    )
    .unwrap();
    assert_eq!(req.selector_type, SelectorType::Mixed);
    assert_eq!(req.usage_hint(), Some("open menu"));
    assert!(req.semantic_dom.is_none());
}

#[test]
fn test_candidate_report_rounding() {
    let ranked = RankedCandidate::local(candidate("#a", 0.33333));
    let report = CandidateReport::from(&ranked);
    assert_eq!(report.base_confidence, 0.333);
    assert_eq!(report.validation, Some(1.0));
    assert!(!report.llm_chosen);
}

#[test]
fn test_dom_source_preference() {
    let html_only = HealRequest {
        failed_selector: "#x".to_string(),
        html: Some("<p>x</p>".to_string()),
        ..Default::default()
    };
    assert!(matches!(html_only.dom_source(), Some(DomSource::Html(_))));
    assert!(!html_only.dom_source().unwrap().is_pre_extracted());

    let both = HealRequest {
        semantic_dom: Some(SemanticDom::default()),
        ..html_only.clone()
    };
    assert!(matches!(both.dom_source(), Some(DomSource::Semantic(_))));
    assert!(both.dom_source().unwrap().is_pre_extracted());

    assert!(HealRequest::default().dom_source().is_none());
}

#[test]
fn test_candidate_score_follows_its_parts() {
    let c = Candidate::new(
        "#go",
        SelectorKind::Css,
        1.4,
        0.9,
        0.2,
        Validation::Absent,
        &weights(),
    );
    assert_eq!(c.selector(), "#go");
    assert_eq!(c.kind(), SelectorKind::Css);
    // Base confidence is clamped before the score is derived
    assert_eq!(c.base_confidence(), 1.0);
    assert_eq!(
        c.final_score(),
        crate::scorer::final_score(
            c.base_confidence(),
            c.stability(),
            c.semantic(),
            c.validation(),
            &weights()
        )
    );
    assert!((c.final_score() - 0.1).abs() < 1e-9);
}
