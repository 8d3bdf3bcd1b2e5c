// Unit tests for scorer module

use super::*;

const PAGE: &str = r#"<html><body>
<form id="login-form">
  <input name="email" type="email">
  <button data-testid="submit-btn" class="btn primary">Sign in</button>
</form>
<a class="cta_button" aria-label="Watch the webinar now">Watch the webinar</a>
</body></html>"#;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_stability_clean_selectors() {
    let config = HealerConfig::default();
    assert_eq!(stability("[data-testid='submit-btn']", SelectorKind::Css, &config), 1.0);
    assert_eq!(stability("//*[@id='login-form']", SelectorKind::Xpath, &config), 1.0);
}

#[test]
fn test_stability_penalties() {
    let config = HealerConfig::default();

    assert!(close(stability(".css-1q2w3e4", SelectorKind::Css, &config), 0.5));
    assert!(close(stability("ul li:nth-child(2)", SelectorKind::Css, &config), 0.85));
    assert!(close(stability("main div ul li a", SelectorKind::Css, &config), 0.9));
    assert!(close(
        stability("/html/body/div[2]/ul/li", SelectorKind::Xpath, &config),
        0.65
    ));
    assert!(close(
        stability("//a[contains(text(), 'Watch')]", SelectorKind::Xpath, &config),
        0.9
    ));
}

#[test]
fn test_stability_floor() {
    let config = HealerConfig::default();
    let score = stability(
        "/html/body/div[3]/div[1]/span[2]/a[contains(text(), 'a3f9c2d1e8b7')][1]",
        SelectorKind::Xpath,
        &config,
    );
    assert!(score >= 0.0);
    assert!(close(score, 0.05));
}

#[test]
fn test_css_depth_ignores_quoted_and_bracketed_spaces() {
    let config = HealerConfig::default();
    let selector = "a.cta_button[aria-label*='Watch the webinar now please']";
    assert_eq!(stability(selector, SelectorKind::Css, &config), 1.0);
}

#[test]
fn test_css_depth_counts_descendant_levels_only() {
    let config = HealerConfig::default();
    let css = |selector| stability(selector, SelectorKind::Css, &config);

    // Child and sibling combinators stay on one level
    assert_eq!(css("a>b>c>d"), 1.0);
    assert_eq!(css("form > div > label + input ~ span"), 1.0);
    assert_eq!(css("div ul li"), 1.0);

    assert!(close(css("div ul li a span"), 0.9));
    assert!(close(css("main section > div ul a"), 0.9));
    // The deepest member of a list decides
    assert!(close(css("#go, div ul li a"), 0.9));
}

#[test]
fn test_semantic_css_weights() {
    assert!(close(semantic("[data-testid='submit-btn']", SelectorKind::Css), 0.4));
    assert!(close(semantic("#login-form", SelectorKind::Css), 0.2));
    assert!(close(semantic(".cta_button", SelectorKind::Css), 0.1));
    assert!(close(
        semantic("a.cta_button[aria-label*='Watch the webinar']", SelectorKind::Css),
        0.4
    ));
    assert!(close(semantic("button:has-text(\"Go\")", SelectorKind::Css), 0.2));
    // Markers inside quoted values do not count
    assert!(close(semantic("[title='see #1 v2.0']", SelectorKind::Css), 0.15));
}

#[test]
fn test_semantic_xpath_weights() {
    assert!(close(semantic("//*[@data-testid='x']", SelectorKind::Xpath), 0.4));
    assert!(close(semantic("//*[@id='x']", SelectorKind::Xpath), 0.15));
    assert!(close(semantic("//a[text()='Go']", SelectorKind::Xpath), 0.2));
}

#[test]
fn test_semantic_is_capped() {
    let selector = "#a.b[data-testid='x'][aria-label='y'][role='z'][alt='w']:has-text(\"v\")";
    assert_eq!(semantic(selector, SelectorKind::Css), 1.0);
}

#[test]
fn test_validate_css_against_page() {
    let config = HealerConfig::default();
    let scorer = Scorer::new(&config, Some(PAGE));

    assert_eq!(scorer.validate("[data-testid='submit-btn']", SelectorKind::Css), Validation::Present);
    assert_eq!(scorer.validate("button.btn.primary", SelectorKind::Css), Validation::Present);
    assert_eq!(scorer.validate("#missing", SelectorKind::Css), Validation::Absent);
    assert_eq!(scorer.validate("a[[broken", SelectorKind::Css), Validation::Absent);
}

#[test]
fn test_validate_rejects_engine_specific_syntax() {
    let config = HealerConfig::default();
    let scorer = Scorer::new(&config, Some(PAGE));

    assert_eq!(scorer.validate("button:has-text(\"Sign in\")", SelectorKind::Css), Validation::Absent);
    assert_eq!(scorer.validate("form >> button", SelectorKind::Css), Validation::Absent);
    assert_eq!(scorer.validate("a[text()='Watch']", SelectorKind::Css), Validation::Absent);
}

#[test]
fn test_validate_neutral_cases() {
    let config = HealerConfig::default();

    let with_html = Scorer::new(&config, Some(PAGE));
    assert_eq!(with_html.validate("//*[@id='nope']", SelectorKind::Xpath), Validation::Unchecked);

    let without_html = Scorer::new(&config, None);
    assert_eq!(without_html.validate("#missing", SelectorKind::Css), Validation::Unchecked);
    assert_eq!(
        without_html.validate("button:has-text(\"x\")", SelectorKind::Css),
        Validation::Unchecked
    );
}

#[test]
fn test_final_score_absent_cap() {
    let weights = ScoringWeights::default();
    for base in [0.0, 0.25, 0.5, 0.9, 1.0] {
        let score = final_score(base, 1.0, 1.0, Validation::Absent, &weights);
        assert!(score <= 0.1 * base + 1e-12);
    }
}

#[test]
fn test_final_score_weighted_sum() {
    let weights = ScoringWeights::default();
    assert!(close(final_score(0.5, 1.0, 0.4, Validation::Present, &weights), 0.67));
    assert!(close(final_score(0.5, 1.0, 0.1, Validation::Unchecked, &weights), 0.58));
}

#[test]
fn test_score_webinar_candidates() {
    let config = HealerConfig::default();
    let scorer = Scorer::new(&config, Some(PAGE));

    let semantic = scorer.score("a.cta_button[aria-label*='Watch the webinar']", 0.5);
    let plain = scorer.score(".cta_button", 0.5);

    assert_eq!(semantic.validation(), Validation::Present);
    assert!(close(semantic.final_score(), 0.67));
    assert!(close(plain.final_score(), 0.58));
    assert!(semantic.final_score() > plain.final_score());
}

#[test]
fn test_testid_beats_class_semantically() {
    let config = HealerConfig::default();
    let scorer = Scorer::new(&config, Some(PAGE));

    let testid = scorer.score("[data-testid='submit-btn']", 0.5);
    let class = scorer.score(".btn", 0.5);
    assert!(testid.semantic() > class.semantic());
    assert_eq!(testid.kind(), SelectorKind::Css);
}
