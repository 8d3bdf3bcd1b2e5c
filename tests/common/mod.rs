// Common test utilities and fixtures

use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory holding a healing memory file
#[allow(dead_code)]
pub fn create_temp_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("healings.json");
    (temp_dir, path)
}

/// HTML pages for healing scenarios
pub mod fixtures {
    pub const WEBINAR_PAGE: &str = r#"
    <!DOCTYPE html>
    <html>
    <head><title>Events</title></head>
    <body>
        <nav><a href="/" class="nav-link">Home</a></nav>
        <a class="cta_button" aria-label="Watch the webinar now">Watch the webinar</a>
    </body>
    </html>
    "#;

    pub const WEBINAR_FAILED: &str = "a.cta_button[aria-label^='Watch the webinar']";
    pub const WEBINAR_HEALED: &str = "a.cta_button[aria-label*='Watch the webinar']";

    #[allow(dead_code)]
    pub const LOGIN_PAGE: &str = r#"
    <!DOCTYPE html>
    <html>
    <head><title>Login</title><script>window.tracking = "Log in";</script></head>
    <body>
        <form id="login">
            <input name="email" type="email" placeholder="Email address">
            <input name="password" type="password">
            <button class="css-1q2w3e4 primary" id="login-btn" data-testid="login-submit">Log in</button>
        </form>
    </body>
    </html>
    "#;

    #[allow(dead_code)]
    pub const MALFORMED_PAGE: &str = r#"<div class="shop"><button class="buy" title="Add to cart">Buy now<span>
        <p>unclosed <b>tags"#;
}
