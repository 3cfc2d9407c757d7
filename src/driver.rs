//! Browser driver boundary.
//!
//! The engine is written against the small [`Driver`] trait so the
//! resolution logic can be exercised with a scripted driver in tests.
//! [`EokaDriver`] is the real implementation over [`eoka`].

use crate::Result;
use serde_json::Value;

/// The page primitives the engine needs. One logical page per run.
#[allow(async_fn_in_trait)]
pub trait Driver {
    /// Navigate the page to a URL.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Current page URL.
    async fn url(&self) -> Result<String>;

    /// Full visible body text (used for stage-label parsing and token scans).
    async fn body_text(&self) -> Result<String>;

    /// Evaluate a JS expression and return its JSON value.
    async fn evaluate(&self, js: &str) -> Result<Value>;

    /// Execute JS for its side effects.
    async fn execute(&self, js: &str) -> Result<()>;

    /// Click the first element matching a CSS selector, if present.
    async fn try_click(&self, selector: &str) -> Result<bool>;

    /// Click the first interactive element whose text contains `text`.
    async fn try_click_text(&self, text: &str) -> Result<bool>;

    /// Clear and fill an input located by CSS selector.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Press a keyboard key (e.g. "Enter", "Escape").
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Sleep for a number of milliseconds.
    async fn wait_ms(&self, ms: u64);

    /// PNG screenshot of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// Find an interactive element by contained text; returns a CSS selector.
const FIND_BY_TEXT_JS: &str = r#"(() => {
    const text = arguments[0];
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT, null);
    while (walker.nextNode()) {
        const el = walker.currentNode;
        if (el.textContent?.trim().toLowerCase().includes(text.toLowerCase())) {
            if (el.matches('a, button, input, select, [role="button"], [onclick]')) {
                if (el.id) return '#' + el.id;
                const path = [];
                let node = el;
                while (node && node !== document.body) {
                    let selector = node.tagName.toLowerCase();
                    if (node.id) {
                        path.unshift('#' + node.id);
                        break;
                    }
                    const siblings = Array.from(node.parentNode?.children || []);
                    const index = siblings.indexOf(node) + 1;
                    if (siblings.length > 1) selector += ':nth-child(' + index + ')';
                    path.unshift(selector);
                    node = node.parentNode;
                }
                return path.join(' > ');
            }
        }
    }
    return null;
})()"#;

/// Driver over a real Chromium page via [`eoka`].
pub struct EokaDriver {
    browser: eoka::Browser,
    page: eoka::Page,
}

impl EokaDriver {
    /// Launch a browser and open a blank page.
    pub async fn launch(headless: bool) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless,
            viewport_width: 1280,
            viewport_height: 720,
            ..Default::default()
        };
        let browser = eoka::Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;
        Ok(Self { browser, page })
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

impl Driver for EokaDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?)
    }

    async fn body_text(&self) -> Result<String> {
        Ok(self.page.text().await?)
    }

    async fn evaluate(&self, js: &str) -> Result<Value> {
        Ok(self.page.evaluate(js).await?)
    }

    async fn execute(&self, js: &str) -> Result<()> {
        self.page.execute(js).await?;
        Ok(())
    }

    async fn try_click(&self, selector: &str) -> Result<bool> {
        Ok(self.page.try_click(selector).await?)
    }

    async fn try_click_text(&self, text: &str) -> Result<bool> {
        let js = FIND_BY_TEXT_JS.replace(
            "arguments[0]",
            &serde_json::to_string(text).unwrap_or_default(),
        );
        let found: Option<String> = serde_json::from_value(self.page.evaluate(&js).await?)?;
        match found {
            Some(selector) => Ok(self.page.try_click(&selector).await?),
            None => Ok(false),
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.page.fill(selector, "").await?;
        self.page.fill(selector, value).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.page.human().press_key(key).await?;
        Ok(())
    }

    async fn wait_ms(&self, ms: u64) {
        self.page.wait(ms).await;
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }
}
