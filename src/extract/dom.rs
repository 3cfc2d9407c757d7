//! DOM probe: the most expensive and least reliable source.
//!
//! Order of attack: a pre-filled code input, then a capped round of
//! reveal-style clicks, then data-/aria-attributes, then free text. The
//! click count is capped so repeated calls do not compound side effects.

use crate::driver::Driver;
use crate::site::code_shaped;
use crate::validate::is_valid_code;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// "click here 3 more times to reveal" sections want exactly this many.
const HIDDEN_REVEAL_CLICKS: usize = 3;

/// Pre-filled code input value, if any.
const INPUT_VALUE_JS: &str = r#"(() => {
    const inp = document.querySelector(
        'input[placeholder*="code" i], input[name*="code" i], input[id*="code" i]');
    if (inp && inp.value && inp.value.trim().length >= 6) return inp.value.trim();
    return null;
})()"#;

/// Walk the challenge section for data-code/data-value attributes and
/// aria labels carrying a code-shaped token.
const ATTRIBUTE_WALK_JS: &str = r#"(() => {
    const anchor = document.querySelector(
        '[class*="challenge" i], [data-code], [data-challenge]');
    const root = anchor || document.body;
    const walk = (el) => {
        if (!el || el.nodeType !== 1) return null;
        const c = el.getAttribute('data-code')
            || el.getAttribute('data-challenge-code')
            || el.getAttribute('data-value');
        if (c && /^[A-Za-z0-9_-]{6,}$/.test(c)) return c;
        const aria = (el.getAttribute('aria-label') || '') + ' '
            + (el.getAttribute('aria-description') || '');
        const m = aria.match(/[A-Za-z0-9_-]{6,}/g);
        if (m) {
            const hit = m.find(x => x.length >= 6 && x.length <= 12);
            if (hit) return hit;
        }
        for (const child of el.children) {
            const r = walk(child);
            if (r) return r;
        }
        return null;
    };
    return walk(root);
})()"#;

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_-]{6,}").unwrap())
}

/// Look for the stage code in the DOM. Every failure path is downgraded to
/// `None`; the probe never raises.
pub async fn probe<D: Driver>(driver: &D) -> Option<String> {
    if let Some(code) = read_input_value(driver).await {
        return Some(code);
    }

    scroll_bounce(driver).await;
    click_reveals(driver).await;

    if let Some(code) = read_attributes(driver).await {
        return Some(code);
    }
    if let Some(code) = read_input_value(driver).await {
        return Some(code);
    }
    scan_body_tokens(driver).await
}

async fn read_input_value<D: Driver>(driver: &D) -> Option<String> {
    // The input value is page-controlled free text; enforce the code charset
    // before the validator ever sees it.
    match driver.evaluate(INPUT_VALUE_JS).await {
        Ok(Value::String(s)) if code_shaped(&s, 6) && is_valid_code(&s) => {
            Some(s.trim().to_string())
        }
        Ok(_) => None,
        Err(e) => {
            debug!("dom probe: input value read failed: {e}");
            None
        }
    }
}

/// Scroll down then back up to trigger lazy content.
async fn scroll_bounce<D: Driver>(driver: &D) {
    let _ = driver
        .execute("window.scrollTo(0, document.body.scrollHeight)")
        .await;
    driver.wait_ms(100).await;
    let _ = driver.execute("window.scrollTo(0, 0)").await;
    driver.wait_ms(100).await;
}

/// Speculative reveal clicks, capped so the probe stays idempotent.
async fn click_reveals<D: Driver>(driver: &D) {
    // "Hidden DOM Challenge ... click here 3 more times to reveal"
    match driver.try_click_text("click here").await {
        Ok(true) => {
            for _ in 1..HIDDEN_REVEAL_CLICKS {
                let _ = driver.try_click_text("click here").await;
                driver.wait_ms(150).await;
            }
            driver.wait_ms(300).await;
        }
        Ok(false) => {}
        Err(e) => debug!("dom probe: reveal click failed: {e}"),
    }
    for label in crate::site::REVEAL_LABELS {
        if let Ok(true) = driver.try_click_text(label).await {
            driver.wait_ms(200).await;
            break;
        }
    }
}

async fn read_attributes<D: Driver>(driver: &D) -> Option<String> {
    match driver.evaluate(ATTRIBUTE_WALK_JS).await {
        Ok(Value::String(s)) if is_valid_code(&s) => Some(s.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            debug!("dom probe: attribute walk failed: {e}");
            None
        }
    }
}

/// Last resort: tokens out of the page's free text. Prefer tokens that look
/// like codes (contain a digit, or 6–8 uppercase letters), then accept any
/// token that survives the validator.
async fn scan_body_tokens<D: Driver>(driver: &D) -> Option<String> {
    let body = match driver.body_text().await {
        Ok(text) => text,
        Err(e) => {
            debug!("dom probe: body text read failed: {e}");
            return None;
        }
    };
    let tokens: Vec<&str> = token_pattern().find_iter(&body).map(|m| m.as_str()).collect();
    tokens
        .iter()
        .find(|t| t.len() <= 12 && code_like(t) && is_valid_code(t))
        .or_else(|| tokens.iter().find(|t| is_valid_code(t)))
        .map(|t| t.to_string())
}

/// Tokens with a digit, or short all-caps runs like `VRKT7A`, are much more
/// likely to be codes than prose words.
fn code_like(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        || ((6..=8).contains(&token.len())
            && token.chars().all(|c| c.is_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use serde_json::json;

    #[tokio::test]
    async fn prefilled_input_wins() {
        let driver = MockDriver::default();
        driver.answer("inp.value.trim().length", json!("PRE99XX"));
        assert_eq!(probe(&driver).await.as_deref(), Some("PRE99XX"));
        // No speculative clicks were needed.
        assert!(driver.text_clicks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn multibyte_prefilled_input_is_rejected() {
        let driver = MockDriver::default();
        driver.answer("inp.value.trim().length", json!("€€1234XX"));
        assert_eq!(probe(&driver).await, None);
    }

    #[tokio::test]
    async fn attribute_walk_is_second() {
        let driver = MockDriver::default();
        driver.answer("data-challenge-code", json!("ATTR7Z"));
        assert_eq!(probe(&driver).await.as_deref(), Some("ATTR7Z"));
    }

    #[tokio::test]
    async fn body_tokens_prefer_code_like() {
        let driver = MockDriver::with_body_texts([
            "Keep scrolling to find the button. Possibly VRKT7A hidden somewhere".to_string(),
        ]);
        assert_eq!(probe(&driver).await.as_deref(), Some("VRKT7A"));
    }

    #[tokio::test]
    async fn decoy_and_unit_tokens_are_skipped() {
        let driver = MockDriver::with_body_texts([
            "Continue Proceed 100ms 123456 Subscribe".to_string(),
        ]);
        assert_eq!(probe(&driver).await, None);
    }

    #[test]
    fn code_like_shapes() {
        assert!(code_like("VRKT7A"));
        assert!(code_like("abc123xyz"));
        assert!(code_like("ABCDEF"));
        assert!(!code_like("Proceed"));
        assert!(!code_like("ABCDEFGHI"));
    }
}
