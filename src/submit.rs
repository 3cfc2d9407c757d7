//! Submission Controller: fill the code input and trigger the real submit
//! control, never a decoy.
//!
//! Submit preference order: a control scoped to the code-entry section, then
//! the page's default submit key (Enter), then a global ordered list of
//! submit-like labels with known trap phrases excluded. Returns true once a
//! fill + submit action has been dispatched; whether the site accepted the
//! code is the advancement confirmer's business.

use crate::driver::Driver;
use crate::site::{
    CODE_INPUT_SELECTORS, CODE_SECTION_MARKERS, DECOY_BUTTON_LABELS, SUBMIT_BUTTON_LABELS,
};
use serde_json::Value;
use tracing::debug;

fn fill_input_js(code: &str) -> String {
    format!(
        r#"(() => {{
            const code = {code};
            const selectors = {selectors};
            for (const sel of selectors) {{
                const inp = document.querySelector(sel);
                if (!inp || inp.offsetParent === null) continue;
                inp.focus();
                inp.value = '';
                inp.value = code;
                inp.dispatchEvent(new Event('input', {{ bubbles: true }}));
                inp.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return sel;
            }}
            return null;
        }})()"#,
        code = serde_json::to_string(code).unwrap_or_default(),
        selectors = serde_json::to_string(CODE_INPUT_SELECTORS).unwrap_or_default(),
    )
}

fn section_submit_js() -> String {
    format!(
        r#"(() => {{
            const markers = {markers};
            for (const c of document.querySelectorAll('div, form, section')) {{
                const text = c.textContent || '';
                if (!markers.some(m => text.includes(m))) continue;
                for (const b of c.querySelectorAll('button, [role="button"]')) {{
                    if ((b.textContent || '').toLowerCase().includes('submit code')) {{
                        b.click();
                        return true;
                    }}
                }}
            }}
            return false;
        }})()"#,
        markers = serde_json::to_string(CODE_SECTION_MARKERS).unwrap_or_default(),
    )
}

fn global_submit_js() -> String {
    format!(
        r#"(() => {{
            const labels = {labels};
            const decoys = {decoys};
            const nodes = document.querySelectorAll(
                'button, [role="button"], a, input[type="submit"]');
            for (const label of labels) {{
                for (const n of nodes) {{
                    const text = (n.textContent || n.value || '').trim();
                    if (decoys.some(d => d.toLowerCase() === text.toLowerCase())) continue;
                    if (text.toLowerCase().includes(label.toLowerCase())) {{
                        n.click();
                        return text;
                    }}
                }}
            }}
            return null;
        }})()"#,
        labels = serde_json::to_string(SUBMIT_BUTTON_LABELS).unwrap_or_default(),
        decoys = serde_json::to_string(DECOY_BUTTON_LABELS).unwrap_or_default(),
    )
}

/// Some stages gate the submit on a radio/label marked "Correct"; pick it if
/// present. Best effort.
const CORRECT_OPTION_JS: &str = r#"(() => {
    for (const el of document.querySelectorAll('label, input[type="radio"]')) {
        const text = el.tagName === 'LABEL'
            ? (el.textContent || '')
            : (el.getAttribute('value') || '');
        if (/correct/i.test(text) && !/incorrect/i.test(text)) {
            el.click();
            return true;
        }
    }
    return false;
})()"#;

/// Click the stage's correct-option control when one exists.
pub async fn pick_correct_option<D: Driver>(driver: &D) {
    match driver.evaluate(CORRECT_OPTION_JS).await {
        Ok(Value::Bool(true)) => driver.wait_ms(50).await,
        Ok(_) => {}
        Err(e) => debug!("correct-option pick failed: {e}"),
    }
}

/// Fill the located code input with `code` and dispatch a submit action.
/// Returns false only when no fillable input was found; driver faults are
/// downgraded with a log line.
pub async fn submit<D: Driver>(driver: &D, code: &str) -> bool {
    let filled = match driver.evaluate(&fill_input_js(code)).await {
        Ok(Value::String(selector)) => selector,
        Ok(_) => {
            debug!("submit: no fillable code input found");
            return false;
        }
        Err(e) => {
            debug!("submit: fill failed: {e}");
            return false;
        }
    };
    debug!("submit: filled {filled}");
    driver.wait_ms(50).await;

    // Prefer the submit button scoped to the code-entry section; a global
    // click could land on an unrelated decoy.
    match driver.evaluate(&section_submit_js()).await {
        Ok(Value::Bool(true)) => {
            driver.wait_ms(100).await;
            return true;
        }
        Ok(_) => {}
        Err(e) => debug!("submit: section submit failed: {e}"),
    }

    if let Err(e) = driver.press_key("Enter").await {
        debug!("submit: enter press failed: {e}");
    }
    driver.wait_ms(100).await;

    match driver.evaluate(&global_submit_js()).await {
        Ok(Value::String(label)) => debug!("submit: clicked global control '{label}'"),
        Ok(_) => {}
        Err(e) => debug!("submit: global submit failed: {e}"),
    }
    // Fill plus Enter already dispatched a submission even if no button hit.
    true
}
