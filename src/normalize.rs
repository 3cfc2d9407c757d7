//! Best-effort UI normalization: peel cookie banners and promotional popups
//! so the stage content is reachable, and resolve the "Please Select an
//! Option" modal.
//!
//! Everything here is idempotent and non-failing; a popup we cannot close is
//! left for the next round. Popups that announce a fake close button get
//! only their safe dismiss affordances clicked.

use crate::driver::Driver;
use serde_json::Value;
use tracing::debug;

/// Close the topmost overlay: cookie consent first (it intercepts every
/// click), then dialog-ish containers. Skips the choice modal, which
/// [`resolve_choice_modal`] owns. Returns whether anything was clicked.
const CLOSE_TOPMOST_JS: &str = r#"(() => {
    const clickIn = (root, names) => {
        for (const name of names) {
            for (const b of root.querySelectorAll('button, [role="button"], a')) {
                const text = (b.textContent || '').trim().toLowerCase();
                if (text && text.includes(name.toLowerCase())) {
                    b.click();
                    return true;
                }
            }
        }
        return false;
    };
    // Cookie consent overlay.
    for (const c of document.querySelectorAll(
        'div, [role=dialog], [class*="modal"], [class*="popup"], [class*="overlay"]')) {
        const text = (c.textContent || '');
        if (/cookie\s*consent|we use cookies/i.test(text)) {
            if (clickIn(c, ['Accept All', 'Accept', 'Allow', 'I agree', 'Got it', 'Close'])) {
                return true;
            }
        }
    }
    // Topmost dialog-like container.
    const selectors = ['[role=dialog]', '[class*="modal"]', '[class*="popup"]', '[class*="overlay"]'];
    for (const sel of selectors) {
        const dialogs = document.querySelectorAll(sel);
        if (!dialogs.length) continue;
        const top = dialogs[dialogs.length - 1];
        const text = (top.textContent || '').toLowerCase();
        if (text.includes('select an option') || text.includes('select your choice')) continue;
        const fakeClose = (text.includes('fake') && text.includes('close'))
            || (text.includes('important') && text.includes('note'));
        if (fakeClose) {
            // The X is a trap; only the polite dismissals are real.
            if (clickIn(top, ['Dismiss', 'Got it', 'OK', 'I understand', 'Continue'])) return true;
            continue;
        }
        if (clickIn(top, ['Close', 'Dismiss', '×', '✕'])) return true;
    }
    return false;
})()"#;

/// Dismiss overlays for up to `rounds` rounds, with an Escape press between
/// rounds. Stops early once a round closes nothing.
pub async fn dismiss_overlays<D: Driver>(driver: &D, rounds: u32) {
    for _ in 0..rounds {
        let closed = match driver.evaluate(CLOSE_TOPMOST_JS).await {
            Ok(Value::Bool(b)) => b,
            Ok(_) => false,
            Err(e) => {
                debug!("overlay dismissal failed: {e}");
                false
            }
        };
        if !closed {
            break;
        }
        let _ = driver.press_key("Escape").await;
        driver.wait_ms(40).await;
    }
}

/// Resolve the "Please Select an Option" modal: scroll it, pick the correct
/// option, and click Submit inside the modal only (the background holds
/// decoy submit buttons). Returns whether the modal was found and handled.
const CHOICE_MODAL_JS: &str = r#"(() => {
    let dialog = null;
    for (const c of document.querySelectorAll(
        '[role=dialog], [class*="modal"], [class*="popup"], div, section')) {
        if (/please select an option|select your choice|select an option/i.test(c.textContent || '')) {
            dialog = c;
            break;
        }
    }
    if (!dialog) return false;
    dialog.scrollTop = dialog.scrollHeight;
    const semantic = dialog.querySelector('[data-correct="true"], [aria-selected="true"]');
    if (semantic) semantic.click();
    else {
        for (const opt of dialog.querySelectorAll('label, input[type="radio"], [role="radio"]')) {
            const text = opt.tagName === 'INPUT'
                ? (opt.getAttribute('value') || '')
                : (opt.textContent || '');
            if (/correct|the right choice/i.test(text) && !/incorrect/i.test(text)) {
                opt.click();
                break;
            }
        }
    }
    for (const b of dialog.querySelectorAll('button, [role="button"]')) {
        if (/submit/i.test(b.textContent || '')) {
            b.click();
            return true;
        }
    }
    return false;
})()"#;

pub async fn resolve_choice_modal<D: Driver>(driver: &D) -> bool {
    match driver.evaluate(CHOICE_MODAL_JS).await {
        Ok(Value::Bool(handled)) => {
            if handled {
                driver.wait_ms(100).await;
            }
            handled
        }
        Ok(_) => false,
        Err(e) => {
            debug!("choice modal handling failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use serde_json::json;

    #[tokio::test]
    async fn dismissal_stops_when_nothing_closes() {
        let driver = MockDriver::default();
        dismiss_overlays(&driver, 3).await;
        assert!(driver.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dismissal_presses_escape_between_rounds() {
        let driver = MockDriver::default();
        driver.answer("fakeClose", json!(true));
        dismiss_overlays(&driver, 2).await;
        assert_eq!(driver.keys.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn choice_modal_reports_handled() {
        let driver = MockDriver::default();
        driver.answer("please select an option", json!(true));
        assert!(resolve_choice_modal(&driver).await);
    }
}
