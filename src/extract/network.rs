//! Network probe: a synchronous lookup against a run-scoped cache of codes
//! mined from JSON responses.
//!
//! The page's `fetch` and XHR are wrapped with a capture hook that appends
//! JSON response bodies to an in-page buffer; the orchestrator drains that
//! buffer between stages and feeds each body through the stage-table scanner.
//! The cache is owned by the run instance and is append-only for its
//! lifetime; the arbiter only ever reads it.

use crate::driver::Driver;
use crate::scan::scan_stage_table;
use crate::site::STAGE_COUNT;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Run-scoped stage→code cache fed by captured JSON responses.
#[derive(Debug, Default)]
pub struct NetworkCache {
    codes: HashMap<u32, String>,
}

impl NetworkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous cache read; this is the whole network probe.
    pub fn get(&self, stage: u32) -> Option<&str> {
        self.codes.get(&stage).map(String::as_str)
    }

    /// Mine one JSON response body for stage→code pairs. Entries are never
    /// evicted; first capture for a stage wins.
    pub fn absorb(&mut self, body: &Value) {
        for (stage, code) in scan_stage_table(body, STAGE_COUNT) {
            self.codes.entry(stage).or_insert(code);
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Wrap `fetch`/XHR so JSON response bodies accumulate in an in-page buffer.
/// Idempotent; safe to re-run after navigations.
const INSTALL_CAPTURE_JS: &str = r#"(() => {
    if (window.__netCapture) return;
    window.__netCapture = [];
    const push = (text) => {
        try {
            if (text && text.length < 200000) window.__netCapture.push(text);
        } catch (e) {}
    };
    const origFetch = window.fetch;
    if (origFetch) {
        window.fetch = function (...args) {
            return origFetch.apply(this, args).then((resp) => {
                try {
                    const ct = resp.headers.get('content-type') || '';
                    if (ct.includes('json')) resp.clone().text().then(push).catch(() => {});
                } catch (e) {}
                return resp;
            });
        };
    }
    const origOpen = XMLHttpRequest.prototype.open;
    XMLHttpRequest.prototype.open = function (...args) {
        this.addEventListener('load', function () {
            try {
                const ct = this.getResponseHeader('content-type') || '';
                if (ct.includes('json') && typeof this.responseText === 'string') {
                    push(this.responseText);
                }
            } catch (e) {}
        });
        return origOpen.apply(this, args);
    };
})()"#;

/// Take captured bodies out of the page and clear the buffer.
const DRAIN_CAPTURE_JS: &str = r#"(() => {
    const out = window.__netCapture || [];
    window.__netCapture = [];
    return out;
})()"#;

/// Install the response capture hook. Best effort.
pub async fn install_capture<D: Driver>(driver: &D) {
    if let Err(e) = driver.execute(INSTALL_CAPTURE_JS).await {
        debug!("network capture install failed: {e}");
    }
}

/// Drain captured response bodies into the cache. Unparseable bodies are
/// dropped silently.
pub async fn drain_into<D: Driver>(driver: &D, cache: &mut NetworkCache) {
    let bodies = match driver.evaluate(DRAIN_CAPTURE_JS).await {
        Ok(Value::Array(items)) => items,
        Ok(_) => return,
        Err(e) => {
            debug!("network capture drain failed: {e}");
            return;
        }
    };
    for body in bodies {
        if let Value::String(text) = body {
            if let Ok(parsed) = serde_json::from_str::<Value>(&text) {
                cache.absorb(&parsed);
            }
        }
    }
}
