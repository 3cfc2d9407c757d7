//! Storage probe: stage-keyed localStorage entries plus a bulk-scanned
//! stage→code table built once at run start.

use crate::driver::Driver;
use crate::scan::scan_stage_table;
use crate::site::{code_shaped, STAGE_COUNT, STORAGE_KEY_PREFIX};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Values larger than this are never parsed (pathological blobs).
const MAX_VALUE_LEN: usize = 100_000;

/// Storage keys worth inspecting for embedded stage tables.
const KEY_HINTS: &[&str] = &[
    "code",
    "answer",
    "step",
    "stage",
    "challenge",
    "token",
    "state",
    "data",
];

fn stage_key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^challenge_code_step_(\d+)$").unwrap())
}

/// Read the stage's code: the literal `challenge_code_step_N` key first, then
/// the bulk-scanned table if one was built at run start.
pub async fn probe<D: Driver>(
    driver: &D,
    stage: u32,
    table: Option<&BTreeMap<u32, String>>,
) -> Option<String> {
    if let Some(code) = read_stage_key(driver, stage).await {
        return Some(code);
    }
    table.and_then(|t| t.get(&stage).cloned())
}

async fn read_stage_key<D: Driver>(driver: &D, stage: u32) -> Option<String> {
    let js = format!(
        r#"(() => {{
            try {{
                return window.localStorage.getItem("{STORAGE_KEY_PREFIX}{stage}") || null;
            }} catch (e) {{ return null; }}
        }})()"#
    );
    let value = match driver.evaluate(&js).await {
        Ok(v) => v,
        Err(e) => {
            debug!("storage probe: stage key read failed: {e}");
            return None;
        }
    };
    match value {
        Value::String(s) if code_shaped(&s, 4) => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Dump localStorage and sessionStorage once and mine every entry for
/// stage→code pairs: literal stage keys directly, JSON blob values through
/// the bounded table scanner.
pub async fn bulk_scan<D: Driver>(driver: &D) -> BTreeMap<u32, String> {
    const DUMP_JS: &str = r#"(() => {
        const dump = {};
        for (const store of [window.localStorage, window.sessionStorage]) {
            try {
                for (let i = 0; i < store.length; i++) {
                    const k = store.key(i);
                    dump[k] = store.getItem(k);
                }
            } catch (e) {}
        }
        return dump;
    })()"#;

    let mut codes: BTreeMap<u32, String> = BTreeMap::new();
    let dump = match driver.evaluate(DUMP_JS).await {
        Ok(Value::Object(map)) => map,
        Ok(_) => return codes,
        Err(e) => {
            debug!("storage bulk scan failed: {e}");
            return codes;
        }
    };

    // Literal stage keys are authoritative; mine them first.
    for (key, value) in &dump {
        let Value::String(raw) = value else { continue };
        let Some(caps) = stage_key_pattern().captures(key) else {
            continue;
        };
        if let Ok(stage) = caps[1].parse::<u32>() {
            if (1..=STAGE_COUNT).contains(&stage) && code_shaped(raw, 4) {
                codes.insert(stage, raw.trim().to_string());
            }
        }
    }

    // Then heuristic tables inside JSON blob values, never overriding the
    // literal keys above.
    for (key, value) in &dump {
        let Value::String(raw) = value else { continue };
        if raw.is_empty() || raw.len() > MAX_VALUE_LEN || stage_key_pattern().is_match(key) {
            continue;
        }
        let key_lower = key.to_lowercase();
        if !KEY_HINTS.iter().any(|h| key_lower.contains(h)) {
            continue;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(blob) => {
                for (stage, code) in scan_stage_table(&blob, STAGE_COUNT) {
                    codes.entry(stage).or_insert(code);
                }
            }
            Err(_) => {
                // Plain-string value under a code-hinted key: only plausible
                // for stage 1 (keys without a number).
                if key_lower.contains("code") && code_shaped(raw, 6) {
                    codes.entry(1).or_insert_with(|| raw.trim().to_string());
                }
            }
        }
    }
    debug!("storage bulk scan found {} stage codes", codes.len());
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use serde_json::json;

    #[tokio::test]
    async fn direct_stage_key_wins() {
        let driver = MockDriver::default();
        driver.answer("challenge_code_step_4", json!("KEY44X"));
        let table = BTreeMap::from([(4, "TABLE4".to_string())]);
        assert_eq!(
            probe(&driver, 4, Some(&table)).await.as_deref(),
            Some("KEY44X")
        );
    }

    #[tokio::test]
    async fn table_is_the_fallback() {
        let driver = MockDriver::default();
        let table = BTreeMap::from([(9, "TBL99Z".to_string())]);
        assert_eq!(
            probe(&driver, 9, Some(&table)).await.as_deref(),
            Some("TBL99Z")
        );
        assert_eq!(probe(&driver, 2, Some(&table)).await, None);
    }

    #[tokio::test]
    async fn bulk_scan_reads_literal_keys_and_json_blobs() {
        let driver = MockDriver::default();
        let codes: Vec<String> = (1..=30).map(|i| format!("POS{i:02}Q")).collect();
        driver.answer(
            "sessionStorage",
            json!({
                "challenge_code_step_2": "DIRECT2",
                "app_state": serde_json::to_string(&json!({ "codes": codes })).unwrap(),
                "theme": "dark",
            }),
        );
        let table = bulk_scan(&driver).await;
        assert_eq!(table.get(&2).map(String::as_str), Some("DIRECT2"));
        assert_eq!(table.get(&17).map(String::as_str), Some("POS17Q"));
        assert_eq!(table.len(), 30);
    }

    #[tokio::test]
    async fn bulk_scan_ignores_unhinted_keys() {
        let driver = MockDriver::default();
        driver.answer("sessionStorage", json!({ "theme": "ABCDEF12" }));
        assert!(bulk_scan(&driver).await.is_empty());
    }
}
