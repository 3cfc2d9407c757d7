//! Typed recursive matcher for stage→code tables hiding inside arbitrary JSON.
//!
//! Two matching rules, applied while walking the document to a bounded depth:
//!
//! 1. **Positional**: an array whose length equals the stage count maps
//!    element `i` to stage `i + 1`, either directly (string element) or via a
//!    `code`-named key of an object element.
//! 2. **Keyed**: an object key carrying step/code/answer/token/challenge
//!    vocabulary with an embedded stage number maps its string value to that
//!    stage.

use crate::site::code_shaped;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Maximum nesting depth walked; deeper structures are ignored.
const MAX_SCAN_DEPTH: usize = 6;

/// Key vocabulary that suggests a stage-code entry.
const KEY_HINTS: &[&str] = &["code", "answer", "step", "stage", "challenge", "token"];

fn number_in_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// Walk a JSON document looking for stage→code pairs. Returns a possibly
/// partial map; an empty map means nothing matched.
pub fn scan_stage_table(value: &Value, stage_count: u32) -> BTreeMap<u32, String> {
    let mut found = BTreeMap::new();
    walk(value, stage_count, 0, &mut found);
    found
}

fn walk(value: &Value, stage_count: u32, depth: usize, found: &mut BTreeMap<u32, String>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if let Value::String(s) = child {
                    if code_shaped(s, 4) {
                        if let Some(stage) = stage_from_key(key, stage_count) {
                            found.insert(stage, s.trim().to_string());
                        }
                    }
                }
                walk(child, stage_count, depth + 1, found);
            }
        }
        Value::Array(items) => {
            if items.len() == stage_count as usize {
                for (i, item) in items.iter().enumerate() {
                    let stage = i as u32 + 1;
                    match item {
                        Value::String(s) if code_shaped(s, 4) => {
                            found.insert(stage, s.trim().to_string());
                        }
                        Value::Object(map) => {
                            for (k, v) in map {
                                if k.to_lowercase().contains("code") {
                                    if let Value::String(s) = v {
                                        if code_shaped(s, 4) {
                                            found.insert(stage, s.trim().to_string());
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }
            } else {
                for item in items {
                    walk(item, stage_count, depth + 1, found);
                }
            }
        }
        _ => {}
    }
}

/// Infer a stage number from a key like `step_7`, `stage12`, or `"7"`, but
/// only when the key also carries code/answer/step vocabulary (or is purely
/// numeric).
fn stage_from_key(key: &str, stage_count: u32) -> Option<u32> {
    let lower = key.to_lowercase();
    let hinted = KEY_HINTS.iter().any(|h| lower.contains(h));
    let numeric_key = key.chars().all(|c| c.is_ascii_digit()) && !key.is_empty();
    if !hinted && !numeric_key {
        return None;
    }
    let n: u32 = number_in_key().find(key)?.as_str().parse().ok()?;
    (1..=stage_count).contains(&n).then_some(n)
}
