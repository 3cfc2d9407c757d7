//! Selectors, label vocabulary, and stage detection for the challenge site.

use regex::Regex;
use std::sync::OnceLock;

/// Total number of stages in the challenge.
pub const STAGE_COUNT: u32 = 30;

/// Stage-keyed storage entry, e.g. `challenge_code_step_7`.
pub const STORAGE_KEY_PREFIX: &str = "challenge_code_step_";

/// Code input candidates, most specific first. Email/search inputs are
/// excluded so we never type the code into a newsletter form.
pub const CODE_INPUT_SELECTORS: &[&str] = &[
    r#"input[placeholder*="code" i]"#,
    r#"input[name*="code" i]"#,
    r#"input[id*="code" i]"#,
    r#"input[aria-label*="code" i]"#,
    r#"input[type=text]:not([name*="email" i]):not([name*="search" i])"#,
    r#"input:not([type=hidden]):not([type=search]):not([name*="email" i])"#,
];

/// Submit/proceed button labels, in preference order.
pub const SUBMIT_BUTTON_LABELS: &[&str] = &[
    "Submit Code",
    "Proceed Forward",
    "Next Page",
    "Next Step",
    "Proceed",
    "Advance",
    "Submit",
];

/// Trap buttons that must never be used to submit or advance. Exact match,
/// case-insensitive.
pub const DECOY_BUTTON_LABELS: &[&str] = &[
    "Here!",
    "Button!",
    "Try This!",
    "Click Me!",
    "Continue Reading",
    "Link!",
];

/// Section text that marks the real code-entry area.
pub const CODE_SECTION_MARKERS: &[&str] = &["Enter Code to Proceed", "Proceed to Stage"];

/// Reveal-style affordances the DOM probe may click (capped).
pub const REVEAL_LABELS: &[&str] = &["Reveal Code", "Show Code", "Get Code", "Reveal"];

fn stage_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:Stage|Step)\s+(\d+)\s+of\s+30").unwrap())
}

/// Parse the current stage number (1..=30) from page text, or `None` when the
/// page is not showing a stage label.
pub fn parse_stage_label(text: &str) -> Option<u32> {
    let caps = stage_pattern().captures(text)?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    (1..=STAGE_COUNT).contains(&n).then_some(n)
}

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

/// Token that has the shape of a stage code: alphanumeric plus `-`/`_`,
/// within the 4..=64 candidate length bounds.
pub fn code_shaped(s: &str, min_len: usize) -> bool {
    let s = s.trim();
    s.len() >= min_len && s.len() <= 64 && token_pattern().is_match(s)
}

/// True if a button label is one of the known traps.
pub fn is_decoy_button_label(label: &str) -> bool {
    let label = label.trim();
    DECOY_BUTTON_LABELS
        .iter()
        .any(|d| d.eq_ignore_ascii_case(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stage_label() {
        assert_eq!(parse_stage_label("Stage 7 of 30\nEnter code"), Some(7));
        assert_eq!(parse_stage_label("step 30 of 30"), Some(30));
        assert_eq!(parse_stage_label("Welcome! Press START"), None);
        // Out of range is not a stage.
        assert_eq!(parse_stage_label("Stage 31 of 30"), None);
        assert_eq!(parse_stage_label("Stage 0 of 30"), None);
    }

    #[test]
    fn code_shape_bounds() {
        assert!(code_shaped("AB-12_x", 4));
        assert!(!code_shaped("abc", 4));
        assert!(!code_shaped("has space", 4));
        assert!(!code_shaped(&"x".repeat(65), 4));
    }

    #[test]
    fn decoy_labels_exact_case_insensitive() {
        assert!(is_decoy_button_label("Click Me!"));
        assert!(is_decoy_button_label("here!"));
        assert!(!is_decoy_button_label("Submit Code"));
        // Substring is not enough; the match is exact.
        assert!(!is_decoy_button_label("Click Me! Now"));
    }
}
