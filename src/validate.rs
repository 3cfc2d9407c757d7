//! Code Validator: decides whether a candidate string is a plausible access
//! code or a decoy/unit artifact scraped off the page.
//!
//! The filter is deliberately conservative: rejecting a real code only wastes
//! one extraction pass, but accepting a decoy burns a submission attempt.

use regex::Regex;
use std::sync::OnceLock;

/// Prose fragments from button and label copy that show up as tokens but are
/// never stage codes. Exact match, case-insensitive.
const DECOY_WORDS: &[&str] = &[
    "Proceed",
    "Continue",
    "Advance",
    "Forward",
    "Reading",
    "Section",
    "Challenge",
    "Browser",
    "Navigation",
    "Hidden",
    "Complete",
    "Click",
    "Reveal",
    "Submit",
    "Enter",
    "Next",
    "Move",
    "Going",
    "Journey",
    "Page",
    "Stage",
    "Step",
    "Content",
    "Block",
    "Loaded",
    "Automation",
    "Ultimate",
    "Test",
    "Inspect",
    "Element",
    "attributes",
    "labels",
    "somewhere",
    "Hint",
    "Check",
    "Required",
    "optional",
    "character",
    "filler",
    "Keep",
    "scrolling",
    "find",
    "button",
    "Choose",
    "option",
    "Wrong",
    "Correct",
    "Choice",
    "Pick",
    "Select",
    "Scroll",
    "appeared",
    "revealed",
    "clicked",
    "failed",
    "passed",
    "before",
    "after",
    "inside",
    "outside",
    "within",
    "without",
    "below",
    "above",
    "between",
    "during",
    "number",
    "string",
    "source",
    "target",
    "window",
    "screen",
    "parent",
    "child",
    "sibling",
    "length",
    "height",
    "width",
    "Subscribe",
    "Cookie",
    "Dismiss",
    "Accept",
    "Decline",
];

fn unit_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // CSS/measurement artifacts: 15px, 2em, 100ms, 2.5s, s2, %20...
    RE.get_or_init(|| Regex::new(r"(?i)(?:px|em|rem|ms|s\d?|%\d*)$").unwrap())
}

fn all_digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2,}$").unwrap())
}

/// True if `candidate` looks like a real stage code rather than a decoy,
/// unit-like string, or plain number.
pub fn is_valid_code(candidate: &str) -> bool {
    let code = candidate.trim();
    if code.len() < 6 || code.len() > 64 {
        return false;
    }
    if unit_suffix().is_match(code) || all_digits().is_match(code) {
        return false;
    }
    if DECOY_WORDS.iter().any(|w| w.eq_ignore_ascii_case(code)) {
        return false;
    }
    true
}
