//! External action-planner boundary.
//!
//! When deterministic resolution exhausts its retries, the orchestrator may
//! ask an external oracle for a short freeform action sequence. The oracle
//! itself (an LLM, a human, anything) lives outside this crate behind the
//! [`Planner`] trait; this module owns gathering the page context it sees,
//! parsing its reply into an allow-listed plan, and executing that plan.

use crate::driver::Driver;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Hard cap on actions per plan; anything past this is discarded.
pub const MAX_PLAN_ACTIONS: usize = 10;

/// What the oracle gets to look at.
#[derive(Debug, Clone, Serialize)]
pub struct PageContext {
    pub url: String,
    pub stage: u32,
    pub buttons: Vec<String>,
    pub inputs: Vec<String>,
    pub body_snippet: String,
}

/// The allow-listed action vocabulary. Anything else in a plan is dropped
/// during parsing, before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PlannedAction {
    Click {
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
    Type {
        selector: String,
        text: String,
    },
    Keypress {
        key: String,
    },
    Scroll {
        #[serde(default)]
        amount: Option<i64>,
    },
}

/// An external oracle that proposes a short action sequence. Replies are
/// raw text; the engine validates them before anything touches the page.
#[allow(async_fn_in_trait)]
pub trait Planner {
    async fn propose(&self, context: &PageContext) -> crate::Result<String>;
}

/// Stand-in planner: never proposes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlanner;

impl Planner for NoopPlanner {
    async fn propose(&self, _context: &PageContext) -> crate::Result<String> {
        Ok(String::new())
    }
}

const CONTEXT_JS: &str = r#"(() => {
    const buttons = [];
    for (const n of document.querySelectorAll('button, [role="button"], a[href], input[type="submit"]')) {
        if (n.offsetParent === null) continue;
        const text = (n.textContent || n.value || '').trim().slice(0, 80);
        if (text) buttons.push(text);
        if (buttons.length >= 40) break;
    }
    const inputs = [];
    for (const n of document.querySelectorAll('input:not([type=hidden])')) {
        inputs.push((n.getAttribute('placeholder') || n.getAttribute('aria-label')
            || n.getAttribute('name') || '').slice(0, 60));
        if (inputs.length >= 20) break;
    }
    return { buttons, inputs };
})()"#;

/// Gather what the oracle is allowed to see. Best effort; missing pieces
/// are sent empty.
pub async fn gather_context<D: Driver>(driver: &D, stage: u32) -> PageContext {
    let url = driver.url().await.unwrap_or_default();
    let mut body_snippet = driver.body_text().await.unwrap_or_default();
    body_snippet.truncate(2000);
    let (buttons, inputs) = match driver.evaluate(CONTEXT_JS).await {
        Ok(value) => {
            let strings = |v: &Value| -> Vec<String> {
                v.as_array()
                    .map(|a| {
                        a.iter()
                            .filter_map(|s| s.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default()
            };
            (strings(&value["buttons"]), strings(&value["inputs"]))
        }
        Err(e) => {
            debug!("planner context gather failed: {e}");
            (Vec::new(), Vec::new())
        }
    };
    PageContext {
        url,
        stage,
        buttons,
        inputs,
        body_snippet,
    }
}

/// Parse an oracle reply into a validated plan. Markdown fences are
/// stripped; entries that are not allow-listed actions are dropped; the
/// plan is capped at [`MAX_PLAN_ACTIONS`].
pub fn parse_plan(raw: &str) -> Vec<PlannedAction> {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("```") {
        text = stripped
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .trim_start();
        text = text.strip_suffix("```").map(str::trim_end).unwrap_or(text);
    }
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<PlannedAction>(item).ok())
        .take(MAX_PLAN_ACTIONS)
        .collect()
}

/// Execute a validated plan. Individual action failures are logged and
/// skipped; the plan never aborts the run.
pub async fn execute_plan<D: Driver>(driver: &D, plan: &[PlannedAction]) {
    for action in plan {
        match action {
            PlannedAction::Click { selector, text } => {
                let clicked = if let Some(sel) = selector {
                    driver.try_click(sel).await.unwrap_or(false)
                } else if let Some(t) = text {
                    driver.try_click_text(t).await.unwrap_or(false)
                } else {
                    false
                };
                debug!("plan click: hit={clicked}");
            }
            PlannedAction::Type { selector, text } => {
                if let Err(e) = driver.fill(selector, text).await {
                    debug!("plan type failed: {e}");
                }
            }
            PlannedAction::Keypress { key } => {
                if let Err(e) = driver.press_key(key).await {
                    debug!("plan keypress failed: {e}");
                }
            }
            PlannedAction::Scroll { amount } => {
                let dy = amount.unwrap_or(300);
                let _ = driver.execute(&format!("window.scrollBy(0, {dy})")).await;
            }
        }
        driver.wait_ms(200).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_plan() {
        let plan = parse_plan(
            r#"[{"action":"click","text":"Reveal"},{"action":"keypress","key":"Escape"}]"#,
        );
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan[1],
            PlannedAction::Keypress {
                key: "Escape".into()
            }
        );
    }

    #[test]
    fn strips_markdown_fences() {
        let plan = parse_plan("```json\n[{\"action\":\"scroll\",\"amount\":500}]\n```");
        assert_eq!(plan, vec![PlannedAction::Scroll { amount: Some(500) }]);
    }

    #[test]
    fn drops_disallowed_actions() {
        let plan = parse_plan(
            r##"[{"action":"navigate","url":"https://evil.test"},{"action":"click","selector":"#ok"}]"##,
        );
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], PlannedAction::Click { .. }));
    }

    #[test]
    fn caps_plan_length() {
        let entries: Vec<String> = (0..25)
            .map(|_| r#"{"action":"keypress","key":"Escape"}"#.to_string())
            .collect();
        let raw = format!("[{}]", entries.join(","));
        assert_eq!(parse_plan(&raw).len(), MAX_PLAN_ACTIONS);
    }

    #[test]
    fn garbage_is_an_empty_plan() {
        assert!(parse_plan("sorry, I cannot help with that").is_empty());
        assert!(parse_plan("{\"action\":\"click\"}").is_empty());
        assert!(parse_plan("").is_empty());
    }
}
