//! Advancement Confirmer: did the submission actually move the page forward?
//!
//! After a submission the reported stage is polled a bounded number of times.
//! Three outcomes: the page advanced (possibly skipping ahead), it stalled on
//! the submitted stage, or its stage label became unreadable. Separately,
//! [`resync`] reconciles the orchestrator's expected stage with whatever the
//! page reports at the top of every stage attempt.

use crate::config::RunConfig;
use crate::driver::Driver;
use crate::site::parse_stage_label;
use serde_json::Value;
use tracing::debug;

/// A backward jump of at least this much is a session reset, not noise.
pub const REGRESSION_SNAP_MARGIN: u32 = 3;

/// Outcome of polling after a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advancement {
    /// Reported stage moved past the submitted one; carries the new stage.
    Advanced(u32),
    /// Reported stage still equals the submitted stage: the code or button
    /// was rejected.
    Stalled,
    /// Stage label unavailable or unparseable after polling.
    Ambiguous,
}

/// Fallback attributes when the body text carries no stage label.
const STAGE_ATTR_JS: &str = r#"(() => {
    const el = document.querySelector('[data-stage], [data-step]');
    if (el) {
        const n = parseInt(el.getAttribute('data-stage') || el.getAttribute('data-step'), 10);
        if (n >= 1 && n <= 30) return n;
    }
    const label = document.querySelector('[aria-label*="stage" i], [aria-label*="step" i]');
    if (label) {
        const m = (label.getAttribute('aria-label') || '').match(/\d+/);
        if (m) {
            const n = parseInt(m[0], 10);
            if (n >= 1 && n <= 30) return n;
        }
    }
    return null;
})()"#;

/// The page's self-reported current stage, or `None` while the DOM is in a
/// transient state. Never raises.
pub async fn current_stage<D: Driver>(driver: &D) -> Option<u32> {
    match driver.body_text().await {
        Ok(text) => {
            if let Some(stage) = parse_stage_label(&text) {
                return Some(stage);
            }
        }
        Err(e) => debug!("stage read: body text failed: {e}"),
    }
    match driver.evaluate(STAGE_ATTR_JS).await {
        Ok(Value::Number(n)) => n.as_u64().map(|v| v as u32),
        Ok(_) => None,
        Err(e) => {
            debug!("stage read: attribute fallback failed: {e}");
            None
        }
    }
}

/// Poll the reported stage after submitting `submitted` until it advances or
/// the poll budget runs out.
pub async fn confirm<D: Driver>(driver: &D, submitted: u32, config: &RunConfig) -> Advancement {
    driver.wait_ms(config.post_submit_wait_ms).await;
    for _ in 0..config.advance_poll_count {
        driver.wait_ms(config.advance_poll_interval_ms).await;
        if let Some(stage) = current_stage(driver).await {
            if stage > submitted {
                return Advancement::Advanced(stage);
            }
        }
    }
    match current_stage(driver).await {
        Some(stage) if stage > submitted => Advancement::Advanced(stage),
        Some(stage) if stage == submitted => Advancement::Stalled,
        _ => Advancement::Ambiguous,
    }
}

/// Reconcile the expected stage with the page's report at the top of a stage
/// attempt: fast-forward when the page is ahead, snap down on a big backward
/// jump, ignore small lag as noise.
pub fn resync(expected: u32, reported: Option<u32>) -> u32 {
    let Some(reported) = reported else {
        return expected;
    };
    if reported > expected {
        debug!("page at stage {reported}, ahead of expected {expected}; fast-forwarding");
        reported
    } else if reported < expected && expected - reported >= REGRESSION_SNAP_MARGIN {
        debug!("page at stage {reported}, expected {expected}; treating as session reset");
        reported
    } else {
        expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;

    fn stage_text(n: u32) -> String {
        format!("Stage {n} of 30\nEnter Code to Proceed")
    }

    #[tokio::test]
    async fn advances_when_reported_stage_moves() {
        let driver =
            MockDriver::with_body_texts([5, 5, 5, 5, 6].into_iter().map(stage_text));
        let outcome = confirm(&driver, 5, &RunConfig::default()).await;
        assert_eq!(outcome, Advancement::Advanced(6));
    }

    #[tokio::test]
    async fn adopts_a_skip_ahead() {
        let driver = MockDriver::with_body_texts([5, 8].into_iter().map(stage_text));
        let outcome = confirm(&driver, 5, &RunConfig::default()).await;
        assert_eq!(outcome, Advancement::Advanced(8));
    }

    #[tokio::test]
    async fn stalls_when_stage_never_moves() {
        let driver = MockDriver::with_body_texts([stage_text(5)]);
        let outcome = confirm(&driver, 5, &RunConfig::default()).await;
        assert_eq!(outcome, Advancement::Stalled);
    }

    #[tokio::test]
    async fn unreadable_stage_is_ambiguous() {
        let driver = MockDriver::with_body_texts(["Loading…".to_string()]);
        let outcome = confirm(&driver, 5, &RunConfig::default()).await;
        assert_eq!(outcome, Advancement::Ambiguous);
    }

    #[tokio::test]
    async fn attribute_fallback_reads_stage() {
        let driver = MockDriver::with_body_texts(["no label here".to_string()]);
        driver.answer("data-stage", serde_json::json!(12));
        assert_eq!(current_stage(&driver).await, Some(12));
    }

    #[test]
    fn resync_fast_forwards_when_page_is_ahead() {
        assert_eq!(resync(4, Some(7)), 7);
    }

    #[test]
    fn resync_snaps_down_on_big_regression() {
        assert_eq!(resync(10, Some(2)), 2);
        assert_eq!(resync(10, Some(7)), 7);
    }

    #[test]
    fn resync_ignores_small_lag_and_missing_reports() {
        assert_eq!(resync(10, Some(9)), 10);
        assert_eq!(resync(10, Some(8)), 10);
        assert_eq!(resync(10, None), 10);
    }
}
