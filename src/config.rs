//! Run configuration: retry budgets, polling cadence, and policy knobs.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which learned-store file wins when both define a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LearnedPrecedence {
    /// Shared file is read first; run-local entries override on conflict.
    /// Run-local is the most recent evidence for this machine.
    #[default]
    RunLocalOverShared,
    /// Run-local file is read first; shared entries override on conflict.
    SharedOverRunLocal,
}

/// Tunables for one run. Defaults match the pacing that finishes 30 stages
/// inside a five-minute budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Full resolve→submit attempts per stage before the stage fails.
    pub max_retries_per_stage: u32,
    /// Settle delay after a submission before polling begins, in ms.
    pub post_submit_wait_ms: u64,
    /// How many times to poll the reported stage after a submission.
    pub advance_poll_count: u32,
    /// Interval between advancement polls, in ms.
    pub advance_poll_interval_ms: u64,
    /// Stages at or below this get one full re-resolution after a stall.
    pub early_stage_retry_window: u32,
    /// Keep going after a terminal stage failure instead of aborting.
    pub continue_on_error: bool,
    /// Treat an unreadable stage label after submission as an advance.
    /// Known heuristic risk: can mask a real failure.
    pub infer_advance_on_ambiguous: bool,
    /// Total external-planner calls allowed per run.
    pub max_planner_calls: u32,
    /// Learned-store merge order.
    pub learned_precedence: LearnedPrecedence,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_retries_per_stage: 3,
            post_submit_wait_ms: 100,
            advance_poll_count: 20,
            advance_poll_interval_ms: 50,
            early_stage_retry_window: 5,
            continue_on_error: false,
            infer_advance_on_ambiguous: true,
            max_planner_calls: 10,
            learned_precedence: LearnedPrecedence::default(),
        }
    }
}

impl RunConfig {
    /// Load overrides from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.max_retries_per_stage == 0 {
            return Err(crate::Error::Config(
                "max_retries_per_stage must be at least 1".into(),
            ));
        }
        if self.advance_poll_count == 0 {
            return Err(crate::Error::Config(
                "advance_poll_count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retries_per_stage, 3);
        assert_eq!(config.early_stage_retry_window, 5);
        assert!(config.infer_advance_on_ambiguous);
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{ "continue_on_error": true, "max_planner_calls": 2 }"#)
                .unwrap();
        assert!(config.continue_on_error);
        assert_eq!(config.max_planner_calls, 2);
        assert_eq!(config.max_retries_per_stage, 3);
    }

    #[test]
    fn zero_retries_rejected() {
        let config = RunConfig {
            max_retries_per_stage: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
