//! Step Orchestrator: the per-stage state machine driving stages 1..=30.
//!
//! Per stage: reconcile the expected stage with the page, normalize the UI,
//! resolve the choice modal, race the probes through the arbiter, submit,
//! confirm advancement. Extraction and submission failures are retried
//! within a bounded budget; a stall inside the early-stage window gets
//! exactly one full re-resolution; a stage that still fails either aborts
//! the run or is skipped, per policy. Each stage's terminal outcome lands in
//! the ledger exactly once, and the learning store is flushed at every stage
//! boundary so a run-level timeout never loses completed work.

use crate::advance::{self, Advancement};
use crate::arbiter;
use crate::config::RunConfig;
use crate::driver::Driver;
use crate::extract::network::{self, NetworkCache};
use crate::extract::{storage, Candidate, Source};
use crate::learning;
use crate::normalize;
use crate::planner::{self, NoopPlanner, Planner};
use crate::report::{redact_code, RunReport, StepResult};
use crate::site::STAGE_COUNT;
use crate::submit;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one resolve→submit→confirm pass.
enum Pass {
    Advanced(u32, Candidate),
    Stalled(Candidate),
    Ambiguous(Candidate),
    NoCode,
    NotSubmitted(Candidate),
}

/// Terminal outcome for a stage.
enum StageOutcome {
    Solved {
        new_stage: u32,
        candidate: Candidate,
        note: String,
    },
    Failed {
        candidate: Option<Candidate>,
        note: String,
    },
}

/// Drives a full run against one page.
pub struct Orchestrator<'a, D: Driver, P: Planner = NoopPlanner> {
    driver: &'a D,
    config: RunConfig,
    planner: Option<P>,
    planner_calls_used: u32,
    learned: BTreeMap<u32, Source>,
    network: NetworkCache,
    storage_table: BTreeMap<u32, String>,
    run_dir: Option<PathBuf>,
    shared_dir: Option<PathBuf>,
}

impl<'a, D: Driver> Orchestrator<'a, D, NoopPlanner> {
    pub fn new(driver: &'a D, config: RunConfig) -> Self {
        Orchestrator {
            driver,
            config,
            planner: None,
            planner_calls_used: 0,
            learned: BTreeMap::new(),
            network: NetworkCache::new(),
            storage_table: BTreeMap::new(),
            run_dir: None,
            shared_dir: None,
        }
    }
}

impl<'a, D: Driver, P: Planner> Orchestrator<'a, D, P> {
    /// Attach an external action planner for the post-retry fallback.
    pub fn with_planner<P2: Planner>(self, planner: P2) -> Orchestrator<'a, D, P2> {
        Orchestrator {
            driver: self.driver,
            config: self.config,
            planner: Some(planner),
            planner_calls_used: self.planner_calls_used,
            learned: self.learned,
            network: self.network,
            storage_table: self.storage_table,
            run_dir: self.run_dir,
            shared_dir: self.shared_dir,
        }
    }

    /// Seed the per-stage source preferences (normally from the learning
    /// store).
    pub fn with_learned(mut self, learned: BTreeMap<u32, Source>) -> Self {
        self.learned = learned;
        self
    }

    /// Directories for the learning store and failure snapshots.
    pub fn with_dirs(mut self, run_dir: PathBuf, shared_dir: Option<PathBuf>) -> Self {
        self.run_dir = Some(run_dir);
        self.shared_dir = shared_dir;
        self
    }

    /// Navigate to the challenge and drive all 30 stages. Only run-level
    /// faults (navigation) propagate; per-stage trouble is retried, recorded,
    /// and either aborts or skips per `continue_on_error`.
    pub async fn run(&mut self, url: &str) -> crate::Result<RunReport> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let run_start = Instant::now();

        self.driver.navigate(url).await?;
        network::install_capture(self.driver).await;
        self.driver.wait_ms(600).await;
        normalize::dismiss_overlays(self.driver, 2).await;

        if advance::current_stage(self.driver).await.is_none() {
            self.enter_challenge().await;
        }
        self.storage_table = storage::bulk_scan(self.driver).await;
        if !self.storage_table.is_empty() {
            info!(
                "storage fast path available for {} stages",
                self.storage_table.len()
            );
        }

        let mut steps: Vec<StepResult> = Vec::new();
        let mut solved = 0u32;
        let mut attempted = 0u32;
        let mut expected = 1u32;

        while expected <= STAGE_COUNT {
            // Resync can legitimately snap backwards after a session reset;
            // the attempt cap keeps a stuck page from looping forever.
            if attempted >= STAGE_COUNT * 2 {
                warn!("attempt budget exhausted after {attempted} stage attempts");
                break;
            }
            // Reinstall is a no-op while the hook is live, and covers the
            // page replacing itself between stages.
            network::install_capture(self.driver).await;
            network::drain_into(self.driver, &mut self.network).await;

            let mut reported = advance::current_stage(self.driver).await;
            if reported.is_none() {
                // Landing screen or transient DOM; try to enter once more.
                self.enter_challenge().await;
                reported = advance::current_stage(self.driver).await;
            }
            expected = advance::resync(expected, reported);

            let stage = expected;
            let stage_start = Instant::now();
            attempted += 1;

            let mut outcome = self.solve_stage(stage).await;
            if matches!(outcome, StageOutcome::Failed { .. }) {
                if let Some(replay) = self.plan_fallback(stage).await {
                    planner::execute_plan(self.driver, &replay).await;
                    self.driver.wait_ms(250).await;
                    outcome = self.solve_stage(stage).await;
                }
            }

            let seconds = stage_start.elapsed().as_secs_f64();
            match outcome {
                StageOutcome::Solved {
                    new_stage,
                    candidate,
                    note,
                } => {
                    solved += 1;
                    expected = new_stage;
                    info!(
                        "stage {stage} solved via {} in {seconds:.2}s",
                        candidate.source
                    );
                    self.learned.insert(stage, candidate.source);
                    steps.push(StepResult {
                        stage,
                        success: true,
                        seconds,
                        source: Some(candidate.source),
                        note,
                        redacted_code: Some(redact_code(&candidate.code)),
                    });
                }
                StageOutcome::Failed { candidate, note } => {
                    warn!("stage {stage} failed: {note}");
                    self.snapshot_failure(stage).await;
                    steps.push(StepResult {
                        stage,
                        success: false,
                        seconds,
                        source: candidate.as_ref().map(|c| c.source),
                        note,
                        redacted_code: candidate.as_ref().map(|c| redact_code(&c.code)),
                    });
                    if !self.config.continue_on_error {
                        self.persist_learning(&steps);
                        break;
                    }
                    expected = stage + 1;
                }
            }
            // Flush at every stage boundary so a run-level timeout never
            // loses completed work.
            self.persist_learning(&steps);
        }

        let report = RunReport {
            url: url.to_string(),
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            total_seconds: run_start.elapsed().as_secs_f64(),
            solved_count: solved,
            attempted_count: attempted,
            steps,
        };
        Ok(report)
    }

    /// One stage to its terminal outcome: retry-bounded resolution, then the
    /// early-stage one-shot re-resolution on a stall.
    async fn solve_stage(&mut self, stage: u32) -> StageOutcome {
        match self.resolve_submit_confirm(stage).await {
            Pass::Advanced(new_stage, candidate) => StageOutcome::Solved {
                new_stage,
                note: format!("code_len={}", candidate.code.len()),
                candidate,
            },
            Pass::Ambiguous(candidate) => self.ambiguous_outcome(stage, candidate),
            Pass::Stalled(candidate) => {
                if stage > self.config.early_stage_retry_window {
                    return StageOutcome::Failed {
                        candidate: Some(candidate),
                        note: "submit did not advance".into(),
                    };
                }
                debug!("stage {stage}: stalled inside early window; re-resolving once");
                self.driver.wait_ms(250).await;
                match self.resolve_submit_confirm(stage).await {
                    Pass::Advanced(new_stage, candidate) => StageOutcome::Solved {
                        new_stage,
                        note: format!("code_len={} (after stall retry)", candidate.code.len()),
                        candidate,
                    },
                    Pass::Ambiguous(candidate) => self.ambiguous_outcome(stage, candidate),
                    Pass::Stalled(candidate) | Pass::NotSubmitted(candidate) => {
                        StageOutcome::Failed {
                            candidate: Some(candidate),
                            note: "submit did not advance".into(),
                        }
                    }
                    Pass::NoCode => StageOutcome::Failed {
                        candidate: Some(candidate),
                        note: "submit did not advance".into(),
                    },
                }
            }
            Pass::NoCode => StageOutcome::Failed {
                candidate: None,
                note: "no code found".into(),
            },
            Pass::NotSubmitted(candidate) => StageOutcome::Failed {
                candidate: Some(candidate),
                note: "fill/submit failed".into(),
            },
        }
    }

    fn ambiguous_outcome(&self, stage: u32, candidate: Candidate) -> StageOutcome {
        if self.config.infer_advance_on_ambiguous {
            debug!("stage {stage}: advancement unreadable; inferring advance");
            StageOutcome::Solved {
                new_stage: stage + 1,
                note: "inferred advance".into(),
                candidate,
            }
        } else {
            StageOutcome::Failed {
                candidate: Some(candidate),
                note: "advancement unconfirmed".into(),
            }
        }
    }

    /// Normalize, extract, submit, confirm. Extraction and submission
    /// failures consume the retry budget; once a submission is dispatched
    /// the confirmer's verdict is returned as-is.
    async fn resolve_submit_confirm(&mut self, stage: u32) -> Pass {
        let mut last = Pass::NoCode;
        for attempt in 1..=self.config.max_retries_per_stage {
            if attempt > 1 {
                debug!("stage {stage}: attempt {attempt}");
                self.driver.wait_ms(200).await;
            }
            let rounds = if stage == 1 { 2 } else { 1 };
            normalize::dismiss_overlays(self.driver, rounds).await;
            // The choice modal can itself reveal the stage's code, so it must
            // settle before extraction. A "Wrong Button!" banner may appear in
            // between; peel it and try the modal once more.
            normalize::resolve_choice_modal(self.driver).await;
            normalize::dismiss_overlays(self.driver, 1).await;
            normalize::resolve_choice_modal(self.driver).await;

            network::drain_into(self.driver, &mut self.network).await;
            let candidate = arbiter::resolve(
                self.driver,
                stage,
                Some(&self.storage_table),
                &self.network,
                self.learned.get(&stage).copied(),
            )
            .await;
            let Some(candidate) = candidate else {
                debug!("stage {stage}: no valid candidate on attempt {attempt}");
                last = Pass::NoCode;
                continue;
            };

            submit::pick_correct_option(self.driver).await;
            if !submit::submit(self.driver, &candidate.code).await {
                debug!("stage {stage}: fill/submit failed on attempt {attempt}");
                last = Pass::NotSubmitted(candidate);
                continue;
            }

            return match advance::confirm(self.driver, stage, &self.config).await {
                Advancement::Advanced(new_stage) => Pass::Advanced(new_stage, candidate),
                Advancement::Stalled => Pass::Stalled(candidate),
                Advancement::Ambiguous => Pass::Ambiguous(candidate),
            };
        }
        last
    }

    /// Ask the external planner for a short action sequence, if one is
    /// attached and the per-run call budget allows.
    async fn plan_fallback(&mut self, stage: u32) -> Option<Vec<planner::PlannedAction>> {
        let planner = self.planner.as_ref()?;
        if self.planner_calls_used >= self.config.max_planner_calls {
            debug!("planner budget exhausted ({} calls)", self.planner_calls_used);
            return None;
        }
        let context = planner::gather_context(self.driver, stage).await;
        let raw = match planner.propose(&context).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("planner call failed: {e}");
                return None;
            }
        };
        let plan = planner::parse_plan(&raw);
        if plan.is_empty() {
            return None;
        }
        self.planner_calls_used += 1;
        info!(
            "stage {stage}: executing planner fallback ({} actions, call {}/{})",
            plan.len(),
            self.planner_calls_used,
            self.config.max_planner_calls
        );
        Some(plan)
    }

    /// Click through a landing screen and wait until a stage label or a
    /// visible input shows up.
    async fn enter_challenge(&self) {
        for label in ["START", "Start Challenge", "Begin"] {
            if let Ok(true) = self.driver.try_click_text(label).await {
                debug!("clicked '{label}' to enter the challenge");
                break;
            }
        }
        for _ in 0..15 {
            if advance::current_stage(self.driver).await.is_some() {
                return;
            }
            let inputs = self
                .driver
                .evaluate("document.querySelectorAll('input:not([type=hidden])').length")
                .await
                .ok()
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            if inputs > 0 {
                return;
            }
            self.driver.wait_ms(150).await;
        }
    }

    /// Diagnostic artifact for a terminal stage failure. Best effort.
    async fn snapshot_failure(&self, stage: u32) {
        let Some(dir) = &self.run_dir else { return };
        match self.driver.screenshot().await {
            Ok(png) if !png.is_empty() => {
                let path = dir.join(format!("fail_stage_{stage:02}.png"));
                if let Err(e) = std::fs::write(&path, png) {
                    debug!("failure snapshot write failed: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => debug!("failure snapshot failed: {e}"),
        }
    }

    fn persist_learning(&self, steps: &[StepResult]) {
        if let Some(run_dir) = &self.run_dir {
            learning::save(run_dir, self.shared_dir.as_deref(), steps);
        }
    }
}
