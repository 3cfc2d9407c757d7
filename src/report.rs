//! Per-stage results and the run-level ledger written to `results.json`.

use crate::extract::Source;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Redact a code for logging: first 2 + `****` + last 2. Counts characters,
/// not bytes, so a page that sneaks multibyte text into a candidate cannot
/// panic the recording path.
pub fn redact_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    if chars.len() < 4 {
        return "****".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}****{tail}")
}

/// Terminal outcome of one stage attempt. Recorded exactly once per stage
/// per run; retries only produce log lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub stage: u32,
    pub success: bool,
    pub seconds: f64,
    /// Which probe produced the submitted candidate.
    pub source: Option<Source>,
    pub note: String,
    /// e.g. "VR****7A"; full codes never reach the ledger.
    pub redacted_code: Option<String>,
}

/// The run-scoped ledger, serialized to `results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub url: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_seconds: f64,
    pub solved_count: u32,
    pub attempted_count: u32,
    pub steps: Vec<StepResult>,
}

impl RunReport {
    /// Write the ledger into `out_dir/results.json`.
    pub fn write(&self, out_dir: &Path) -> crate::Result<()> {
        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join("results.json");
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        info!("wrote {}", path.display());
        Ok(())
    }
}
