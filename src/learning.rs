//! Learning Store: remembers which source last worked per stage.
//!
//! Two JSON files: a run-local `learned.json` and an optional shared
//! cross-run copy. Load merges them (run-local wins on conflict by default);
//! save writes this run's successes to the run-local file and union-merges
//! them into the shared file, never deleting stages other runs learned.
//! A wrong hint only costs a wasted attempt, so every failure here is
//! downgraded to "nothing learned".

use crate::config::LearnedPrecedence;
use crate::extract::Source;
use crate::report::StepResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const LEARNED_FILENAME: &str = "learned.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct LearnedFile {
    method_per_step: BTreeMap<String, String>,
    #[serde(default)]
    last_updated: String,
    #[serde(default)]
    steps_count: usize,
}

/// Load the merged stage→source preference map.
pub fn load(
    run_dir: &Path,
    shared_dir: Option<&Path>,
    precedence: LearnedPrecedence,
) -> BTreeMap<u32, Source> {
    let (first, second) = match precedence {
        LearnedPrecedence::RunLocalOverShared => (shared_dir, Some(run_dir)),
        LearnedPrecedence::SharedOverRunLocal => (Some(run_dir), shared_dir),
    };
    let mut merged = BTreeMap::new();
    for dir in [first, second].into_iter().flatten() {
        merged.extend(read_file(&dir.join(LEARNED_FILENAME)));
    }
    merged
}

fn read_file(path: &Path) -> BTreeMap<u32, Source> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return BTreeMap::new();
    };
    let Ok(file) = serde_json::from_str::<LearnedFile>(&raw) else {
        debug!("learned store at {} is unreadable; ignoring", path.display());
        return BTreeMap::new();
    };
    file.method_per_step
        .into_iter()
        .filter_map(|(stage, method)| {
            Some((stage.parse().ok()?, method.parse::<Source>().ok()?))
        })
        .collect()
}

/// Persist the sources that succeeded this run. Run-local file holds only
/// this run's entries; the shared file gets a union merge.
pub fn save(run_dir: &Path, shared_dir: Option<&Path>, results: &[StepResult]) {
    let mut this_run: BTreeMap<u32, Source> = BTreeMap::new();
    for result in results {
        if result.success {
            if let Some(source) = result.source {
                this_run.insert(result.stage, source);
            }
        }
    }
    if this_run.is_empty() {
        return;
    }

    if let Err(e) = write_file(&run_dir.join(LEARNED_FILENAME), &this_run) {
        debug!("learned store: run-local write failed: {e}");
    }
    if let Some(shared) = shared_dir {
        let path = shared.join(LEARNED_FILENAME);
        let mut merged = read_file(&path);
        merged.extend(this_run);
        if let Err(e) = write_file(&path, &merged) {
            debug!("learned store: shared write failed: {e}");
        }
    }
}

/// Atomic write: serialize to a sibling temp file, then rename into place,
/// so a run-level cancellation never leaves a half-written store.
fn write_file(path: &Path, entries: &BTreeMap<u32, Source>) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = LearnedFile {
        method_per_step: entries
            .iter()
            .map(|(stage, source)| (stage.to_string(), source.to_string()))
            .collect(),
        last_updated: chrono::Utc::now().to_rfc3339(),
        steps_count: entries.len(),
    };
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
