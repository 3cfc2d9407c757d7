//! # gauntlet
//!
//! Automated solver for a fixed 30-stage interactive web challenge. Each stage
//! hides an access code behind page storage, network responses, or obfuscated
//! DOM content, usually surrounded by decoy buttons and popups. The engine
//! races three extraction probes per stage, filters decoys, submits the
//! winning candidate, confirms the page actually advanced, and remembers which
//! probe worked per stage so the next run tries it first.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gauntlet::{EokaDriver, Orchestrator, RunConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> gauntlet::Result<()> {
//! let driver = EokaDriver::launch(true).await?;
//! let config = RunConfig::default();
//! let mut orchestrator = Orchestrator::new(&driver, config);
//! let report = orchestrator.run("https://challenge.example.com").await?;
//! println!("solved {}/{}", report.solved_count, report.attempted_count);
//! # Ok(())
//! # }
//! ```

pub mod advance;
pub mod arbiter;
pub mod config;
pub mod driver;
pub mod extract;
pub mod learning;
pub mod normalize;
pub mod orchestrator;
pub mod planner;
pub mod report;
pub mod scan;
pub mod site;
pub mod submit;
pub mod validate;

pub use advance::Advancement;
pub use config::RunConfig;
pub use driver::{Driver, EokaDriver};
pub use extract::network::NetworkCache;
pub use extract::{Candidate, Source};
pub use orchestrator::Orchestrator;
pub use planner::{NoopPlanner, Planner};
pub use report::{RunReport, StepResult};

/// Result type for gauntlet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a run.
///
/// Probe- and UI-level flakiness never surfaces here: probes downgrade their
/// own failures to "no candidate" at the component boundary. These variants
/// are run-level conditions only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("no valid code found for stage {0}")]
    Extraction(u32),

    #[error("no fillable code input or submit control for stage {0}")]
    Submission(u32),

    #[error("stage {0} did not advance after submission")]
    Advancement(u32),

    #[error("budget exhausted: {0}")]
    BudgetExhausted(String),

    #[error("driver error: {0}")]
    Driver(String),
}
