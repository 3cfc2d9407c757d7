//! The three extraction probes and their shared types.
//!
//! Each probe answers "what code does this stage want?" independently of the
//! others and may run concurrently with them. Probes never raise: driver
//! flakiness is downgraded to "no candidate" so a single bad DOM query cannot
//! abort a 30-stage run.

pub mod dom;
pub mod network;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provenance of a candidate code. Attached to every candidate and every
/// step result; this is what the learning store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Storage,
    Network,
    Dom,
}

impl Source {
    /// Default try-order when nothing has been learned for a stage.
    pub const DEFAULT_ORDER: [Source; 3] = [Source::Storage, Source::Network, Source::Dom];
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Storage => "storage",
            Source::Network => "network",
            Source::Dom => "dom",
        })
    }
}

impl FromStr for Source {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "storage" => Ok(Source::Storage),
            "network" => Ok(Source::Network),
            "dom" => Ok(Source::Dom),
            _ => Err(()),
        }
    }
}

/// A code proposed by a probe for a specific stage. Not trusted until it
/// passes the validator and the page accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub code: String,
    pub source: Source,
}

impl Candidate {
    pub fn new(code: impl Into<String>, source: Source) -> Self {
        Self {
            code: code.into(),
            source,
        }
    }
}
