//! Source Arbiter: races the probes for one stage and picks a winner.
//!
//! Storage and DOM probes hit the page and run concurrently; the network
//! probe is a cache read slotted in between. The learned preference for the
//! stage (if any) goes first in the try-order, then the default
//! storage → network → dom. If the ordered walk yields nothing valid, any
//! non-empty valid raw result is taken; only then does the stage attempt
//! fail with "no code found".

use crate::driver::Driver;
use crate::extract::network::NetworkCache;
use crate::extract::{dom, storage, Candidate, Source};
use crate::validate::is_valid_code;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Upper bound on each page-touching probe. Keeps a sluggish page from
/// stalling the stage.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe outputs for one stage, before ordering and validation.
#[derive(Debug, Default)]
struct RawResults {
    storage: Option<String>,
    network: Option<String>,
    dom: Option<String>,
}

impl RawResults {
    fn by_source(&self, source: Source) -> Option<&str> {
        match source {
            Source::Storage => self.storage.as_deref(),
            Source::Network => self.network.as_deref(),
            Source::Dom => self.dom.as_deref(),
        }
    }
}

/// Run all three probes for `stage` and select at most one valid candidate.
pub async fn resolve<D: Driver>(
    driver: &D,
    stage: u32,
    storage_table: Option<&BTreeMap<u32, String>>,
    network: &NetworkCache,
    preferred: Option<Source>,
) -> Option<Candidate> {
    let storage_fut = tokio::time::timeout(PROBE_TIMEOUT, storage::probe(driver, stage, storage_table));
    let dom_fut = tokio::time::timeout(PROBE_TIMEOUT, dom::probe(driver));
    let (storage_res, dom_res) = tokio::join!(storage_fut, dom_fut);

    let raw = RawResults {
        storage: storage_res.ok().flatten(),
        network: network.get(stage).map(str::to_string),
        dom: dom_res.ok().flatten(),
    };
    select(stage, &raw, preferred)
}

fn select(stage: u32, raw: &RawResults, preferred: Option<Source>) -> Option<Candidate> {
    for source in try_order(preferred) {
        if let Some(code) = raw.by_source(source) {
            if is_valid_code(code) {
                debug!("stage {stage}: selected {source} candidate");
                return Some(Candidate::new(code, source));
            }
        }
    }
    // Ordered walk found nothing valid; take any valid raw result.
    for source in Source::DEFAULT_ORDER {
        if let Some(code) = raw.by_source(source) {
            if is_valid_code(code) {
                debug!("stage {stage}: fallback selected {source} candidate");
                return Some(Candidate::new(code, source));
            }
        }
    }
    debug!("stage {stage}: no valid candidate from any source");
    None
}

/// Learned preference first, then the remaining defaults in order.
fn try_order(preferred: Option<Source>) -> Vec<Source> {
    let mut order = Vec::with_capacity(3);
    if let Some(p) = preferred {
        order.push(p);
    }
    for s in Source::DEFAULT_ORDER {
        if !order.contains(&s) {
            order.push(s);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(storage: Option<&str>, network: Option<&str>, dom: Option<&str>) -> RawResults {
        RawResults {
            storage: storage.map(str::to_string),
            network: network.map(str::to_string),
            dom: dom.map(str::to_string),
        }
    }

    #[test]
    fn learned_preference_goes_first() {
        let results = raw(Some("ABC123"), None, Some("XYZ999"));
        let picked = select(1, &results, Some(Source::Dom)).unwrap();
        assert_eq!(picked.code, "XYZ999");
        assert_eq!(picked.source, Source::Dom);
    }

    #[test]
    fn default_order_is_storage_first() {
        let results = raw(Some("ABC123"), None, Some("XYZ999"));
        let picked = select(1, &results, None).unwrap();
        assert_eq!(picked.code, "ABC123");
        assert_eq!(picked.source, Source::Storage);
    }

    #[test]
    fn invalid_preferred_candidate_falls_through() {
        // The learned source produced a decoy; the next source wins.
        let results = raw(Some("Proceed"), Some("NET42X"), None);
        let picked = select(3, &results, Some(Source::Storage)).unwrap();
        assert_eq!(picked.code, "NET42X");
        assert_eq!(picked.source, Source::Network);
    }

    #[test]
    fn all_invalid_yields_none() {
        let results = raw(Some("15px"), Some("42"), Some("Continue"));
        assert!(select(9, &results, None).is_none());
    }

    #[test]
    fn empty_results_yield_none() {
        assert!(select(9, &raw(None, None, None), None).is_none());
    }

    #[test]
    fn try_order_deduplicates() {
        assert_eq!(
            try_order(Some(Source::Network)),
            vec![Source::Network, Source::Storage, Source::Dom]
        );
        assert_eq!(try_order(None), Source::DEFAULT_ORDER.to_vec());
    }

    #[tokio::test]
    async fn resolve_reads_network_cache_synchronously() {
        use crate::driver::mock::MockDriver;
        let driver = MockDriver::default();
        let mut cache = NetworkCache::new();
        cache.absorb(&serde_json::json!({ "step_2": "NETTY2" }));
        let picked = resolve(&driver, 2, None, &cache, None).await.unwrap();
        assert_eq!(picked.code, "NETTY2");
        assert_eq!(picked.source, Source::Network);
    }
}
