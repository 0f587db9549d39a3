//! Eviction policies - keeping the in-memory projection within budget
//!
//! Eviction runs synchronously on the writer thread after each write, looping
//! while the budget signal reports pressure. It removes nodes from the graph
//! view only; durable and semantic rows are never deleted by eviction.

use crate::graph::GraphView;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Rule used to pick which cached node to remove under memory pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Remove the least-recently-used node
    Recency,
    /// Remove the node with the lowest confidence score
    Score,
}

impl EvictionPolicy {
    /// Get the string representation of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Recency => "recency",
            EvictionPolicy::Score => "score",
        }
    }

    /// Get all policies
    pub fn all() -> &'static [EvictionPolicy] {
        &[EvictionPolicy::Recency, EvictionPolicy::Score]
    }
}

impl FromStr for EvictionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "recency" | "lru" => Ok(EvictionPolicy::Recency),
            "score" | "confidence" => Ok(EvictionPolicy::Score),
            _ => Err(Error::InvalidConfig(format!(
                "Unknown eviction policy: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evict nodes while `over_budget` reports pressure, stopping once the graph
/// is empty even if still over budget. Returns the number of nodes removed.
///
/// The budget signal is injected as a closure so tests can simulate pressure
/// without depending on real process memory. The `score` policy re-scans all
/// cached nodes per eviction; the cache is kept small by the budget itself, so
/// the O(n) scan is an accepted trade-off over a second ordered index.
pub fn enforce<F>(graph: &GraphView, policy: EvictionPolicy, mut over_budget: F) -> usize
where
    F: FnMut() -> bool,
{
    let mut evicted = 0;
    while over_budget() {
        let candidate = match policy {
            EvictionPolicy::Recency => graph.least_recent(),
            EvictionPolicy::Score => graph.lowest_confidence(),
        };
        let Some(id) = candidate else {
            break;
        };
        if !graph.remove_node(&id) {
            break;
        }
        evicted += 1;
        tracing::debug!("Evicted {} from the in-memory graph ({} policy)", id, policy);
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::Claim;

    fn sample_claim(id: &str, confidence: f32) -> Claim {
        Claim::new(id, "finding", "fact").with_confidence(confidence)
    }

    #[test]
    fn test_policy_roundtrip() {
        for policy in EvictionPolicy::all() {
            let parsed: EvictionPolicy = policy.as_str().parse().unwrap();
            assert_eq!(*policy, parsed);
        }
        assert_eq!(
            EvictionPolicy::from_str("lru").unwrap(),
            EvictionPolicy::Recency
        );
        assert!(EvictionPolicy::from_str("random").is_err());
    }

    #[test]
    fn test_enforce_stops_when_pressure_clears() {
        let graph = GraphView::new();
        graph.upsert_claim(&sample_claim("a", 0.9));
        graph.upsert_claim(&sample_claim("b", 0.9));
        graph.upsert_claim(&sample_claim("c", 0.9));

        let mut pressure = 2;
        let evicted = enforce(&graph, EvictionPolicy::Recency, || {
            if pressure > 0 {
                pressure -= 1;
                true
            } else {
                false
            }
        });

        assert_eq!(evicted, 2);
        assert_eq!(graph.node_count(), 1);
        // LRU order: a then b evicted, c survives
        assert!(graph.contains("c"));
    }

    #[test]
    fn test_score_policy_evicts_lowest_confidence_first() {
        let graph = GraphView::new();
        graph.upsert_claim(&sample_claim("shaky", 0.1));
        graph.upsert_claim(&sample_claim("solid", 0.9));

        let mut pressure = 1;
        enforce(&graph, EvictionPolicy::Score, || {
            if pressure > 0 {
                pressure -= 1;
                true
            } else {
                false
            }
        });

        assert!(!graph.contains("shaky"));
        assert!(graph.contains("solid"));
    }

    #[test]
    fn test_enforce_stops_on_empty_graph() {
        let graph = GraphView::new();
        graph.upsert_claim(&sample_claim("a", 0.5));
        graph.upsert_claim(&sample_claim("b", 0.5));

        // pressure never clears; loop must still terminate
        let evicted = enforce(&graph, EvictionPolicy::Score, || true);
        assert_eq!(evicted, 2);
        assert_eq!(graph.node_count(), 0);
    }
}
