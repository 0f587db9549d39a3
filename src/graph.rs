//! Claim Graph View - in-memory projection of persisted claims
//!
//! A directed multigraph keyed by claim id, with edges keyed by
//! (source, destination, predicate) to support parallel edges. The view is a
//! cache: absence of a node never implies the claim was not persisted, and
//! eviction removes nodes here without touching durable rows.
//!
//! The recency structure lives inside the same lock as the node map so the two
//! stay in lockstep: a node is tracked iff it is cached.

use crate::claim::Claim;
use crate::recency::RecencyList;
use crate::relation::Relation;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory projection of a claim: confidence plus the attribute bag.
#[derive(Debug, Clone, Default)]
pub struct CachedNode {
    /// Confidence score carried over from the claim
    pub confidence: f32,
    /// Attribute subset cached for traversal
    pub attributes: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default)]
struct GraphInner {
    /// All cached nodes indexed by claim id
    nodes: HashMap<String, CachedNode>,
    /// Outgoing edges indexed by source id
    edges_from: HashMap<String, Vec<Relation>>,
    /// Incoming edges indexed by destination id
    edges_to: HashMap<String, Vec<Relation>>,
    /// Last-touch ordering over cached node ids
    recency: RecencyList,
}

/// Internally synchronized graph view handed out by the facade as a live handle.
///
/// Writers hold the facade's global write lock; the internal `RwLock` lets
/// readers traverse concurrently without snapshot isolation.
#[derive(Debug, Default)]
pub struct GraphView {
    inner: RwLock<GraphInner>,
}

impl GraphView {
    /// Create an empty graph view
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a claim's node and relations, marking the node most recently used
    pub fn upsert_claim(&self, claim: &Claim) {
        let mut inner = self.write();

        let node = inner.nodes.entry(claim.id.clone()).or_default();
        node.confidence = claim.confidence;
        for (key, value) in &claim.attributes {
            node.attributes.insert(key.clone(), value.clone());
        }
        inner.recency.insert(&claim.id);

        for relation in &claim.relations {
            Self::upsert_relation(&mut inner, relation);
        }
    }

    /// Merge attributes into a cached node; returns false if the id is not cached
    pub fn patch_attributes(
        &self,
        id: &str,
        attributes: &HashMap<String, serde_json::Value>,
    ) -> bool {
        let mut inner = self.write();
        match inner.nodes.get_mut(id) {
            Some(node) => {
                for (key, value) in attributes {
                    node.attributes.insert(key.clone(), value.clone());
                }
                inner.recency.touch(id);
                true
            }
            None => false,
        }
    }

    /// Mark a node recently used; no-op if the id is not cached
    pub fn touch(&self, id: &str) -> bool {
        let mut inner = self.write();
        if inner.nodes.contains_key(id) {
            inner.recency.touch(id)
        } else {
            false
        }
    }

    /// Check whether a claim id is cached
    pub fn contains(&self, id: &str) -> bool {
        self.read().nodes.contains_key(id)
    }

    /// Get a cached node by claim id
    pub fn node(&self, id: &str) -> Option<CachedNode> {
        self.read().nodes.get(id).cloned()
    }

    /// Outgoing edges of a claim
    pub fn relations_from(&self, id: &str) -> Vec<Relation> {
        self.read().edges_from.get(id).cloned().unwrap_or_default()
    }

    /// Incoming edges of a claim
    pub fn relations_to(&self, id: &str) -> Vec<Relation> {
        self.read().edges_to.get(id).cloned().unwrap_or_default()
    }

    /// Number of cached nodes
    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    /// Number of cached edges
    pub fn edge_count(&self) -> usize {
        self.read().edges_from.values().map(|v| v.len()).sum()
    }

    /// The least-recently-used cached id (recency eviction candidate)
    pub fn least_recent(&self) -> Option<String> {
        self.read().recency.least_recent().map(str::to_string)
    }

    /// The cached id with the lowest confidence (score eviction candidate).
    /// NaN confidence sorts as 0.0.
    pub fn lowest_confidence(&self) -> Option<String> {
        let inner = self.read();
        inner
            .nodes
            .iter()
            .min_by(|(_, a), (_, b)| {
                let a = if a.confidence.is_nan() { 0.0 } else { a.confidence };
                let b = if b.confidence.is_nan() { 0.0 } else { b.confidence };
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| id.clone())
    }

    /// Remove a node and all incident edges from the in-memory projection only.
    /// Returns false if the id is not cached.
    pub fn remove_node(&self, id: &str) -> bool {
        let mut inner = self.write();
        if inner.nodes.remove(id).is_none() {
            return false;
        }
        inner.recency.remove(id);

        if let Some(outgoing) = inner.edges_from.remove(id) {
            for relation in &outgoing {
                let emptied = match inner.edges_to.get_mut(&relation.destination) {
                    Some(edges) => {
                        edges.retain(|e| e.source != id);
                        edges.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    inner.edges_to.remove(&relation.destination);
                }
            }
        }

        if let Some(incoming) = inner.edges_to.remove(id) {
            for relation in &incoming {
                let emptied = match inner.edges_from.get_mut(&relation.source) {
                    Some(edges) => {
                        edges.retain(|e| e.destination != id);
                        edges.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    inner.edges_from.remove(&relation.source);
                }
            }
        }

        true
    }

    /// Drop every cached node and edge
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.nodes.clear();
        inner.edges_from.clear();
        inner.edges_to.clear();
        inner.recency.clear();
    }

    /// Get statistics about the cached projection
    pub fn stats(&self) -> GraphStats {
        let inner = self.read();
        GraphStats {
            nodes: inner.nodes.len(),
            edges: inner.edges_from.values().map(|v| v.len()).sum(),
            tracked: inner.recency.len(),
        }
    }

    /// Copy the cached nodes and edges into a stable, sorted snapshot
    pub fn snapshot(&self) -> GraphSnapshot {
        let inner = self.read();
        let mut nodes: Vec<(String, CachedNode)> = inner
            .nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.clone()))
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut relations: Vec<Relation> = inner
            .edges_from
            .values()
            .flat_map(|v| v.iter().cloned())
            .collect();
        relations.sort_by(|a, b| {
            (&a.source, &a.destination, &a.predicate)
                .cmp(&(&b.source, &b.destination, &b.predicate))
        });

        GraphSnapshot { nodes, relations }
    }

    fn upsert_relation(inner: &mut GraphInner, relation: &Relation) {
        let outgoing = inner
            .edges_from
            .entry(relation.source.clone())
            .or_default();
        match outgoing.iter_mut().find(|e| e.same_key(relation)) {
            Some(existing) => existing.weight = relation.weight,
            None => outgoing.push(relation.clone()),
        }

        let incoming = inner
            .edges_to
            .entry(relation.destination.clone())
            .or_default();
        match incoming.iter_mut().find(|e| e.same_key(relation)) {
            Some(existing) => existing.weight = relation.weight,
            None => incoming.push(relation.clone()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// A stable copy of the cached graph for export
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    /// Cached nodes sorted by id
    pub nodes: Vec<(String, CachedNode)>,
    /// Cached edges sorted by (source, destination, predicate)
    pub relations: Vec<Relation>,
}

/// Statistics about the cached projection
#[derive(Debug, Clone)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub tracked: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph View Statistics:")?;
        writeln!(f, "  Nodes: {}", self.nodes)?;
        writeln!(f, "  Edges: {}", self.edges)?;
        writeln!(f, "  Tracked: {}", self.tracked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claim(id: &str, confidence: f32) -> Claim {
        Claim::new(id, "finding", "some fact").with_confidence(confidence)
    }

    #[test]
    fn test_upsert_and_retrieve_node() {
        let graph = GraphView::new();
        graph.upsert_claim(&sample_claim("c1", 0.8).with_attribute("source", "paper"));

        let node = graph.node("c1").unwrap();
        assert_eq!(node.confidence, 0.8);
        assert_eq!(node.attributes["source"], "paper");
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_parallel_edges_under_different_predicates() {
        let graph = GraphView::new();
        let claim = sample_claim("c1", 0.9)
            .with_relation(Relation::new("c1", "c2", "cites"))
            .with_relation(Relation::new("c1", "c2", "contradicts"));
        graph.upsert_claim(&claim);

        assert_eq!(graph.relations_from("c1").len(), 2);
        assert_eq!(graph.relations_to("c2").len(), 2);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_same_key_edge_updates_weight() {
        let graph = GraphView::new();
        graph.upsert_claim(
            &sample_claim("c1", 0.9).with_relation(Relation::new("c1", "c2", "cites")),
        );
        graph.upsert_claim(
            &sample_claim("c1", 0.9)
                .with_relation(Relation::new("c1", "c2", "cites").with_weight(0.4)),
        );

        let edges = graph.relations_from("c1");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 0.4);
        assert_eq!(graph.relations_to("c2")[0].weight, 0.4);
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let graph = GraphView::new();
        graph.upsert_claim(
            &sample_claim("c1", 0.9).with_relation(Relation::new("c1", "c2", "cites")),
        );
        graph.upsert_claim(
            &sample_claim("c2", 0.5).with_relation(Relation::new("c2", "c1", "refutes")),
        );

        assert!(graph.remove_node("c1"));
        assert!(!graph.contains("c1"));
        assert!(graph.relations_from("c1").is_empty());
        assert!(graph.relations_to("c1").is_empty());
        assert!(graph.relations_from("c2").is_empty());
        assert_eq!(graph.edge_count(), 0);

        // removal is in-memory only and idempotent
        assert!(!graph.remove_node("c1"));
    }

    #[test]
    fn test_recency_in_lockstep_with_nodes() {
        let graph = GraphView::new();
        graph.upsert_claim(&sample_claim("c1", 0.9));
        graph.upsert_claim(&sample_claim("c2", 0.5));

        let stats = graph.stats();
        assert_eq!(stats.nodes, stats.tracked);

        graph.remove_node("c1");
        let stats = graph.stats();
        assert_eq!(stats.nodes, 1);
        assert_eq!(stats.tracked, 1);
    }

    #[test]
    fn test_eviction_candidates() {
        let graph = GraphView::new();
        graph.upsert_claim(&sample_claim("low", 0.1));
        graph.upsert_claim(&sample_claim("high", 0.9));

        assert_eq!(graph.least_recent().as_deref(), Some("low"));
        assert_eq!(graph.lowest_confidence().as_deref(), Some("low"));

        graph.touch("low");
        assert_eq!(graph.least_recent().as_deref(), Some("high"));
        // score candidate is unaffected by recency
        assert_eq!(graph.lowest_confidence().as_deref(), Some("low"));
    }

    #[test]
    fn test_touch_absent_is_noop() {
        let graph = GraphView::new();
        assert!(!graph.touch("missing"));
    }

    #[test]
    fn test_patch_attributes() {
        let graph = GraphView::new();
        graph.upsert_claim(&sample_claim("c1", 0.9).with_attribute("a", 1));

        let mut patch = HashMap::new();
        patch.insert("b".to_string(), serde_json::json!("two"));
        assert!(graph.patch_attributes("c1", &patch));
        assert!(!graph.patch_attributes("missing", &patch));

        let node = graph.node("c1").unwrap();
        assert_eq!(node.attributes.len(), 2);
    }

    #[test]
    fn test_clear() {
        let graph = GraphView::new();
        graph.upsert_claim(
            &sample_claim("c1", 0.9).with_relation(Relation::new("c1", "c2", "cites")),
        );
        graph.clear();

        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.stats().tracked, 0);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let graph = GraphView::new();
        graph.upsert_claim(&sample_claim("b", 0.5));
        graph.upsert_claim(
            &sample_claim("a", 0.9).with_relation(Relation::new("a", "b", "cites")),
        );

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.nodes[0].0, "a");
        assert_eq!(snapshot.nodes[1].0, "b");
        assert_eq!(snapshot.relations.len(), 1);
    }
}
