//! Relation types - directed, labeled edges between claims
//!
//! A relation connects two claims under a free-form predicate. Multiple
//! relations may share the same (source, destination) pair under different
//! predicates - the graph view and the edges table both keep multi-edge
//! semantics keyed by (source, destination, predicate).

use serde::{Deserialize, Serialize};

/// A directed, labeled edge between two claims.
///
/// Identity is the (source, destination, predicate) triple; the weight is
/// payload and does not participate in equality or hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Claim id at the tail of the edge
    pub source: String,
    /// Claim id at the head of the edge
    pub destination: String,
    /// Free-form edge label ("cites", "supports", "contradicts", ...)
    pub predicate: String,
    /// Edge weight as supplied by the producer
    pub weight: f32,
}

impl Relation {
    /// Create a new relation with weight 1.0
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        predicate: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            predicate: predicate.into(),
            weight: 1.0,
        }
    }

    /// Set the edge weight
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Check whether another relation shares this relation's identity key
    pub fn same_key(&self, other: &Relation) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.predicate == other.predicate
    }
}

impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        self.same_key(other)
    }
}

impl Eq for Relation {}

impl std::hash::Hash for Relation {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.destination.hash(state);
        self.predicate.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_creation() {
        let rel = Relation::new("c1", "c2", "cites");
        assert_eq!(rel.source, "c1");
        assert_eq!(rel.destination, "c2");
        assert_eq!(rel.weight, 1.0);
    }

    #[test]
    fn test_weight_is_not_identity() {
        let a = Relation::new("c1", "c2", "cites").with_weight(0.3);
        let b = Relation::new("c1", "c2", "cites").with_weight(0.9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parallel_edges_differ_by_predicate() {
        let a = Relation::new("c1", "c2", "cites");
        let b = Relation::new("c1", "c2", "contradicts");
        assert_ne!(a, b);
    }
}
