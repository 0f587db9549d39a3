//! Claim types - atomic facts with provenance
//!
//! A claim is the unit of persistence: a globally unique id, a free-form kind,
//! write-once content, a confidence score, an open attribute bag, outgoing
//! relations, and an optional embedding vector supplied by the producer.

use crate::relation::Relation;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An atomic fact emitted by the research assistant.
///
/// Content is write-once per id: persisting the same id again refreshes the
/// durable row, while updates are expected to patch `attributes` rather than
/// replace the claim wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Globally unique identifier
    pub id: String,
    /// Free-form claim category ("finding", "hypothesis", "source", ...)
    pub kind: String,
    /// The fact itself
    pub content: String,
    /// Confidence score in [0.0, 1.0]
    pub confidence: f32,
    /// Open attribute bag (provenance, tags, source URLs, ...)
    pub attributes: HashMap<String, serde_json::Value>,
    /// Outgoing relations to other claims
    pub relations: Vec<Relation>,
    /// Optional embedding vector for similarity search
    pub embedding: Option<Vec<f32>>,
}

impl Claim {
    /// Create a new claim with full confidence and no attributes
    pub fn new(id: impl Into<String>, kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            content: content.into(),
            confidence: 1.0,
            attributes: HashMap::new(),
            relations: Vec::new(),
            embedding: None,
        }
    }

    /// Set the confidence score (clamped to [0.0, 1.0])
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Add an attribute
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add an outgoing relation
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Set the embedding vector
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Validate producer-supplied fields before persistence
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidClaim("claim id must be non-empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_creation() {
        let claim = Claim::new("c1", "finding", "water boils at 100C at sea level")
            .with_confidence(0.9)
            .with_attribute("source", "textbook")
            .with_relation(Relation::new("c1", "s1", "cites"));

        assert_eq!(claim.id, "c1");
        assert_eq!(claim.confidence, 0.9);
        assert_eq!(claim.attributes.len(), 1);
        assert_eq!(claim.relations.len(), 1);
        assert!(claim.embedding.is_none());
    }

    #[test]
    fn test_confidence_clamped() {
        let claim = Claim::new("c1", "finding", "x").with_confidence(1.7);
        assert_eq!(claim.confidence, 1.0);
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(Claim::new("", "finding", "x").validate().is_err());
        assert!(Claim::new("  ", "finding", "x").validate().is_err());
        assert!(Claim::new("c1", "finding", "x").validate().is_ok());
    }
}
