//! Approximate nearest-neighbor index over stored embeddings
//!
//! The durable store owns the index lifecycle: the index is (re)built from the
//! `embeddings` table and reflects its rows as of the last build. Inserts
//! between builds are durable but not yet searchable. An initialized-but-empty
//! index answers with an empty result; a missing index is a storage error at
//! the call site, so callers can tell "nothing matched" from "search
//! unavailable".

use crate::{Error, Result};
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Layer cap passed to the HNSW builder (hnsw_rs caps at 16 internally)
const MAX_LAYER: usize = 16;

/// Distance metric used for index construction and search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine distance (1 - cosine similarity)
    Cosine,
    /// Euclidean (L2) distance
    Euclidean,
    /// Negated inner product; expects normalized vectors
    Dot,
}

impl DistanceMetric {
    /// Get the string representation of the metric
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Dot => "dot",
        }
    }

    /// Get all metrics
    pub fn all() -> &'static [DistanceMetric] {
        &[
            DistanceMetric::Cosine,
            DistanceMetric::Euclidean,
            DistanceMetric::Dot,
        ]
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cosine" | "cos" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "dot" | "ip" | "inner" => Ok(DistanceMetric::Dot),
            _ => Err(Error::InvalidConfig(format!(
                "Unknown distance metric: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build and search parameters for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    /// Whether vector search is available at all
    pub enabled: bool,
    /// HNSW graph degree (max connections per node)
    pub degree: usize,
    /// Construction-time candidate breadth
    pub ef_construction: usize,
    /// Search-time recall knob; clamped to at least `k` per query
    pub ef_search: usize,
    /// Distance metric
    pub metric: DistanceMetric,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            degree: 16,
            ef_construction: 200,
            ef_search: 64,
            metric: DistanceMetric::Cosine,
        }
    }
}

/// A single nearest-neighbor result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Claim id of the matched embedding row
    pub claim_id: String,
    /// Distance under the configured metric (lower is closer)
    pub distance: f32,
}

enum AnnBackend {
    Cosine(Hnsw<'static, f32, DistCosine>),
    Euclidean(Hnsw<'static, f32, DistL2>),
    Dot(Hnsw<'static, f32, DistDot>),
}

/// An HNSW index over embedding rows, mapping internal data ids back to claim ids.
pub struct VectorIndex {
    backend: AnnBackend,
    ids: Vec<String>,
    dim: usize,
    ef_search: usize,
}

impl VectorIndex {
    /// Build an index over (claim id, vector) rows. All vectors must share one
    /// dimension; an empty row set builds an empty index that answers with
    /// empty results.
    pub fn build(rows: Vec<(String, Vec<f32>)>, config: &VectorIndexConfig) -> Result<Self> {
        let dim = rows.first().map(|(_, v)| v.len()).unwrap_or(0);
        for (id, vector) in &rows {
            if vector.len() != dim {
                return Err(Error::storage(format!(
                    "Embedding dimension mismatch for {}: expected {}, got {}",
                    id,
                    dim,
                    vector.len()
                )));
            }
        }

        let capacity = rows.len().max(16);
        let degree = config.degree.max(2);
        let ef_construction = config.ef_construction.max(1);

        let backend = match config.metric {
            DistanceMetric::Cosine => {
                let hnsw = Hnsw::new(degree, capacity, MAX_LAYER, ef_construction, DistCosine {});
                for (i, (_, vector)) in rows.iter().enumerate() {
                    hnsw.insert((vector, i));
                }
                AnnBackend::Cosine(hnsw)
            }
            DistanceMetric::Euclidean => {
                let hnsw = Hnsw::new(degree, capacity, MAX_LAYER, ef_construction, DistL2 {});
                for (i, (_, vector)) in rows.iter().enumerate() {
                    hnsw.insert((vector, i));
                }
                AnnBackend::Euclidean(hnsw)
            }
            DistanceMetric::Dot => {
                let hnsw = Hnsw::new(degree, capacity, MAX_LAYER, ef_construction, DistDot {});
                for (i, (_, vector)) in rows.iter().enumerate() {
                    hnsw.insert((vector, i));
                }
                AnnBackend::Dot(hnsw)
            }
        };

        tracing::debug!(
            "Built {} vector index over {} embeddings (dim {})",
            config.metric,
            rows.len(),
            dim
        );

        Ok(Self {
            backend,
            ids: rows.into_iter().map(|(id, _)| id).collect(),
            dim,
            ef_search: config.ef_search,
        })
    }

    /// Number of indexed embeddings
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check whether the index holds no embeddings
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Dimension of the indexed vectors (0 for an empty index)
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Find up to `k` nearest neighbors of `query`. The search-time recall
    /// knob is applied best-effort by clamping it to at least `k`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(Error::storage(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dim
            )));
        }

        let ef = self.ef_search.max(k);
        let neighbours = match &self.backend {
            AnnBackend::Cosine(hnsw) => hnsw.search(query, k, ef),
            AnnBackend::Euclidean(hnsw) => hnsw.search(query, k, ef),
            AnnBackend::Dot(hnsw) => hnsw.search(query, k, ef),
        };

        Ok(neighbours
            .into_iter()
            .filter_map(|n| {
                self.ids.get(n.d_id).map(|id| SearchHit {
                    claim_id: id.clone(),
                    distance: n.distance,
                })
            })
            .collect())
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("len", &self.ids.len())
            .field("dim", &self.dim)
            .field("ef_search", &self.ef_search)
            .finish()
    }
}
