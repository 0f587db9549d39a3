//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - nodes(id, kind, content, confidence, timestamp)
//! - edges(source, destination, predicate, weight)
//! - embeddings(node_id, vector)
//!
//! The approximate nearest-neighbor index over `embeddings.vector` lives in
//! [`vector`] and is owned by [`DurableStore`].

pub mod schema;
pub mod sqlite;
pub mod vector;

pub use sqlite::{DbStats, DurableStore, NodeRow};
pub use vector::{DistanceMetric, SearchHit, VectorIndex, VectorIndexConfig};
