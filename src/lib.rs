//! # Claimstore - Multi-backend claim persistence engine
//!
//! Persists atomic "claims" (facts with provenance) across three synchronized
//! representations:
//! - In-memory directed multigraph for fast traversal, bounded by a memory budget
//! - SQLite-backed relational store with approximate nearest-neighbor search
//! - RDF triple store for pattern queries and optional ontology inference
//!
//! The [`ClaimStore`] facade fans every write out to all three stores under a
//! single write lock; eviction keeps the in-memory projection within budget
//! without ever touching durable rows.

pub mod budget;
pub mod claim;
pub mod config;
pub mod evict;
pub mod export;
pub mod graph;
pub mod recency;
pub mod relation;
pub mod semantic;
pub mod storage;
pub mod store;

// Re-exports for convenient access
pub use claim::Claim;
pub use evict::EvictionPolicy;
pub use graph::GraphView;
pub use relation::Relation;
pub use semantic::SemanticStore;
pub use storage::{DbStats, DurableStore, SearchHit};
pub use store::ClaimStore;

/// Result type alias for claimstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for claimstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    #[error("Claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        /// Actionable hint surfaced alongside the message, when one exists
        suggestion: Option<String>,
    },

    #[error("Semantic query error: {0}")]
    SemanticQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a backend failure into the storage error kind
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            suggestion: None,
        }
    }

    /// Wrap a backend failure with an actionable suggestion
    pub fn storage_with_hint(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Suggestion text, if this error carries one
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Error::Storage { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::storage(e.to_string())
    }
}

impl From<oxigraph::store::StorageError> for Error {
    fn from(e: oxigraph::store::StorageError) -> Self {
        Error::storage(e.to_string())
    }
}

impl From<oxigraph::sparql::EvaluationError> for Error {
    fn from(e: oxigraph::sparql::EvaluationError) -> Self {
        Error::SemanticQuery(e.to_string())
    }
}

impl From<oxigraph::model::IriParseError> for Error {
    fn from(e: oxigraph::model::IriParseError) -> Self {
        Error::SemanticQuery(e.to_string())
    }
}
