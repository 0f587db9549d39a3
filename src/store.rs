//! Persistence Facade - single entry point over the three stores
//!
//! [`ClaimStore`] fans each claim write out to the in-memory graph view, the
//! durable relational store, and the semantic triple store under one global
//! write lock, then runs budget enforcement. Backends initialize lazily on
//! first use (double-checked under the setup lock) and tear down explicitly.
//!
//! Consistency is soft by design: the three stores share no transaction, a
//! failing store does not roll back the others, and the graph view is a cache
//! whose absence never implies a claim was not persisted.

use crate::budget::BudgetTracker;
use crate::claim::Claim;
use crate::config::StoreConfig;
use crate::evict;
use crate::export;
use crate::graph::{GraphStats, GraphView};
use crate::semantic::SemanticStore;
use crate::storage::{DbStats, DurableStore, SearchHit};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Lazily-initialized backend bundle shared by all operations.
struct Backends {
    graph: Arc<GraphView>,
    durable: Mutex<DurableStore>,
    semantic: Arc<SemanticStore>,
    budget: Mutex<BudgetTracker>,
    evicted: AtomicU64,
}

/// The persistence engine: one explicit context owning configuration, the
/// backend handles, and the write lock. Construct one per process and share
/// it across threads; all operations take `&self`.
pub struct ClaimStore {
    config: StoreConfig,
    state: RwLock<Option<Arc<Backends>>>,
    write_lock: Mutex<()>,
}

impl ClaimStore {
    /// Create a store with the given configuration. No I/O happens until the
    /// first operation (or an explicit [`ClaimStore::setup`]).
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// The configuration this store was built with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ========== Lifecycle ==========

    /// Initialize the backends. Re-entrant: after a successful setup this is
    /// a no-op.
    pub fn setup(&self) -> Result<()> {
        self.backends().map(|_| ())
    }

    /// Drop the backend handles; optionally delete the on-disk artifacts.
    /// A later operation re-initializes from scratch.
    pub fn teardown(&self, remove_artifacts: bool) -> Result<()> {
        let _write = lock(&self.write_lock);
        {
            let mut guard = self
                .state
                .write()
                .unwrap_or_else(|e| e.into_inner());
            if guard.take().is_some() {
                tracing::info!("Tearing down claim store backends");
            }
        }

        if remove_artifacts {
            if self.config.database.exists() {
                std::fs::remove_file(&self.config.database)?;
            }
            if let Some(path) = &self.config.semantic_path {
                if path.exists() {
                    std::fs::remove_dir_all(path)?;
                }
            }
        }
        Ok(())
    }

    // ========== Producer API ==========

    /// Persist a claim into all three stores.
    ///
    /// Under the global write lock: upsert into the graph view, insert
    /// node/edge/embedding rows, insert one triple per attribute, refresh
    /// recency, then enforce the memory budget. Store failures are logged and
    /// the remaining inserts still run; the first failure is returned after
    /// the fan-out completes, and the in-memory mutation is not rolled back.
    pub fn persist_claim(&self, claim: &Claim) -> Result<()> {
        claim.validate()?;
        let backends = self.backends()?;
        let _write = lock(&self.write_lock);

        backends.graph.upsert_claim(claim);

        let mut first_error: Option<Error> = None;
        {
            let durable = lock(&backends.durable);
            if let Err(e) = durable.insert_node(claim) {
                tracing::warn!("Node insert failed for {}: {}", claim.id, e);
                first_error.get_or_insert(e);
            }
            for relation in &claim.relations {
                if let Err(e) = durable.insert_relation(relation) {
                    tracing::warn!(
                        "Edge insert failed for {} -> {}: {}",
                        relation.source,
                        relation.destination,
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
            if let Some(embedding) = &claim.embedding {
                if let Err(e) = durable.insert_embedding(&claim.id, embedding) {
                    tracing::warn!("Embedding insert failed for {}: {}", claim.id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if !claim.attributes.is_empty() {
            if let Err(e) = backends.semantic.insert_claim(claim) {
                tracing::warn!("Semantic insert failed for {}: {}", claim.id, e);
                first_error.get_or_insert(e);
            }
        }

        backends.graph.touch(&claim.id);
        self.enforce_budget(&backends);

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Patch attributes of an already-persisted claim (in the graph view when
    /// cached, and in the semantic store). Content and kind are write-once.
    pub fn update_claim(
        &self,
        id: &str,
        attributes: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let backends = self.backends()?;
        let _write = lock(&self.write_lock);

        let known = lock(&backends.durable).get_node(id)?.is_some();
        if !known {
            return Err(Error::ClaimNotFound(id.to_string()));
        }

        backends.graph.patch_attributes(id, attributes);
        backends.semantic.insert_attributes(id, attributes)?;
        self.enforce_budget(&backends);
        Ok(())
    }

    /// Reconstruct a claim from the durable row, its edges and embedding, and
    /// the attribute triples. Returns `None` for an unknown id.
    pub fn get_claim(&self, id: &str) -> Result<Option<Claim>> {
        let backends = self.backends()?;

        let (row, relations, embedding) = {
            let durable = lock(&backends.durable);
            let Some(row) = durable.get_node(id)? else {
                return Ok(None);
            };
            (
                row,
                durable.relations_from(id)?,
                durable.get_embedding(id)?,
            )
        };
        let attributes = backends.semantic.attributes_of(id)?;

        Ok(Some(Claim {
            id: row.id,
            kind: row.kind,
            content: row.content,
            confidence: row.confidence,
            attributes,
            relations,
            embedding,
        }))
    }

    /// Mark a cached node recently used; no-op if the id is not cached.
    pub fn touch_node(&self, id: &str) -> Result<()> {
        let backends = self.backends()?;
        backends.graph.touch(id);
        Ok(())
    }

    /// Nearest-neighbor search over stored embeddings. Returns up to `k` hits
    /// ordered by the configured metric; an initialized-but-empty index
    /// yields an empty list, while an unavailable index is a storage error.
    pub fn vector_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let backends = self.backends()?;
        lock(&backends.durable).vector_search(query, k)
    }

    /// Rebuild the vector index from the `embeddings` table so that rows
    /// inserted since the last build become searchable.
    pub fn rebuild_vector_index(&self) -> Result<usize> {
        if !self.config.vector.enabled {
            return Err(Error::storage_with_hint(
                "Vector search is disabled",
                "set vector.enabled = true in the store configuration",
            ));
        }
        let backends = self.backends()?;
        lock(&backends.durable).rebuild_vector_index(&self.config.vector)
    }

    // ========== Administrative API ==========

    /// Empty all three stores and the in-memory structures.
    pub fn clear_all(&self) -> Result<()> {
        let backends = self.backends()?;
        let _write = lock(&self.write_lock);

        backends.graph.clear();
        lock(&backends.durable).clear_all()?;
        backends.semantic.clear()?;
        Ok(())
    }

    /// Live handle to the in-memory graph view
    pub fn graph(&self) -> Result<Arc<GraphView>> {
        Ok(self.backends()?.graph.clone())
    }

    /// Live handle to the semantic store (pattern and SPARQL queries)
    pub fn semantic(&self) -> Result<Arc<SemanticStore>> {
        Ok(self.backends()?.semantic.clone())
    }

    /// Export the graph view as a GraphML document
    pub fn export_graphml(&self) -> Result<String> {
        let backends = self.backends()?;
        Ok(export::to_graphml(&backends.graph.snapshot()))
    }

    /// Export the graph view as a node-link JSON document
    pub fn export_json(&self) -> Result<serde_json::Value> {
        let backends = self.backends()?;
        Ok(export::to_json(&backends.graph.snapshot()))
    }

    /// Counts across all three stores plus the cumulative eviction counter
    pub fn stats(&self) -> Result<StoreStats> {
        let backends = self.backends()?;
        Ok(StoreStats {
            graph: backends.graph.stats(),
            durable: lock(&backends.durable).stats()?,
            triples: backends.semantic.triple_count()?,
            evicted: backends.evicted.load(Ordering::Relaxed),
        })
    }

    /// Total nodes evicted from the graph view since setup
    pub fn evicted_total(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|b| b.evicted.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // ========== Internals ==========

    /// Get the backends, initializing them on first call. Double-checked so
    /// concurrent callers never observe a half-initialized bundle.
    fn backends(&self) -> Result<Arc<Backends>> {
        {
            let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
            if let Some(backends) = guard.as_ref() {
                return Ok(backends.clone());
            }
        }

        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(backends) = guard.as_ref() {
            return Ok(backends.clone());
        }

        let backends = Arc::new(self.open_backends()?);
        *guard = Some(backends.clone());
        Ok(backends)
    }

    fn open_backends(&self) -> Result<Backends> {
        tracing::info!("Opening claim store at {}", self.config.database.display());
        crate::config::ensure_db_dir(&self.config.database)
            .map_err(|e| Error::storage(e.to_string()))?;

        // Relational store is required: open failure is fatal.
        let mut durable = DurableStore::open(&self.config.database)?;
        if self.config.vector.enabled {
            if let Err(e) = durable.rebuild_vector_index(&self.config.vector) {
                tracing::warn!("Vector index build failed; vector search unavailable: {}", e);
            }
        }

        // Semantic store degrades to an in-memory instance on failure.
        let semantic = match &self.config.semantic_path {
            Some(path) => {
                let opened = std::fs::create_dir_all(path)
                    .map_err(Error::from)
                    .and_then(|_| SemanticStore::open(path, self.config.inference));
                match opened {
                    Ok(store) => store,
                    Err(e) => {
                        tracing::warn!(
                            "Could not open semantic store at {}: {}; falling back to in-memory",
                            path.display(),
                            e
                        );
                        SemanticStore::in_memory(self.config.inference)?
                    }
                }
            }
            None => SemanticStore::in_memory(self.config.inference)?,
        };

        Ok(Backends {
            graph: Arc::new(GraphView::new()),
            durable: Mutex::new(durable),
            semantic: Arc::new(semantic),
            budget: Mutex::new(BudgetTracker::new()),
            evicted: AtomicU64::new(0),
        })
    }

    /// Evict while the measured footprint exceeds the budget. Runs on the
    /// writer thread, synchronously after its own write.
    fn enforce_budget(&self, backends: &Backends) {
        let budget_mb = self.config.memory_budget_mb;
        if budget_mb == 0 {
            return;
        }
        let evicted = evict::enforce(&backends.graph, self.config.eviction_policy, || {
            lock(&backends.budget).is_over_budget(budget_mb)
        });
        if evicted > 0 {
            backends.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(
                "Evicted {} nodes to satisfy the {} MB budget",
                evicted,
                budget_mb
            );
        }
    }
}

impl Default for ClaimStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl std::fmt::Debug for ClaimStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimStore")
            .field("config", &self.config)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Counts across the three stores plus the eviction counter
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub graph: GraphStats,
    pub durable: DbStats,
    pub triples: usize,
    pub evicted: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.graph)?;
        write!(f, "{}", self.durable)?;
        writeln!(f, "  Triples: {}", self.triples)?;
        writeln!(f, "  Evicted: {}", self.evicted)
    }
}
