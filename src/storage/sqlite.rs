//! SQLite storage implementation

use super::schema;
use super::vector::{SearchHit, VectorIndex, VectorIndexConfig};
use crate::claim::Claim;
use crate::relation::Relation;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// SQLite-backed durable store for nodes, edges, and embeddings.
///
/// Owns the approximate nearest-neighbor index lifecycle: the index is rebuilt
/// from the `embeddings` table on demand and reflects its rows as of the last
/// rebuild. Inserts are independent per table; there is no cross-table
/// transaction on the claim write path.
pub struct DurableStore {
    conn: Connection,
    vector: Option<VectorIndex>,
    vector_config: Option<VectorIndexConfig>,
}

impl DurableStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            vector: None,
            vector_config: None,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            vector: None,
            vector_config: None,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Node Operations ==========

    /// Insert or refresh a claim's node row
    pub fn insert_node(&self, claim: &Claim) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO nodes (id, kind, content, confidence)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![claim.id, claim.kind, claim.content, claim.confidence],
        )?;
        Ok(())
    }

    /// Get a node row by claim id
    pub fn get_node(&self, id: &str) -> Result<Option<NodeRow>> {
        self.conn
            .query_row(
                "SELECT id, kind, content, confidence, timestamp FROM nodes WHERE id = ?1",
                [id],
                |row| {
                    Ok(NodeRow {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        content: row.get(2)?,
                        confidence: row.get(3)?,
                        timestamp: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Find node rows by kind
    pub fn find_nodes_by_kind(&self, kind: &str) -> Result<Vec<NodeRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, content, confidence, timestamp FROM nodes WHERE kind = ?1",
        )?;

        let rows = stmt
            .query_map([kind], |row| {
                Ok(NodeRow {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    content: row.get(2)?,
                    confidence: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// Count all nodes
    pub fn count_nodes(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Edge Operations ==========

    /// Insert or replace an edge row, keyed by (source, destination, predicate)
    pub fn insert_relation(&self, relation: &Relation) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO edges (source, destination, predicate, weight)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                relation.source,
                relation.destination,
                relation.predicate,
                relation.weight,
            ],
        )?;
        Ok(())
    }

    /// Get edges from a claim
    pub fn relations_from(&self, id: &str) -> Result<Vec<Relation>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, destination, predicate, weight FROM edges WHERE source = ?1",
        )?;

        let relations = stmt
            .query_map([id], |row| self.row_to_relation(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(relations)
    }

    /// Get edges to a claim (reverse lookup)
    pub fn relations_to(&self, id: &str) -> Result<Vec<Relation>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, destination, predicate, weight FROM edges WHERE destination = ?1",
        )?;

        let relations = stmt
            .query_map([id], |row| self.row_to_relation(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(relations)
    }

    /// Count all edges
    pub fn count_edges(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Helper to convert a row to a Relation
    fn row_to_relation(&self, row: &rusqlite::Row) -> rusqlite::Result<Relation> {
        Ok(Relation {
            source: row.get(0)?,
            destination: row.get(1)?,
            predicate: row.get(2)?,
            weight: row.get(3)?,
        })
    }

    // ========== Embedding Operations ==========

    /// Insert or replace an embedding row
    pub fn insert_embedding(&self, id: &str, vector: &[f32]) -> Result<()> {
        let blob: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();

        self.conn.execute(
            "INSERT OR REPLACE INTO embeddings (node_id, vector) VALUES (?1, ?2)",
            params![id, blob],
        )?;
        Ok(())
    }

    /// Get an embedding by claim id
    pub fn get_embedding(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let result: Option<Vec<u8>> = self
            .conn
            .query_row("SELECT vector FROM embeddings WHERE node_id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(result.map(|blob| unpack_vector(&blob)))
    }

    /// All embedding rows (index build input)
    pub fn all_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let mut stmt = self.conn.prepare("SELECT node_id, vector FROM embeddings")?;

        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, unpack_vector(&blob)))
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// Count embeddings
    pub fn count_embeddings(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Vector Index Lifecycle ==========

    /// Rebuild the nearest-neighbor index from the `embeddings` table.
    /// Returns the number of indexed rows.
    pub fn rebuild_vector_index(&mut self, config: &VectorIndexConfig) -> Result<usize> {
        let rows = self.all_embeddings()?;
        let count = rows.len();
        self.vector = Some(VectorIndex::build(rows, config)?);
        self.vector_config = Some(config.clone());
        Ok(count)
    }

    /// Check whether an index has been built
    pub fn has_vector_index(&self) -> bool {
        self.vector.is_some()
    }

    /// Search the nearest-neighbor index.
    ///
    /// An initialized-but-empty index yields an empty result; a missing index
    /// is a storage error so callers can tell the two apart.
    pub fn vector_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        match &self.vector {
            Some(index) => index.search(query, k),
            None => Err(Error::storage_with_hint(
                "Vector index not initialized",
                "enable vector search in the store configuration and rebuild the index",
            )),
        }
    }

    // ========== Bulk Operations ==========

    /// Delete all rows from every table, resetting the index to empty if built
    pub fn clear_all(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM embeddings", [])?;
        self.conn.execute("DELETE FROM edges", [])?;
        self.conn.execute("DELETE FROM nodes", [])?;

        if let Some(config) = self.vector_config.clone() {
            self.vector = Some(VectorIndex::build(Vec::new(), &config)?);
        }
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            nodes: self.count_nodes()?,
            edges: self.count_edges()?,
            embeddings: self.count_embeddings()?,
            indexed: self.vector.as_ref().map(|v| v.len()).unwrap_or(0),
        })
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("vector", &self.vector)
            .finish()
    }
}

/// Unpack an f32 little-endian blob into a vector
fn unpack_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// A persisted node row
#[derive(Debug, Clone)]
pub struct NodeRow {
    pub id: String,
    pub kind: String,
    pub content: String,
    pub confidence: f32,
    pub timestamp: i64,
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DbStats {
    pub nodes: usize,
    pub edges: usize,
    pub embeddings: usize,
    pub indexed: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Nodes: {}", self.nodes)?;
        writeln!(f, "  Edges: {}", self.edges)?;
        writeln!(f, "  Embeddings: {}", self.embeddings)?;
        writeln!(f, "  Indexed: {}", self.indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claim(id: &str, confidence: f32) -> Claim {
        Claim::new(id, "finding", "some fact").with_confidence(confidence)
    }

    #[test]
    fn test_node_crud() {
        let store = DurableStore::open_in_memory().unwrap();

        store.insert_node(&sample_claim("c1", 0.9)).unwrap();

        let row = store.get_node("c1").unwrap().unwrap();
        assert_eq!(row.kind, "finding");
        assert_eq!(row.content, "some fact");
        assert!((row.confidence - 0.9).abs() < 1e-6);
        assert!(row.timestamp > 0);
        assert!(store.get_node("missing").unwrap().is_none());
    }

    #[test]
    fn test_relation_crud() {
        let store = DurableStore::open_in_memory().unwrap();

        store
            .insert_relation(&Relation::new("c1", "c2", "cites"))
            .unwrap();
        store
            .insert_relation(&Relation::new("c1", "c2", "contradicts"))
            .unwrap();

        // parallel predicates are distinct rows
        assert_eq!(store.relations_from("c1").unwrap().len(), 2);
        assert_eq!(store.relations_to("c2").unwrap().len(), 2);

        // same key replaces the weight instead of duplicating
        store
            .insert_relation(&Relation::new("c1", "c2", "cites").with_weight(0.5))
            .unwrap();
        assert_eq!(store.count_edges().unwrap(), 2);
        let cites = store
            .relations_from("c1")
            .unwrap()
            .into_iter()
            .find(|r| r.predicate == "cites")
            .unwrap();
        assert_eq!(cites.weight, 0.5);
    }

    #[test]
    fn test_embedding_roundtrip() {
        let store = DurableStore::open_in_memory().unwrap();

        let vector = vec![0.1, 0.2, 0.3, 0.4];
        store.insert_embedding("c1", &vector).unwrap();

        let retrieved = store.get_embedding("c1").unwrap().unwrap();
        assert_eq!(retrieved.len(), 4);
        assert!((retrieved[0] - 0.1).abs() < 0.001);
        assert!(store.get_embedding("missing").unwrap().is_none());
    }

    #[test]
    fn test_vector_search_requires_index() {
        let store = DurableStore::open_in_memory().unwrap();
        let err = store.vector_search(&[0.1, 0.2], 1).unwrap_err();
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_rebuild_and_search() {
        let mut store = DurableStore::open_in_memory().unwrap();
        store.insert_embedding("c1", &[1.0, 0.0, 0.0]).unwrap();
        store.insert_embedding("c2", &[0.0, 1.0, 0.0]).unwrap();

        let indexed = store
            .rebuild_vector_index(&VectorIndexConfig::default())
            .unwrap();
        assert_eq!(indexed, 2);

        let hits = store.vector_search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].claim_id, "c1");
    }

    #[test]
    fn test_index_reflects_rows_as_of_last_build() {
        let mut store = DurableStore::open_in_memory().unwrap();
        store
            .rebuild_vector_index(&VectorIndexConfig::default())
            .unwrap();

        // inserted after the build: durable, but not yet searchable
        store.insert_embedding("c1", &[1.0, 0.0, 0.0]).unwrap();
        assert!(store.vector_search(&[1.0, 0.0, 0.0], 1).unwrap().is_empty());

        store
            .rebuild_vector_index(&VectorIndexConfig::default())
            .unwrap();
        assert_eq!(store.vector_search(&[1.0, 0.0, 0.0], 1).unwrap().len(), 1);
    }

    #[test]
    fn test_clear_all() {
        let mut store = DurableStore::open_in_memory().unwrap();
        store.insert_node(&sample_claim("c1", 0.9)).unwrap();
        store
            .insert_relation(&Relation::new("c1", "c2", "cites"))
            .unwrap();
        store.insert_embedding("c1", &[0.1, 0.2]).unwrap();
        store
            .rebuild_vector_index(&VectorIndexConfig::default())
            .unwrap();

        store.clear_all().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.nodes, 0);
        assert_eq!(stats.edges, 0);
        assert_eq!(stats.embeddings, 0);
        assert_eq!(stats.indexed, 0);

        // index still initialized: empty result, not an error
        assert!(store.vector_search(&[0.1, 0.2], 1).unwrap().is_empty());
    }

    #[test]
    fn test_find_nodes_by_kind() {
        let store = DurableStore::open_in_memory().unwrap();
        store.insert_node(&sample_claim("c1", 0.9)).unwrap();
        store
            .insert_node(&Claim::new("s1", "source", "a textbook"))
            .unwrap();

        assert_eq!(store.find_nodes_by_kind("finding").unwrap().len(), 1);
        assert_eq!(store.find_nodes_by_kind("source").unwrap().len(), 1);
    }
}
