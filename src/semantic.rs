//! Semantic Store - RDF triple projection of claims
//!
//! Each claim becomes a subject IRI derived from its id; every attribute
//! key/value pair becomes one (subject, predicate, literal) triple. The store
//! supports wildcard pattern queries, SPARQL SELECT as the join-capable query
//! language, and optional RDFS inference materialized before querying.
//!
//! Backing storage is oxigraph, either in memory or persistent at a
//! configurable path - both expose the identical insert/query contract.

use crate::claim::Claim;
use crate::{Error, Result};
use oxigraph::model::vocab::xsd;
use oxigraph::model::{GraphName, Literal, NamedNode, Quad, Subject, Term};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Namespace for claim subjects
const CLAIM_NS: &str = "urn:claim:";
/// Namespace for attribute predicates
const ATTR_NS: &str = "urn:claim:attr:";
/// Datatype IRI for attribute values that are not RDF-native scalars
const RDF_JSON: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#JSON";

/// Fixpoint bound for the inference loop; each round propagates one level of
/// a subclass/subproperty chain
const MAX_INFERENCE_ROUNDS: usize = 8;

const SUBCLASS_RULE: &str = r#"
PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
INSERT { ?s rdf:type ?super } WHERE { ?s rdf:type ?sub . ?sub rdfs:subClassOf ?super }
"#;

const SUBPROPERTY_RULE: &str = r#"
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
INSERT { ?s ?super ?o } WHERE { ?s ?sub ?o . ?sub rdfs:subPropertyOf ?super }
"#;

/// One matched triple from a pattern query, with literal objects unquoted.
#[derive(Debug, Clone, PartialEq)]
pub struct TripleMatch {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// Triple store over claims, with optional ontology inference.
pub struct SemanticStore {
    store: Store,
    inference: bool,
    dirty: AtomicBool,
    persistent: bool,
}

impl SemanticStore {
    /// Create an in-memory store
    pub fn in_memory(inference: bool) -> Result<Self> {
        Ok(Self {
            store: Store::new()?,
            inference,
            dirty: AtomicBool::new(false),
            persistent: false,
        })
    }

    /// Open a persistent store at the given directory (creates if absent)
    pub fn open(path: &Path, inference: bool) -> Result<Self> {
        Ok(Self {
            store: Store::open(path)?,
            inference,
            dirty: AtomicBool::new(true),
            persistent: true,
        })
    }

    /// Whether this store survives process restarts
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Subject IRI derived from a claim id
    pub fn claim_subject(id: &str) -> Result<NamedNode> {
        Ok(NamedNode::new(format!("{}{}", CLAIM_NS, iri_escape(id)))?)
    }

    /// Predicate IRI derived from an attribute key
    pub fn attribute_predicate(key: &str) -> Result<NamedNode> {
        Ok(NamedNode::new(format!("{}{}", ATTR_NS, iri_escape(key)))?)
    }

    // ========== Insert Operations ==========

    /// Insert one triple per attribute of the claim; returns the triple count
    pub fn insert_claim(&self, claim: &Claim) -> Result<usize> {
        self.insert_attributes(&claim.id, &claim.attributes)
    }

    /// Insert one triple per attribute key/value for the given claim id
    pub fn insert_attributes(
        &self,
        id: &str,
        attributes: &HashMap<String, serde_json::Value>,
    ) -> Result<usize> {
        if attributes.is_empty() {
            return Ok(0);
        }
        let subject = Self::claim_subject(id)?;
        let mut inserted = 0;
        for (key, value) in attributes {
            let quad = Quad::new(
                subject.clone(),
                Self::attribute_predicate(key)?,
                literal_from_value(value),
                GraphName::DefaultGraph,
            );
            self.store.insert(&quad)?;
            inserted += 1;
        }
        self.dirty.store(true, Ordering::SeqCst);
        Ok(inserted)
    }

    /// Insert a raw triple. The object is stored as an IRI when it parses as
    /// one and contains a scheme separator, otherwise as a plain literal -
    /// this is the hook for loading ontology statements (rdfs:subClassOf and
    /// friends) next to claim attributes.
    pub fn insert_triple(&self, subject: &str, predicate: &str, object: &str) -> Result<()> {
        let subject = NamedNode::new(subject)?;
        let predicate = NamedNode::new(predicate)?;
        let object: Term = if object.contains(':') {
            match NamedNode::new(object) {
                Ok(node) => node.into(),
                Err(_) => Literal::new_simple_literal(object).into(),
            }
        } else {
            Literal::new_simple_literal(object).into()
        };
        let quad = Quad::new(subject, predicate, object, GraphName::DefaultGraph);
        self.store.insert(&quad)?;
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    // ========== Query Operations ==========

    /// Wildcard pattern query. `None` matches anything; subjects and
    /// predicates are IRIs, object patterns match the literal value (or the
    /// IRI string for non-literal objects). Malformed IRIs propagate as
    /// semantic query errors.
    pub fn pattern(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Result<Vec<TripleMatch>> {
        self.maybe_infer()?;

        let subject_node = subject.map(NamedNode::new).transpose()?;
        let predicate_node = predicate.map(NamedNode::new).transpose()?;

        let mut matches = Vec::new();
        for quad in self.store.quads_for_pattern(
            subject_node.as_ref().map(|n| n.as_ref().into()),
            predicate_node.as_ref().map(|n| n.as_ref()),
            None,
            None,
        ) {
            let quad = quad?;
            let object_text = term_text(&quad.object);
            if let Some(wanted) = object {
                if object_text != wanted {
                    continue;
                }
            }
            matches.push(TripleMatch {
                subject: subject_text(&quad.subject),
                predicate: quad.predicate.as_str().to_string(),
                object: object_text,
            });
        }
        Ok(matches)
    }

    /// Run a SPARQL SELECT (or ASK) query; rows are (variable, term) pairs.
    /// Malformed queries propagate as semantic query errors.
    pub fn query_select(&self, sparql: &str) -> Result<Vec<Vec<(String, String)>>> {
        self.maybe_infer()?;

        match self.store.query(sparql)? {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution?;
                    rows.push(
                        solution
                            .iter()
                            .map(|(var, term)| (var.as_str().to_string(), term.to_string()))
                            .collect(),
                    );
                }
                Ok(rows)
            }
            QueryResults::Boolean(value) => {
                Ok(vec![vec![("boolean".to_string(), value.to_string())]])
            }
            QueryResults::Graph(_) => Err(Error::SemanticQuery(
                "CONSTRUCT/DESCRIBE queries are not supported; use SELECT".to_string(),
            )),
        }
    }

    /// Reconstruct the attribute bag of a claim from its triples
    pub fn attributes_of(&self, id: &str) -> Result<HashMap<String, serde_json::Value>> {
        let subject = Self::claim_subject(id)?;
        let mut attributes = HashMap::new();
        for quad in self.store.quads_for_pattern(
            Some(subject.as_ref().into()),
            None,
            None,
            None,
        ) {
            let quad = quad?;
            let Some(escaped_key) = quad.predicate.as_str().strip_prefix(ATTR_NS) else {
                continue;
            };
            if let Term::Literal(literal) = &quad.object {
                attributes.insert(iri_unescape(escaped_key), value_from_literal(literal));
            }
        }
        Ok(attributes)
    }

    /// Total triple count
    pub fn triple_count(&self) -> Result<usize> {
        Ok(self.store.len()?)
    }

    /// Drop every triple
    pub fn clear(&self) -> Result<()> {
        self.store.clear()?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    // ========== Inference ==========

    /// Materialize RDFS consequences now, regardless of the dirty flag
    pub fn infer_now(&self) -> Result<()> {
        for _ in 0..MAX_INFERENCE_ROUNDS {
            let before = self.store.len()?;
            self.store.update(SUBCLASS_RULE)?;
            self.store.update(SUBPROPERTY_RULE)?;
            if self.store.len()? == before {
                break;
            }
        }
        Ok(())
    }

    /// Apply inference before a query when enabled and new triples arrived
    fn maybe_infer(&self) -> Result<()> {
        if !self.inference {
            return Ok(());
        }
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("Materializing RDFS consequences before query");
        self.infer_now()
    }
}

impl std::fmt::Debug for SemanticStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticStore")
            .field("inference", &self.inference)
            .field("persistent", &self.persistent)
            .finish()
    }
}

/// Map a JSON attribute value onto an RDF literal
fn literal_from_value(value: &serde_json::Value) -> Literal {
    match value {
        serde_json::Value::String(s) => Literal::new_simple_literal(s),
        serde_json::Value::Bool(b) => Literal::from(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Literal::from(i),
            None => Literal::from(n.as_f64().unwrap_or(0.0)),
        },
        other => Literal::new_typed_literal(
            other.to_string(),
            NamedNode::new_unchecked(RDF_JSON),
        ),
    }
}

/// Map an RDF literal back onto a JSON attribute value
fn value_from_literal(literal: &Literal) -> serde_json::Value {
    let datatype = literal.datatype();
    let text = literal.value();
    if datatype == xsd::BOOLEAN {
        text.parse::<bool>()
            .map(serde_json::Value::Bool)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
    } else if datatype == xsd::INTEGER {
        text.parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
    } else if datatype == xsd::DOUBLE || datatype == xsd::DECIMAL {
        text.parse::<f64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
    } else if datatype.as_str() == RDF_JSON {
        serde_json::from_str(text)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
    } else {
        serde_json::Value::String(text.to_string())
    }
}

fn subject_text(subject: &Subject) -> String {
    match subject {
        Subject::NamedNode(node) => node.as_str().to_string(),
        other => other.to_string(),
    }
}

fn term_text(term: &Term) -> String {
    match term {
        Term::Literal(literal) => literal.value().to_string(),
        Term::NamedNode(node) => node.as_str().to_string(),
        other => other.to_string(),
    }
}

/// Percent-encode everything outside the IRI-safe unreserved set
fn iri_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn iri_unescape(escaped: &str) -> String {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(byte) = escaped
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    const RDFS_SUBCLASS: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";

    fn sample_claim() -> Claim {
        Claim::new("c1", "finding", "some fact")
            .with_attribute("source", "textbook")
            .with_attribute("page", 42)
            .with_attribute("verified", true)
    }

    #[test]
    fn test_insert_claim_creates_one_triple_per_attribute() {
        let store = SemanticStore::in_memory(false).unwrap();
        let inserted = store.insert_claim(&sample_claim()).unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(store.triple_count().unwrap(), 3);
    }

    #[test]
    fn test_subject_derives_from_claim_id() {
        let store = SemanticStore::in_memory(false).unwrap();
        store.insert_claim(&sample_claim()).unwrap();

        let matches = store.pattern(Some("urn:claim:c1"), None, None).unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| m.subject == "urn:claim:c1"));
    }

    #[test]
    fn test_attribute_roundtrip() {
        let store = SemanticStore::in_memory(false).unwrap();
        store
            .insert_attributes(
                "c1",
                &HashMap::from([
                    ("source".to_string(), json!("textbook")),
                    ("page".to_string(), json!(42)),
                    ("ratio".to_string(), json!(0.5)),
                    ("verified".to_string(), json!(true)),
                    ("tags".to_string(), json!(["a", "b"])),
                ]),
            )
            .unwrap();

        let attributes = store.attributes_of("c1").unwrap();
        assert_eq!(attributes["source"], json!("textbook"));
        assert_eq!(attributes["page"], json!(42));
        assert_eq!(attributes["ratio"], json!(0.5));
        assert_eq!(attributes["verified"], json!(true));
        assert_eq!(attributes["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_pattern_with_object_filter() {
        let store = SemanticStore::in_memory(false).unwrap();
        store.insert_claim(&sample_claim()).unwrap();

        let matches = store.pattern(None, None, Some("textbook")).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].predicate.contains("source"));
    }

    #[test]
    fn test_malformed_pattern_propagates() {
        let store = SemanticStore::in_memory(false).unwrap();
        let err = store.pattern(Some("not an iri"), None, None).unwrap_err();
        assert!(matches!(err, Error::SemanticQuery(_)));
    }

    #[test]
    fn test_sparql_select() {
        let store = SemanticStore::in_memory(false).unwrap();
        store.insert_claim(&sample_claim()).unwrap();

        let rows = store
            .query_select("SELECT ?o WHERE { <urn:claim:c1> <urn:claim:attr:source> ?o }")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0][0].1.contains("textbook"));

        assert!(store.query_select("SELECT ?o WHERE {").is_err());
    }

    #[test]
    fn test_inference_materializes_subclass_types() {
        let store = SemanticStore::in_memory(true).unwrap();
        store
            .insert_triple("urn:zoo:rex", RDF_TYPE, "urn:zoo:Dog")
            .unwrap();
        store
            .insert_triple("urn:zoo:Dog", RDFS_SUBCLASS, "urn:zoo:Mammal")
            .unwrap();
        store
            .insert_triple("urn:zoo:Mammal", RDFS_SUBCLASS, "urn:zoo:Animal")
            .unwrap();

        let matches = store
            .pattern(Some("urn:zoo:rex"), Some(RDF_TYPE), None)
            .unwrap();
        let types: Vec<&str> = matches.iter().map(|m| m.object.as_str()).collect();
        assert!(types.contains(&"urn:zoo:Dog"));
        assert!(types.contains(&"urn:zoo:Mammal"));
        assert!(types.contains(&"urn:zoo:Animal"));
    }

    #[test]
    fn test_inference_disabled_keeps_raw_triples() {
        let store = SemanticStore::in_memory(false).unwrap();
        store
            .insert_triple("urn:zoo:rex", RDF_TYPE, "urn:zoo:Dog")
            .unwrap();
        store
            .insert_triple("urn:zoo:Dog", RDFS_SUBCLASS, "urn:zoo:Animal")
            .unwrap();

        let matches = store
            .pattern(Some("urn:zoo:rex"), Some(RDF_TYPE), None)
            .unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_escaped_ids_roundtrip() {
        let store = SemanticStore::in_memory(false).unwrap();
        store
            .insert_attributes(
                "claim with spaces/and:symbols",
                &HashMap::from([("key one".to_string(), json!("v"))]),
            )
            .unwrap();

        let attributes = store.attributes_of("claim with spaces/and:symbols").unwrap();
        assert_eq!(attributes["key one"], json!("v"));
    }

    #[test]
    fn test_clear() {
        let store = SemanticStore::in_memory(false).unwrap();
        store.insert_claim(&sample_claim()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.triple_count().unwrap(), 0);
    }

    #[test]
    fn test_persistent_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = SemanticStore::open(dir.path(), false).unwrap();
            store.insert_claim(&sample_claim()).unwrap();
            assert!(store.is_persistent());
        }
        let reopened = SemanticStore::open(dir.path(), false).unwrap();
        assert_eq!(reopened.triple_count().unwrap(), 3);
    }
}
