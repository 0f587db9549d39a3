//! Graph export - GraphML and JSON interchange forms
//!
//! Serializes a [`GraphSnapshot`] of the in-memory projection. GraphML is the
//! interchange format consumed by external graph tooling; the JSON form is a
//! node-link document for programmatic consumers.

use crate::graph::GraphSnapshot;
use serde_json::json;

/// Serialize a snapshot as a GraphML document
pub fn to_graphml(snapshot: &GraphSnapshot) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n");
    out.push_str(
        "  <key id=\"confidence\" for=\"node\" attr.name=\"confidence\" attr.type=\"double\"/>\n",
    );
    out.push_str(
        "  <key id=\"attributes\" for=\"node\" attr.name=\"attributes\" attr.type=\"string\"/>\n",
    );
    out.push_str(
        "  <key id=\"predicate\" for=\"edge\" attr.name=\"predicate\" attr.type=\"string\"/>\n",
    );
    out.push_str("  <key id=\"weight\" for=\"edge\" attr.name=\"weight\" attr.type=\"double\"/>\n");
    out.push_str("  <graph id=\"claims\" edgedefault=\"directed\">\n");

    for (id, node) in &snapshot.nodes {
        out.push_str(&format!("    <node id=\"{}\">\n", xml_escape(id)));
        out.push_str(&format!(
            "      <data key=\"confidence\">{}</data>\n",
            node.confidence
        ));
        if !node.attributes.is_empty() {
            let bag = serde_json::Value::Object(
                node.attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
            out.push_str(&format!(
                "      <data key=\"attributes\">{}</data>\n",
                xml_escape(&bag.to_string())
            ));
        }
        out.push_str("    </node>\n");
    }

    for relation in &snapshot.relations {
        out.push_str(&format!(
            "    <edge source=\"{}\" target=\"{}\">\n",
            xml_escape(&relation.source),
            xml_escape(&relation.destination)
        ));
        out.push_str(&format!(
            "      <data key=\"predicate\">{}</data>\n",
            xml_escape(&relation.predicate)
        ));
        out.push_str(&format!(
            "      <data key=\"weight\">{}</data>\n",
            relation.weight
        ));
        out.push_str("    </edge>\n");
    }

    out.push_str("  </graph>\n");
    out.push_str("</graphml>\n");
    out
}

/// Serialize a snapshot as a node-link JSON document
pub fn to_json(snapshot: &GraphSnapshot) -> serde_json::Value {
    json!({
        "directed": true,
        "multigraph": true,
        "nodes": snapshot
            .nodes
            .iter()
            .map(|(id, node)| {
                json!({
                    "id": id,
                    "confidence": node.confidence,
                    "attributes": node.attributes,
                })
            })
            .collect::<Vec<_>>(),
        "edges": snapshot
            .relations
            .iter()
            .map(|relation| {
                json!({
                    "source": relation.source,
                    "destination": relation.destination,
                    "predicate": relation.predicate,
                    "weight": relation.weight,
                })
            })
            .collect::<Vec<_>>(),
    })
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
