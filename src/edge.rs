//! Edge types - directed, labelled relationships between nodes
//!
//! Edge identity is the full `(source, target, label, attributes)` tuple:
//! two edges between the same endpoints with the same label are distinct as
//! long as their attribute payloads differ.

use crate::node::{into_object, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Which adjacency to follow from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges whose source is the node
    #[serde(alias = "out")]
    Outgoing,
    /// Edges whose target is the node
    #[serde(alias = "in")]
    Incoming,
    /// Either endpoint
    #[default]
    Both,
}

impl Direction {
    /// Get the string representation of the direction
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outgoing => "out",
            Direction::Incoming => "in",
            Direction::Both => "both",
        }
    }

    /// Get all directions
    pub fn all() -> &'static [Direction] {
        &[Direction::Outgoing, Direction::Incoming, Direction::Both]
    }
}

impl FromStr for Direction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "out" | "outgoing" | "outbound" => Ok(Direction::Outgoing),
            "in" | "incoming" | "inbound" => Ok(Direction::Incoming),
            "both" | "any" | "all" => Ok(Direction::Both),
            _ => Err(crate::Error::MalformedQuery(format!("Unknown direction: {}", s))),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An edge in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id
    pub source: NodeId,
    /// Target node id
    pub target: NodeId,
    /// Non-empty relationship label
    pub label: String,
    /// JSON payload
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Edge {
    /// Create a new edge, coercing `attributes` into an object
    pub fn new(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        label: impl Into<String>,
        attributes: impl Into<Value>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: label.into(),
            attributes: into_object(attributes.into()),
        }
    }

    /// Canonical serialized payload, part of the edge identity tuple
    pub fn properties(&self) -> String {
        Value::Object(self.attributes.clone()).to_string()
    }

    /// Whether `id` is one of the endpoints
    pub fn touches(&self, id: &NodeId) -> bool {
        self.source.same_as(id) || self.target.same_as(id)
    }

    /// The endpoint opposite to `id` (the source for a self-loop)
    pub fn other_end(&self, id: &NodeId) -> &NodeId {
        if self.source.same_as(id) {
            &self.target
        } else {
            &self.source
        }
    }

    /// Copy of this edge with every endpoint equal to `from` replaced by `to`
    pub fn repointed(&self, from: &NodeId, to: &NodeId) -> Self {
        let swap = |end: &NodeId| if end.same_as(from) { to.clone() } else { end.clone() };
        Self {
            source: swap(&self.source),
            target: swap(&self.target),
            label: self.label.clone(),
            attributes: self.attributes.clone(),
        }
    }

    /// Document embedded for this edge: its payload plus the structural fields
    ///
    /// Payload keys win over the structural ones, so an attribute literally
    /// called `label` is embedded as given.
    pub fn embedding_document(&self) -> Value {
        let mut doc = self.attributes.clone();
        doc.entry("source").or_insert_with(|| self.source.to_json());
        doc.entry("target").or_insert_with(|| self.target.to_json());
        doc.entry("label").or_insert_with(|| Value::from(self.label.as_str()));
        Value::Object(doc)
    }
}

/// A stored edge together with its surrogate sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub sequence: i64,
    #[serde(flatten)]
    pub edge: Edge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direction_roundtrip() {
        for direction in Direction::all() {
            let parsed: Direction = direction.as_str().parse().unwrap();
            assert_eq!(*direction, parsed);
        }
        assert_eq!(Direction::from_str("inbound").unwrap(), Direction::Incoming);
        assert!(Direction::from_str("sideways").is_err());
    }

    #[test]
    fn test_properties_are_canonical() {
        let a = Edge::new(1, 2, "knows", json!({"since": 2020, "close": true}));
        let b = Edge::new(1, 2, "knows", json!({"close": true, "since": 2020}));
        assert_eq!(a.properties(), b.properties());
    }

    #[test]
    fn test_repointed_replaces_both_ends_of_self_loop() {
        let edge = Edge::new(2, 2, "self", json!({}));
        let moved = edge.repointed(&NodeId::Int(2), &NodeId::Int(1));
        assert_eq!(moved.source, NodeId::Int(1));
        assert_eq!(moved.target, NodeId::Int(1));

        let other = Edge::new(2, 4, "rel", json!({}));
        let moved = other.repointed(&NodeId::Int(2), &NodeId::Int(1));
        assert_eq!(moved.source, NodeId::Int(1));
        assert_eq!(moved.target, NodeId::Int(4));
    }

    #[test]
    fn test_other_end() {
        let edge = Edge::new("a", "b", "rel", json!({}));
        assert_eq!(edge.other_end(&NodeId::from("a")), &NodeId::from("b"));
        assert_eq!(edge.other_end(&NodeId::from("b")), &NodeId::from("a"));
        assert!(edge.touches(&NodeId::from("b")));
    }

    #[test]
    fn test_embedding_document_keeps_payload_keys() {
        let edge = Edge::new("a", "b", "rel", json!({"label": "custom", "w": 1}));
        let doc = edge.embedding_document();
        assert_eq!(doc["label"], json!("custom"));
        assert_eq!(doc["source"], json!("a"));
        assert_eq!(doc["w"], json!(1));
    }
}
