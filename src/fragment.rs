//! Graph fragments - `{nodes, edges}` documents
//!
//! The exchange format used by bulk import/export and by similarity search to
//! return a subgraph. Text-to-graph generators produce this shape and diagram
//! renderers consume it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::Result;
use crate::edge::Edge;
use crate::node::Node;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFragment {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphFragment {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Parse a fragment from JSON text
    ///
    /// Node ids missing from a node's attribute payload are injected, so a
    /// generator may emit `{"id": 1, "label": "x", "attributes": {...}}`.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut fragment: GraphFragment = serde_json::from_str(text)?;
        for node in &mut fragment.nodes {
            *node = Node::new(node.id.clone(), std::mem::take(&mut node.label), std::mem::take(&mut node.attributes));
        }
        Ok(fragment)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}
