//! Similarity merge - collapse near-duplicate nodes
//!
//! For each node (in sequence order) the engine asks the vector store for its
//! `k` nearest nodes. Every match strictly closer than the threshold, other
//! than the node itself, is folded into it:
//!
//! 1. labels are comma-joined and attributes merged per [`NumericMerge`];
//!    a merged node the validator rejects leaves the pair untouched
//! 2. the survivor is re-written
//! 3. the duplicate's edges are re-pointed onto the survivor (new rows and
//!    embeddings; the edge tuple guard makes this idempotent)
//! 4. the duplicate is removed (cascading)
//!
//! Edges running directly between the survivor and the duplicate are dropped
//! rather than turned into self-loops.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use crate::Result;
use crate::edge::Direction;
use crate::graph::GraphDb;
use crate::node::{Node, NodeId, ID_KEY};
use crate::vector::SearchParams;

/// How colliding numeric attributes are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericMerge {
    /// The duplicate's value replaces the survivor's
    #[default]
    Overwrite,
    /// Values are added
    Sum,
    /// Values are joined as text, like strings
    Concatenate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Matches must be strictly closer than this
    pub threshold: f32,
    /// Neighbours inspected per node
    pub k: usize,
    pub numeric: NumericMerge,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            k: 3,
            numeric: NumericMerge::Overwrite,
        }
    }
}

impl MergeOptions {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_numeric(mut self, numeric: NumericMerge) -> Self {
        self.numeric = numeric;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    /// `(survivor, duplicate)` pairs, in merge order
    pub merged: Vec<(NodeId, NodeId)>,
    /// Edges re-created on a survivor
    pub edges_repointed: usize,
}

pub struct MergeEngine<'a> {
    db: &'a GraphDb,
    options: MergeOptions,
}

impl<'a> MergeEngine<'a> {
    pub fn new(db: &'a GraphDb, options: MergeOptions) -> Self {
        Self { db, options }
    }

    pub fn run(&self) -> Result<MergeReport> {
        let mut report = MergeReport::default();
        let params = SearchParams::nearest(self.options.k);

        for stored in self.db.store().all_nodes()? {
            // Already folded into an earlier survivor
            let Some(mut survivor) = self.db.find_node(&stored.node.id)? else {
                continue;
            };

            let query = Value::Object(survivor.attributes.clone());
            let Some(matches) = self.db.similar_nodes(&query, &params)? else {
                continue;
            };

            for candidate in matches {
                let duplicate = candidate.node;
                if duplicate.id.same_as(&survivor.id) || candidate.distance >= self.options.threshold {
                    continue;
                }

                let merged = merged_node(&survivor, &duplicate, self.options.numeric);
                if !self.db.accepts(&merged) {
                    tracing::debug!("Skipping merge of {} into {}: fails validation", duplicate.id, survivor.id);
                    continue;
                }

                tracing::debug!(
                    "Merging {} into {} (distance {:.3})",
                    duplicate.id,
                    survivor.id,
                    candidate.distance
                );

                let Some(updated) = self.db.update_node(&merged)? else {
                    continue;
                };
                survivor = updated;
                report.edges_repointed += self.repoint_edges(&duplicate.id, &survivor.id)?;
                self.db.remove_node(&duplicate.id)?;

                report.merged.push((survivor.id.clone(), duplicate.id));
            }
        }

        tracing::info!(
            "Merged {} duplicate nodes, re-pointed {} edges",
            report.merged.len(),
            report.edges_repointed
        );
        Ok(report)
    }

    fn repoint_edges(&self, duplicate: &NodeId, survivor: &NodeId) -> Result<usize> {
        let mut repointed = 0;
        for edge in self.db.edges_of(duplicate, Direction::Both)? {
            if edge.touches(survivor) {
                continue;
            }
            if self.db.connect_nodes(&edge.repointed(duplicate, survivor))? {
                repointed += 1;
            }
        }
        Ok(repointed)
    }
}

/// Comma-join two labels, skipping parts already present
pub fn join_labels(survivor: &str, duplicate: &str) -> String {
    let mut parts: Vec<&str> = survivor.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    for part in duplicate.split(',').map(str::trim) {
        if !part.is_empty() && !parts.contains(&part) {
            parts.push(part);
        }
    }
    parts.join(",")
}

/// Fold the duplicate's attributes into the survivor's
///
/// - `id` is never touched
/// - keys only on the duplicate are copied
/// - equal values are kept as-is
/// - strings are comma-joined (skipping parts already present)
/// - numbers follow `numeric`
/// - any other collision keeps the survivor's value
pub fn merge_attributes(survivor: &mut Map<String, Value>, duplicate: &Map<String, Value>, numeric: NumericMerge) {
    for (key, incoming) in duplicate {
        if key == ID_KEY {
            continue;
        }

        let Some(current) = survivor.get(key) else {
            survivor.insert(key.clone(), incoming.clone());
            continue;
        };
        if current == incoming {
            continue;
        }

        let merged = match (current, incoming) {
            (Value::String(a), Value::String(b)) => Some(Value::String(join_labels(a, b))),
            (Value::Number(a), Value::Number(b)) => Some(merge_numbers(a, b, numeric)),
            _ => None,
        };
        if let Some(value) = merged {
            survivor.insert(key.clone(), value);
        }
    }
}

fn merge_numbers(a: &Number, b: &Number, numeric: NumericMerge) -> Value {
    match numeric {
        NumericMerge::Overwrite => Value::Number(b.clone()),
        NumericMerge::Sum => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x
                .checked_add(y)
                .map(Value::from)
                .unwrap_or_else(|| Value::from(x as f64 + y as f64)),
            _ => Value::from(a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default()),
        },
        NumericMerge::Concatenate => Value::String(format!("{},{}", a, b)),
    }
}

/// The survivor with the duplicate's label and attributes folded in
pub fn merged_node(survivor: &Node, duplicate: &Node, numeric: NumericMerge) -> Node {
    let mut node = survivor.clone();
    node.label = join_labels(&survivor.label, &duplicate.label);
    merge_attributes(&mut node.attributes, &duplicate.attributes, numeric);
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn scenario() -> GraphDb {
        let db = GraphDb::open_in_memory().unwrap();
        db.add_node(&Node::new(3, "C", json!({"name": "alpha beta"}))).unwrap();
        db.add_node(&Node::new(4, "D", json!({"name": "gamma delta"}))).unwrap();
        db.add_node(&Node::new(1, "A", json!({"x": 1}))).unwrap();
        db.add_node(&Node::new(2, "B", json!({"x": 1}))).unwrap();
        db.connect_nodes(&Edge::new(1, 3, "rel", json!({}))).unwrap();
        db.connect_nodes(&Edge::new(2, 4, "rel", json!({}))).unwrap();
        db
    }

    #[test]
    fn test_merge_scenario() {
        let db = scenario();
        let report = db.merge_by_similarity(&MergeOptions::default().with_threshold(0.9)).unwrap();

        assert_eq!(report.merged.len(), 1);
        let (survivor, duplicate) = report.merged[0].clone();
        assert!(survivor.same_as(&NodeId::Int(1)) || survivor.same_as(&NodeId::Int(2)));
        assert!(db.find_node(&duplicate).unwrap().is_none());

        let ids: Vec<String> = db.all_nodes().unwrap().iter().map(|n| n.id.key()).collect();
        assert_eq!(ids.len(), 3);

        let targets: Vec<String> = db
            .edges_of(&survivor, Direction::Outgoing)
            .unwrap()
            .iter()
            .map(|e| e.target.key())
            .collect();
        assert!(targets.contains(&"3".to_string()));
        assert!(targets.contains(&"4".to_string()));
        assert_eq!(report.edges_repointed, 1);

        let merged = db.find_node(&survivor).unwrap().unwrap();
        assert_eq!(merged.label, "A,B");
        assert_eq!(merged.attribute("x"), Some(&json!(1)));

        let stats = db.stats().unwrap();
        assert_eq!((stats.nodes, stats.node_embeddings), (3, 3));
        assert_eq!((stats.edges, stats.edge_embeddings), (2, 2));
    }

    #[test]
    fn test_merge_rerun_is_idempotent() {
        let db = scenario();
        db.merge_by_similarity(&MergeOptions::default()).unwrap();
        let edges = db.all_edges().unwrap();

        let second = db.merge_by_similarity(&MergeOptions::default()).unwrap();
        assert!(second.merged.is_empty());
        assert_eq!(db.all_edges().unwrap(), edges);
    }

    #[test]
    fn test_merge_skips_pairs_failing_validation() {
        use crate::ontology::{RequiredKeysValidator, ValidationPolicy};
        use std::sync::Arc;

        // "A,B" is not a known resource type, so the merged node never validates
        let validator = RequiredKeysValidator::default().with_type("A", &[]).with_type("B", &[]);
        for policy in [ValidationPolicy::Reject, ValidationPolicy::Discard] {
            let db = GraphDb::open_in_memory().unwrap().with_validator(Arc::new(validator.clone()), policy);
            db.add_node(&Node::new(1, "A", json!({"x": 1}))).unwrap();
            db.add_node(&Node::new(2, "B", json!({"x": 1}))).unwrap();
            db.add_node(&Node::new(4, "A", json!({"name": "gamma delta"}))).unwrap();
            db.connect_nodes(&Edge::new(2, 4, "rel", json!({}))).unwrap();

            let report = db.merge_by_similarity(&MergeOptions::default()).unwrap();
            assert!(report.merged.is_empty());
            assert_eq!(report.edges_repointed, 0);

            assert_eq!(db.find_node(&NodeId::Int(2)).unwrap().unwrap().label, "B");
            assert_eq!(db.find_node(&NodeId::Int(1)).unwrap().unwrap().label, "A");
            let edges = db.all_edges().unwrap();
            assert_eq!(edges, vec![Edge::new(2, 4, "rel", json!({}))]);
        }
    }

    #[test]
    fn test_merge_keeps_edges_to_zero_padded_ids() {
        let db = GraphDb::open_in_memory().unwrap();
        db.add_node(&Node::new("a", "A", json!({"x": 1}))).unwrap();
        db.add_node(&Node::new("b", "B", json!({"x": 1}))).unwrap();
        db.add_node(&Node::new("007", "C", json!({"name": "far away"}))).unwrap();
        db.connect_nodes(&Edge::new("b", "007", "rel", json!({}))).unwrap();

        let report = db.merge_by_similarity(&MergeOptions::default()).unwrap();
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.edges_repointed, 1);

        let (survivor, _) = report.merged[0].clone();
        let edges = db.edges_of(&survivor, Direction::Outgoing).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, NodeId::Text("007".into()));
    }

    #[test]
    fn test_zero_threshold_merges_nothing() {
        let db = scenario();
        let report = db.merge_by_similarity(&MergeOptions::default().with_threshold(0.0)).unwrap();
        assert!(report.merged.is_empty());
        assert_eq!(db.stats().unwrap().nodes, 4);
    }

    #[test]
    fn test_numeric_policies() {
        let dup = object(json!({"id": 2, "n": 2, "s": "b", "only": true}));

        let mut overwrite = object(json!({"id": 1, "n": 1, "s": "a"}));
        merge_attributes(&mut overwrite, &dup, NumericMerge::Overwrite);
        assert_eq!(Value::Object(overwrite), json!({"id": 1, "n": 2, "s": "a,b", "only": true}));

        let mut sum = object(json!({"id": 1, "n": 1}));
        merge_attributes(&mut sum, &dup, NumericMerge::Sum);
        assert_eq!(sum["n"], json!(3));

        let mut float_sum = object(json!({"n": 0.5}));
        merge_attributes(&mut float_sum, &object(json!({"n": 2})), NumericMerge::Sum);
        assert_eq!(float_sum["n"], json!(2.5));

        let mut concat = object(json!({"n": 1}));
        merge_attributes(&mut concat, &dup, NumericMerge::Concatenate);
        assert_eq!(concat["n"], json!("1,2"));
    }

    #[test]
    fn test_mixed_types_keep_survivor() {
        let mut survivor = object(json!({"v": "text", "same": [1]}));
        merge_attributes(&mut survivor, &object(json!({"v": 5, "same": [1]})), NumericMerge::Sum);
        assert_eq!(Value::Object(survivor), json!({"v": "text", "same": [1]}));
    }

    #[test]
    fn test_join_labels_skips_repeats() {
        assert_eq!(join_labels("A", "B"), "A,B");
        assert_eq!(join_labels("A,B", "B"), "A,B");
        assert_eq!(join_labels("A", "A"), "A");
        assert_eq!(join_labels("A", "B,C"), "A,B,C");
    }

    #[test]
    fn test_merged_node() {
        let a = Node::new(1, "A", json!({"k": "x"}));
        let b = Node::new(2, "B", json!({"k": "y", "extra": 1}));
        let merged = merged_node(&a, &b, NumericMerge::Overwrite);
        assert_eq!(merged.id, NodeId::Int(1));
        assert_eq!(merged.attribute("k"), Some(&json!("x,y")));
        assert_eq!(merged.attribute("extra"), Some(&json!(1)));
    }
}
