//! Relational graph store
//!
//! Owns the `nodes` and `edges` tables. Every row carries a surrogate
//! sequence (`seq`) that correlates it with its embedding; sequences are
//! allocated as `max(existing, high_water) + 1` and are never reused.
//!
//! Absence is never an error here: lookups return `None`/empty, and inserts
//! that would duplicate a node id or edge tuple (or reference a missing
//! endpoint) are silent no-ops reported as `Ok(None)`.

use std::collections::HashSet;
use std::sync::Arc;
use serde_json::Value;
use crate::edge::{Direction, Edge, EdgeRecord};
use crate::node::{check_label, into_object, merge_shallow, Node, NodeId};
use crate::query::predicate::{Clause, Condition, SearchMode};
use crate::query::traversal::{Traversal, TraversalEngine};
use crate::{Error, Result};
use super::backend::{Backend, SharedBackend, SqlRow, SqlValue, StoreLocation};
use super::schema;
use super::sqlite::SqliteBackend;

/// A node together with its current surrogate sequence
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub sequence: i64,
    pub node: Node,
}

/// Outcome of a node upsert
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    /// Sequence the node is now stored under
    pub sequence: i64,
    /// Sequence it was stored under before, if it already existed
    pub previous: Option<i64>,
    /// The node as written (merged attributes)
    pub node: Node,
}

/// Outcome of an edge upsert
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertedEdge {
    pub sequence: i64,
    pub previous: Option<i64>,
    pub edge: Edge,
}

/// What a cascading node removal deleted
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub sequence: i64,
    pub edge_sequences: Vec<i64>,
}

/// Edge lookup by any combination of endpoints and label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeFilter {
    pub source: Option<NodeId>,
    pub target: Option<NodeId>,
    pub label: Option<String>,
}

impl EdgeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, id: impl Into<NodeId>) -> Self {
        self.source = Some(id.into());
        self
    }

    pub fn target(mut self, id: impl Into<NodeId>) -> Self {
        self.target = Some(id.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.target.is_none() && self.label.is_none()
    }

    fn params(&self) -> Vec<SqlValue> {
        vec![
            self.source.as_ref().into(),
            self.target.as_ref().into(),
            self.label.clone().into(),
        ]
    }
}

/// Relational storage for nodes and edges
pub struct GraphStore {
    backend: Arc<SharedBackend>,
}

impl GraphStore {
    /// Wrap a backend, creating the graph tables if needed
    pub fn new(backend: Arc<SharedBackend>) -> Result<Self> {
        backend.with(|b| b.execute_script(&schema::graph_schema()))?;
        Ok(Self { backend })
    }

    /// Open a store over a fresh in-memory SQLite database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Arc::new(SharedBackend::new(SqliteBackend::open_in_memory()?)))
    }

    pub fn backend(&self) -> &Arc<SharedBackend> {
        &self.backend
    }

    pub fn location(&self) -> &StoreLocation {
        self.backend.location()
    }

    // === Nodes ===

    /// Insert a node; no-op (returns `None`) if the id already exists
    pub fn insert_node(&self, node: &Node) -> Result<Option<i64>> {
        check_label(&node.label)?;

        self.backend.unit_of_work(|b| {
            if lookup_node(b, &node.id)?.is_some() {
                tracing::debug!("Node {} already exists, skipping insert", node.id);
                return Ok(None);
            }
            let seq = next_sequence(b, schema::NEXT_NODE_SEQUENCE)?;
            insert_node_row(b, seq, node)?;
            Ok(Some(seq))
        })
    }

    /// Insert a batch of nodes
    ///
    /// The sequence block is computed once; each skipped element (existing
    /// id, or repeated within the batch) pulls the following ones down so
    /// the inserted rows stay densely packed. The batch is not atomic: rows
    /// written before a backend failure stay committed.
    pub fn insert_nodes(&self, nodes: &[Node]) -> Result<Vec<Option<i64>>> {
        for node in nodes {
            check_label(&node.label)?;
        }

        self.backend.with(|b| {
            let base = next_sequence(b, schema::NEXT_NODE_SEQUENCE)?;
            let mut seen = HashSet::new();
            let mut skipped = 0i64;
            let mut plan = Vec::with_capacity(nodes.len());

            for (i, node) in nodes.iter().enumerate() {
                let fresh = seen.insert(node.id.key()) && lookup_node(b, &node.id)?.is_none();
                if fresh {
                    plan.push(Some(base + i as i64 - skipped));
                } else {
                    tracing::debug!("Node {} already exists, skipping insert", node.id);
                    skipped += 1;
                    plan.push(None);
                }
            }

            for (node, seq) in nodes.iter().zip(&plan) {
                if let Some(seq) = seq {
                    insert_node_row(b, *seq, node)?;
                }
            }
            Ok(plan)
        })
    }

    /// Insert, or read-merge-write onto the existing node under a new sequence
    ///
    /// The embedding stored under `previous` is left for the caller to delete.
    pub fn upsert_node(&self, node: &Node) -> Result<Upserted> {
        check_label(&node.label)?;

        self.backend.unit_of_work(|b| {
            let seq = next_sequence(b, schema::NEXT_NODE_SEQUENCE)?;

            match lookup_node(b, &node.id)? {
                None => {
                    insert_node_row(b, seq, node)?;
                    Ok(Upserted {
                        sequence: seq,
                        previous: None,
                        node: node.clone(),
                    })
                }
                Some(existing) => {
                    let mut merged = existing.node;
                    merge_shallow(&mut merged.attributes, node.attributes.clone());
                    merged.label = node.label.clone();

                    b.execute(
                        schema::UPDATE_NODE,
                        &[seq.into(), merged.label.as_str().into(), merged.body().into(), (&merged.id).into()],
                    )?;
                    bump_sequence(b, schema::NODES_ENTITY, seq)?;

                    Ok(Upserted {
                        sequence: seq,
                        previous: Some(existing.sequence),
                        node: merged,
                    })
                }
            }
        })
    }

    /// Remove a node and every edge touching it
    ///
    /// Returns the sequences of everything deleted so the caller can drop
    /// the matching embeddings; `None` if the node does not exist.
    pub fn remove_node(&self, id: &NodeId) -> Result<Option<RemovedNode>> {
        self.backend.unit_of_work(|b| {
            let Some(stored) = lookup_node(b, id)? else {
                return Ok(None);
            };

            let edge_sequences = query_edges(b, schema::SELECT_EDGES_TOUCHING, &[id.into()])?
                .into_iter()
                .map(|e| e.sequence)
                .collect();

            b.execute(schema::DELETE_EDGES_TOUCHING, &[id.into()])?;
            b.execute(schema::DELETE_NODE, &[id.into()])?;

            Ok(Some(RemovedNode {
                sequence: stored.sequence,
                edge_sequences,
            }))
        })
    }

    pub fn find_node(&self, id: &NodeId) -> Result<Option<Node>> {
        Ok(self.find_stored_node(id)?.map(|s| s.node))
    }

    pub fn find_stored_node(&self, id: &NodeId) -> Result<Option<StoredNode>> {
        self.backend.with(|b| lookup_node(b, id))
    }

    pub fn node_by_sequence(&self, seq: i64) -> Result<Option<StoredNode>> {
        self.backend.with(|b| {
            query_nodes(b, schema::SELECT_NODE_BY_SEQ, &[seq.into()]).map(|rows| rows.into_iter().next())
        })
    }

    /// Nodes whose payload satisfies `condition`, in sequence order
    pub fn find_nodes(&self, condition: &Condition, mode: SearchMode) -> Result<Vec<Node>> {
        let compiled = condition.compile(mode, "nodes", "body")?;
        let sql = format!(
            "SELECT {} FROM nodes WHERE {} ORDER BY seq",
            schema::NODE_COLUMNS,
            compiled.sql
        );

        let stored = self.backend.with(|b| query_nodes(b, &sql, &compiled.params))?;
        Ok(stored.into_iter().map(|s| s.node).collect())
    }

    /// [`find_nodes`](Self::find_nodes) over a flat clause list
    pub fn find_nodes_by_clauses(&self, clauses: &[Clause], bindings: &[Value], mode: SearchMode) -> Result<Vec<Node>> {
        let condition = Condition::from_clauses(clauses, bindings)?;
        self.find_nodes(&condition, mode)
    }

    pub fn all_nodes(&self) -> Result<Vec<StoredNode>> {
        self.backend.with(|b| query_nodes(b, schema::SELECT_ALL_NODES, &[]))
    }

    pub fn node_sequences(&self) -> Result<Vec<i64>> {
        self.backend.with(|b| query_sequences(b, schema::SELECT_NODE_SEQUENCES))
    }

    pub fn count_nodes(&self) -> Result<usize> {
        self.backend.with(|b| count(b, schema::COUNT_NODES))
    }

    // === Edges ===

    /// Connect two existing nodes
    ///
    /// No-op (returns `None`) if either endpoint is missing or the exact
    /// `(source, target, label, attributes)` tuple is already stored.
    pub fn connect_nodes(&self, edge: &Edge) -> Result<Option<i64>> {
        check_label(&edge.label)?;
        self.backend.unit_of_work(|b| insert_edge_row(b, edge))
    }

    /// Connect a batch of edges, each with [`connect_nodes`](Self::connect_nodes)
    /// semantics; not atomic across elements
    pub fn connect_many(&self, edges: &[Edge]) -> Result<Vec<Option<i64>>> {
        for edge in edges {
            check_label(&edge.label)?;
        }
        self.backend.with(|b| edges.iter().map(|edge| insert_edge_row(b, edge)).collect())
    }

    /// Merge attributes onto the first edge with the same endpoints and label
    ///
    /// Inserts when no such edge exists. Returns `None` if an endpoint is
    /// missing.
    pub fn upsert_edge(&self, edge: &Edge) -> Result<Option<UpsertedEdge>> {
        check_label(&edge.label)?;

        self.backend.unit_of_work(|b| {
            let filter = EdgeFilter {
                source: Some(edge.source.clone()),
                target: Some(edge.target.clone()),
                label: Some(edge.label.clone()),
            };
            let existing = query_edges(b, schema::SELECT_EDGES_FILTERED, &filter.params())?
                .into_iter()
                .next();

            match existing {
                None => Ok(insert_edge_row(b, edge)?.map(|sequence| UpsertedEdge {
                    sequence,
                    previous: None,
                    edge: edge.clone(),
                })),
                Some(record) => {
                    let mut merged = record.edge;
                    merge_shallow(&mut merged.attributes, edge.attributes.clone());

                    let seq = next_sequence(b, schema::NEXT_EDGE_SEQUENCE)?;
                    b.execute(
                        schema::UPDATE_EDGE,
                        &[seq.into(), merged.properties().into(), record.sequence.into()],
                    )?;
                    bump_sequence(b, schema::EDGES_ENTITY, seq)?;

                    Ok(Some(UpsertedEdge {
                        sequence: seq,
                        previous: Some(record.sequence),
                        edge: merged,
                    }))
                }
            }
        })
    }

    /// Remove every edge matching `filter`, returning their sequences
    pub fn disconnect(&self, filter: &EdgeFilter) -> Result<Vec<i64>> {
        if filter.is_empty() {
            return Err(Error::MalformedQuery("refusing to disconnect with an empty edge filter".to_string()));
        }

        self.backend.unit_of_work(|b| {
            let removed: Vec<i64> = query_edges(b, schema::SELECT_EDGES_FILTERED, &filter.params())?
                .into_iter()
                .map(|e| e.sequence)
                .collect();
            for seq in &removed {
                b.execute(schema::DELETE_EDGE_BY_SEQ, &[(*seq).into()])?;
            }
            Ok(removed)
        })
    }

    pub fn find_edges(&self, filter: &EdgeFilter) -> Result<Vec<EdgeRecord>> {
        self.backend.with(|b| query_edges(b, schema::SELECT_EDGES_FILTERED, &filter.params()))
    }

    /// Edges whose attribute payload satisfies `condition`
    pub fn find_edges_where(&self, condition: &Condition, mode: SearchMode) -> Result<Vec<EdgeRecord>> {
        let compiled = condition.compile(mode, "edges", "properties")?;
        let sql = format!(
            "SELECT {} FROM edges WHERE {} ORDER BY seq",
            schema::EDGE_COLUMNS,
            compiled.sql
        );
        self.backend.with(|b| query_edges(b, &sql, &compiled.params))
    }

    /// Edges incident to `id` in the given direction, in insertion order
    pub fn edges_of(&self, id: &NodeId, direction: Direction) -> Result<Vec<EdgeRecord>> {
        let sql = match direction {
            Direction::Outgoing => schema::SELECT_EDGES_FROM,
            Direction::Incoming => schema::SELECT_EDGES_TO,
            Direction::Both => schema::SELECT_EDGES_TOUCHING,
        };
        self.backend.with(|b| query_edges(b, sql, &[id.into()]))
    }

    pub fn edge_by_sequence(&self, seq: i64) -> Result<Option<EdgeRecord>> {
        self.backend.with(|b| {
            query_edges(b, schema::SELECT_EDGE_BY_SEQ, &[seq.into()]).map(|rows| rows.into_iter().next())
        })
    }

    pub fn all_edges(&self) -> Result<Vec<EdgeRecord>> {
        self.backend.with(|b| query_edges(b, schema::SELECT_ALL_EDGES, &[]))
    }

    pub fn edge_sequences(&self) -> Result<Vec<i64>> {
        self.backend.with(|b| query_sequences(b, schema::SELECT_EDGE_SEQUENCES))
    }

    pub fn count_edges(&self) -> Result<usize> {
        self.backend.with(|b| count(b, schema::COUNT_EDGES))
    }

    // === Adjacency ===

    /// Direct neighbours of `id`, one entry per incident edge, in edge order
    pub fn neighbors(&self, id: &NodeId, direction: Direction) -> Result<Vec<StoredNode>> {
        let sql = match direction {
            Direction::Outgoing => schema::SELECT_NEIGHBORS_OUT,
            Direction::Incoming => schema::SELECT_NEIGHBORS_IN,
            Direction::Both => schema::SELECT_NEIGHBORS_BOTH,
        };
        self.backend.with(|b| query_nodes(b, sql, &[id.into()]))
    }

    /// Single-hop scan from `source`, see [`TraversalEngine::traverse`]
    pub fn traverse_adjacency(
        &self,
        source: &NodeId,
        target: Option<&NodeId>,
        direction: Direction,
        with_bodies: bool,
    ) -> Result<Traversal> {
        TraversalEngine::new(self).traverse(source, target, direction, with_bodies)
    }
}

// Row-level helpers shared by autocommit and unit-of-work paths

fn next_sequence(b: &mut dyn Backend, sql: &str) -> Result<i64> {
    b.query_one(sql, &[])?
        .and_then(|row| row.first().and_then(SqlValue::as_i64))
        .ok_or_else(|| Error::CorruptRow("sequence query returned no value".to_string()))
}

fn bump_sequence(b: &mut dyn Backend, entity: &str, seq: i64) -> Result<()> {
    b.execute(schema::BUMP_SEQUENCE, &[entity.into(), seq.into()])?;
    Ok(())
}

fn insert_node_row(b: &mut dyn Backend, seq: i64, node: &Node) -> Result<()> {
    b.execute(
        schema::INSERT_NODE,
        &[seq.into(), (&node.id).into(), node.label.as_str().into(), node.body().into()],
    )?;
    bump_sequence(b, schema::NODES_ENTITY, seq)
}

fn insert_edge_row(b: &mut dyn Backend, edge: &Edge) -> Result<Option<i64>> {
    let seq = next_sequence(b, schema::NEXT_EDGE_SEQUENCE)?;
    let changed = b.execute(
        schema::INSERT_EDGE_GUARDED,
        &[
            seq.into(),
            (&edge.source).into(),
            (&edge.target).into(),
            edge.label.as_str().into(),
            edge.properties().into(),
        ],
    )?;

    if changed == 0 {
        tracing::debug!(
            "Edge {} -[{}]-> {} rejected (missing endpoint or duplicate)",
            edge.source,
            edge.label,
            edge.target
        );
        return Ok(None);
    }

    bump_sequence(b, schema::EDGES_ENTITY, seq)?;
    Ok(Some(seq))
}

fn lookup_node(b: &mut dyn Backend, id: &NodeId) -> Result<Option<StoredNode>> {
    Ok(query_nodes(b, schema::SELECT_NODE_BY_ID, &[id.into()])?.into_iter().next())
}

fn query_nodes(b: &mut dyn Backend, sql: &str, params: &[SqlValue]) -> Result<Vec<StoredNode>> {
    b.query(sql, params)?.iter().map(row_to_node).collect()
}

fn query_edges(b: &mut dyn Backend, sql: &str, params: &[SqlValue]) -> Result<Vec<EdgeRecord>> {
    b.query(sql, params)?.iter().map(row_to_edge).collect()
}

fn query_sequences(b: &mut dyn Backend, sql: &str) -> Result<Vec<i64>> {
    b.query(sql, &[])?
        .iter()
        .map(|row| {
            row.first()
                .and_then(SqlValue::as_i64)
                .ok_or_else(|| Error::CorruptRow(format!("bad sequence row: {:?}", row)))
        })
        .collect()
}

fn count(b: &mut dyn Backend, sql: &str) -> Result<usize> {
    Ok(b.query_one(sql, &[])?
        .and_then(|row| row.first().and_then(SqlValue::as_i64))
        .unwrap_or(0) as usize)
}

/// Decode a `seq, label, body` row
fn row_to_node(row: &SqlRow) -> Result<StoredNode> {
    let corrupt = || Error::CorruptRow(format!("bad node row: {:?}", row));

    let sequence = row.first().and_then(SqlValue::as_i64).ok_or_else(corrupt)?;
    let label = row.get(1).and_then(SqlValue::as_str).ok_or_else(corrupt)?;
    let body = row.get(2).and_then(SqlValue::as_str).ok_or_else(corrupt)?;

    Ok(StoredNode {
        sequence,
        node: Node::from_stored(label.to_string(), body)?,
    })
}

/// Decode a `seq, source, target, label, properties` row
fn row_to_edge(row: &SqlRow) -> Result<EdgeRecord> {
    let corrupt = || Error::CorruptRow(format!("bad edge row: {:?}", row));
    let text = |i: usize| row.get(i).and_then(SqlValue::as_str).ok_or_else(corrupt);

    let sequence = row.first().and_then(SqlValue::as_i64).ok_or_else(corrupt)?;
    let attributes = into_object(serde_json::from_str(text(4)?)?);

    Ok(EdgeRecord {
        sequence,
        edge: Edge {
            source: NodeId::from_key(text(1)?),
            target: NodeId::from_key(text(2)?),
            label: text(3)?.to_string(),
            attributes,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::predicate::{Joiner, Predicate};
    use serde_json::json;

    fn store() -> GraphStore {
        GraphStore::open_in_memory().unwrap()
    }

    fn person(id: i64, name: &str, age: i64) -> Node {
        Node::new(id, "person", json!({"name": name, "age": age}))
    }

    #[test]
    fn test_insert_node_is_idempotent() {
        let store = store();
        let first = store.insert_node(&person(1, "Ada", 36)).unwrap();
        let second = store.insert_node(&person(1, "Other", 1)).unwrap();

        assert_eq!(first, Some(1));
        assert_eq!(second, None);
        assert_eq!(store.count_nodes().unwrap(), 1);
        let node = store.find_node(&NodeId::Int(1)).unwrap().unwrap();
        assert_eq!(node.attribute("name"), Some(&json!("Ada")));
    }

    #[test]
    fn test_empty_label_rejected() {
        let store = store();
        let result = store.insert_node(&Node::new(1, " ", json!({})));
        assert!(matches!(result, Err(Error::EmptyLabel)));
    }

    #[test]
    fn test_find_missing_node_is_none() {
        let store = store();
        assert!(store.find_node(&NodeId::from("nope")).unwrap().is_none());
        assert!(store.remove_node(&NodeId::from("nope")).unwrap().is_none());
    }

    #[test]
    fn test_batch_insert_packs_sequences() {
        let store = store();
        store.insert_node(&person(2, "Existing", 1)).unwrap();

        let batch = vec![person(1, "a", 1), person(2, "dup", 1), person(3, "c", 1), person(1, "again", 1)];
        let plan = store.insert_nodes(&batch).unwrap();

        assert_eq!(plan, vec![Some(2), None, Some(3), None]);
        let seqs = store.node_sequences().unwrap();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_batch_insert_validates_before_writing() {
        let store = store();
        let batch = vec![person(1, "a", 1), Node::new(2, "", json!({}))];
        assert!(store.insert_nodes(&batch).is_err());
        assert_eq!(store.count_nodes().unwrap(), 0);
    }

    #[test]
    fn test_upsert_merges_attributes() {
        let store = store();
        let first = store.upsert_node(&Node::new("x", "thing", json!({"a": 1}))).unwrap();
        let second = store.upsert_node(&Node::new("x", "thing", json!({"b": 2}))).unwrap();

        assert_eq!(first.previous, None);
        assert_eq!(second.previous, Some(first.sequence));
        assert!(second.sequence > first.sequence);

        let node = store.find_node(&NodeId::from("x")).unwrap().unwrap();
        assert_eq!(Value::Object(node.attributes), json!({"a": 1, "b": 2, "id": "x"}));
    }

    #[test]
    fn test_sequences_never_reused() {
        let store = store();
        store.insert_node(&person(1, "a", 1)).unwrap();
        let seq = store.insert_node(&person(2, "b", 1)).unwrap().unwrap();
        store.remove_node(&NodeId::Int(2)).unwrap();

        let again = store.insert_node(&person(2, "b", 1)).unwrap().unwrap();
        assert!(again > seq);
    }

    #[test]
    fn test_edge_guard() {
        let store = store();
        store.insert_node(&person(1, "a", 1)).unwrap();

        let missing = store.connect_nodes(&Edge::new(1, 99, "knows", json!({}))).unwrap();
        assert_eq!(missing, None);
        assert!(store.find_edges(&EdgeFilter::new().source(1)).unwrap().is_empty());

        store.insert_node(&person(2, "b", 1)).unwrap();
        let edge = Edge::new(1, 2, "knows", json!({"since": 2020}));
        assert!(store.connect_nodes(&edge).unwrap().is_some());
        assert_eq!(store.connect_nodes(&edge).unwrap(), None);

        let other_payload = Edge::new(1, 2, "knows", json!({"since": 2021}));
        assert!(store.connect_nodes(&other_payload).unwrap().is_some());
        assert_eq!(store.count_edges().unwrap(), 2);
    }

    #[test]
    fn test_remove_node_cascades() {
        let store = store();
        for i in 1..=3 {
            store.insert_node(&person(i, "n", i)).unwrap();
        }
        let e1 = store.connect_nodes(&Edge::new(1, 2, "r", json!({}))).unwrap().unwrap();
        let e2 = store.connect_nodes(&Edge::new(3, 1, "r", json!({}))).unwrap().unwrap();
        store.connect_nodes(&Edge::new(2, 3, "r", json!({}))).unwrap();

        let removed = store.remove_node(&NodeId::Int(1)).unwrap().unwrap();
        assert_eq!(removed.sequence, 1);
        assert_eq!(removed.edge_sequences, vec![e1, e2]);

        let remaining = store.all_edges().unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(!remaining[0].edge.touches(&NodeId::Int(1)));
    }

    #[test]
    fn test_find_nodes_direct_and_tree() {
        let store = store();
        store.insert_node(&Node::new(1, "person", json!({"name": "Ada", "age": 36, "address": {"city": "London"}}))).unwrap();
        store.insert_node(&Node::new(2, "person", json!({"name": "Alan", "age": 41, "address": {"city": "Wilmslow"}}))).unwrap();
        store.insert_node(&Node::new(3, "person", json!({"name": "Grace", "age": 85}))).unwrap();

        let names = |nodes: Vec<Node>| -> Vec<String> {
            nodes.iter().map(|n| n.attribute("name").unwrap().as_str().unwrap().to_string()).collect()
        };

        let older = store.find_nodes(&Condition::gt("age", 40), SearchMode::Direct).unwrap();
        assert_eq!(names(older), vec!["Alan", "Grace"]);

        let like = store.find_nodes(&Condition::like("name", "A%"), SearchMode::Direct).unwrap();
        assert_eq!(names(like), vec!["Ada", "Alan"]);

        let nested = store.find_nodes(&Condition::eq("address.city", "London"), SearchMode::Direct).unwrap();
        assert_eq!(names(nested), vec!["Ada"]);

        let tree = store.find_nodes(&Condition::eq("city", "Wilmslow"), SearchMode::Tree).unwrap();
        assert_eq!(names(tree), vec!["Alan"]);

        let clauses = vec![
            Clause::new("name", Predicate::Like, Joiner::None),
            Clause::new("age", Predicate::LessThan, Joiner::Not),
        ];
        let composed = store
            .find_nodes_by_clauses(&clauses, &[json!("A%"), json!(40)], SearchMode::Direct)
            .unwrap();
        assert_eq!(names(composed), vec!["Alan"]);
    }

    #[test]
    fn test_upsert_edge_merges_payload() {
        let store = store();
        store.insert_node(&person(1, "a", 1)).unwrap();
        store.insert_node(&person(2, "b", 1)).unwrap();
        let first = store.connect_nodes(&Edge::new(1, 2, "knows", json!({"w": 1}))).unwrap().unwrap();

        let upserted = store.upsert_edge(&Edge::new(1, 2, "knows", json!({"since": 2020}))).unwrap().unwrap();
        assert_eq!(upserted.previous, Some(first));
        assert_eq!(Value::Object(upserted.edge.attributes.clone()), json!({"w": 1, "since": 2020}));

        let stored = store.edge_by_sequence(upserted.sequence).unwrap().unwrap();
        assert_eq!(stored.edge, upserted.edge);
        assert!(store.edge_by_sequence(first).unwrap().is_none());
    }

    #[test]
    fn test_disconnect() {
        let store = store();
        store.insert_node(&person(1, "a", 1)).unwrap();
        store.insert_node(&person(2, "b", 1)).unwrap();
        store.connect_nodes(&Edge::new(1, 2, "knows", json!({}))).unwrap();
        store.connect_nodes(&Edge::new(1, 2, "likes", json!({}))).unwrap();

        let removed = store.disconnect(&EdgeFilter::new().source(1).target(2).label("likes")).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(store.count_edges().unwrap(), 1);
        assert!(store.disconnect(&EdgeFilter::new()).is_err());
    }

    #[test]
    fn test_edges_of_direction() {
        let store = store();
        for i in 1..=3 {
            store.insert_node(&person(i, "n", i)).unwrap();
        }
        store.connect_nodes(&Edge::new(1, 2, "r", json!({}))).unwrap();
        store.connect_nodes(&Edge::new(3, 1, "r", json!({}))).unwrap();

        let id = NodeId::Int(1);
        assert_eq!(store.edges_of(&id, Direction::Outgoing).unwrap().len(), 1);
        assert_eq!(store.edges_of(&id, Direction::Incoming).unwrap().len(), 1);
        assert_eq!(store.edges_of(&id, Direction::Both).unwrap().len(), 2);

        let both: Vec<NodeId> = store
            .neighbors(&id, Direction::Both)
            .unwrap()
            .into_iter()
            .map(|s| s.node.id)
            .collect();
        assert_eq!(both, vec![NodeId::Int(2), NodeId::Int(3)]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        {
            let backend = SharedBackend::new(SqliteBackend::open(&path).unwrap());
            let store = GraphStore::new(Arc::new(backend)).unwrap();
            store.insert_node(&person(1, "Ada", 36)).unwrap();
        }

        let backend = SharedBackend::new(SqliteBackend::open(&path).unwrap());
        let store = GraphStore::new(Arc::new(backend)).unwrap();
        assert!(store.find_node(&NodeId::Int(1)).unwrap().is_some());
    }

    #[test]
    fn test_edge_endpoints_read_back_as_stored() {
        let store = store();
        store.insert_node(&Node::new("007", "agent", json!({}))).unwrap();
        store.insert_node(&Node::new("m", "agent", json!({}))).unwrap();
        store.connect_nodes(&Edge::new("m", "007", "reports_to", json!({}))).unwrap();

        let edges = store.edges_of(&NodeId::from("m"), Direction::Outgoing).unwrap();
        assert_eq!(edges[0].edge.target, NodeId::Text("007".into()));
        assert!(store.find_node(&edges[0].edge.target).unwrap().is_some());
    }
}
