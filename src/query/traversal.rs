//! Traversal engine
//!
//! Two algorithms live here:
//! - [`TraversalEngine::traverse`]: a single-hop scan of a node's direct
//!   neighbours, stopping early at an optional target
//! - [`TraversalEngine::connected`]: multi-hop BFS collecting the connected
//!   neighbourhood of a set of seed nodes, guarded by a visited set

use std::collections::{HashSet, VecDeque};
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::edge::Direction;
use crate::fragment::GraphFragment;
use crate::node::{Node, NodeId};
use crate::storage::GraphStore;

/// One step of a traversal path: the bare id, or the full node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Visit {
    Node(Node),
    Id(NodeId),
}

impl Visit {
    pub fn id(&self) -> &NodeId {
        match self {
            Visit::Id(id) => id,
            Visit::Node(node) => &node.id,
        }
    }
}

/// How a traversal ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalOutcome {
    /// The target was reached
    Found,
    /// The neighbour set ran out first (or no target was given)
    Exhausted,
}

/// Visited path plus terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Traversal {
    pub path: Vec<Visit>,
    pub outcome: TraversalOutcome,
}

impl Traversal {
    pub fn found(&self) -> bool {
        self.outcome == TraversalOutcome::Found
    }

    pub fn ids(&self) -> Vec<&NodeId> {
        self.path.iter().map(Visit::id).collect()
    }
}

/// Traversal over a graph store's adjacency
pub struct TraversalEngine<'a> {
    store: &'a GraphStore,
}

impl<'a> TraversalEngine<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Single-hop neighbour scan
    ///
    /// The path starts with `source`, then lists each distinct direct
    /// neighbour in edge insertion order, stopping as soon as `target` is
    /// appended. `traverse(a, Some(a))` is found immediately. A missing
    /// source yields an empty, exhausted path.
    pub fn traverse(
        &self,
        source: &NodeId,
        target: Option<&NodeId>,
        direction: Direction,
        with_bodies: bool,
    ) -> Result<Traversal> {
        let Some(start) = self.store.find_node(source)? else {
            return Ok(Traversal {
                path: Vec::new(),
                outcome: TraversalOutcome::Exhausted,
            });
        };

        let is_target = |id: &NodeId| target.is_some_and(|t| t.same_as(id));
        let visit = |node: Node| if with_bodies { Visit::Node(node) } else { Visit::Id(node.id) };

        let mut seen = HashSet::new();
        seen.insert(start.id.key());
        let start_is_target = is_target(&start.id);
        let mut path = vec![visit(start)];

        if start_is_target {
            return Ok(Traversal {
                path,
                outcome: TraversalOutcome::Found,
            });
        }

        for neighbor in self.store.neighbors(source, direction)? {
            let node = neighbor.node;
            if !seen.insert(node.id.key()) {
                continue;
            }
            let hit = is_target(&node.id);
            path.push(visit(node));
            if hit {
                return Ok(Traversal {
                    path,
                    outcome: TraversalOutcome::Found,
                });
            }
        }

        Ok(Traversal {
            path,
            outcome: TraversalOutcome::Exhausted,
        })
    }

    /// Connected neighbourhood of `seeds`, following edges in both directions
    ///
    /// Nodes are returned in BFS order starting from the seeds; every edge
    /// crossed during the search is included once. `max_depth = None`
    /// expands the full connected component.
    pub fn connected(&self, seeds: &[NodeId], max_depth: Option<usize>) -> Result<GraphFragment> {
        let mut fragment = GraphFragment::default();
        let mut visited = HashSet::new();
        let mut crossed = HashSet::new();
        let mut queue = VecDeque::new();

        for seed in seeds {
            if !visited.insert(seed.key()) {
                continue;
            }
            if let Some(node) = self.store.find_node(seed)? {
                fragment.nodes.push(node);
                queue.push_back((seed.clone(), 0usize));
            }
        }

        while let Some((current, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }

            for record in self.store.edges_of(&current, Direction::Both)? {
                if !crossed.insert(record.sequence) {
                    continue;
                }
                let other = record.edge.other_end(&current).clone();
                fragment.edges.push(record.edge);

                if visited.insert(other.key()) {
                    if let Some(node) = self.store.find_node(&other)? {
                        fragment.nodes.push(node);
                        queue.push_back((other, depth + 1));
                    }
                }
            }
        }

        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use serde_json::json;

    fn store_with(ids: &[i64]) -> GraphStore {
        let store = GraphStore::open_in_memory().unwrap();
        for id in ids {
            store.insert_node(&Node::new(*id, "n", json!({"i": id}))).unwrap();
        }
        store
    }

    fn connect(store: &GraphStore, a: i64, b: i64) {
        store.connect_nodes(&Edge::new(a, b, "r", json!({}))).unwrap();
    }

    #[test]
    fn test_self_loop_short_circuit() {
        let store = store_with(&[1]);
        connect(&store, 1, 1);

        let t = store
            .traverse_adjacency(&NodeId::Int(1), Some(&NodeId::Int(1)), Direction::Both, false)
            .unwrap();
        assert_eq!(t.path, vec![Visit::Id(NodeId::Int(1))]);
        assert!(t.found());
    }

    #[test]
    fn test_stops_at_target_in_edge_order() {
        let store = store_with(&[1, 2, 3, 4]);
        connect(&store, 1, 3);
        connect(&store, 1, 2);
        connect(&store, 1, 4);

        let t = store
            .traverse_adjacency(&NodeId::Int(1), Some(&NodeId::Int(2)), Direction::Outgoing, false)
            .unwrap();
        let ids: Vec<i64> = t.ids().iter().map(|id| id.key().parse().unwrap()).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert!(t.found());
    }

    #[test]
    fn test_direction_filters_neighbors() {
        let store = store_with(&[1, 2, 3]);
        connect(&store, 1, 2);
        connect(&store, 3, 1);

        let out = store.traverse_adjacency(&NodeId::Int(1), None, Direction::Outgoing, false).unwrap();
        assert_eq!(out.path.len(), 2);
        assert_eq!(out.outcome, TraversalOutcome::Exhausted);

        let incoming = store.traverse_adjacency(&NodeId::Int(1), None, Direction::Incoming, false).unwrap();
        assert_eq!(incoming.ids(), vec![&NodeId::Int(1), &NodeId::Int(3)]);
    }

    #[test]
    fn test_fully_connected_terminates_within_n() {
        let n = 6;
        let ids: Vec<i64> = (1..=n).collect();
        let store = store_with(&ids);
        for a in &ids {
            for b in &ids {
                connect(&store, *a, *b);
            }
        }

        let t = store.traverse_adjacency(&NodeId::Int(1), None, Direction::Both, false).unwrap();
        assert!(t.path.len() <= n as usize);
        assert_eq!(t.path.len(), n as usize);
    }

    #[test]
    fn test_with_bodies() {
        let store = store_with(&[1, 2]);
        connect(&store, 1, 2);

        let t = store.traverse_adjacency(&NodeId::Int(1), None, Direction::Both, true).unwrap();
        match &t.path[1] {
            Visit::Node(node) => assert_eq!(node.attribute("i"), Some(&json!(2))),
            other => panic!("expected full node, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_source() {
        let store = store_with(&[]);
        let t = store.traverse_adjacency(&NodeId::Int(9), None, Direction::Both, false).unwrap();
        assert!(t.path.is_empty());
    }

    #[test]
    fn test_connected_handles_cycles() {
        let store = store_with(&[1, 2, 3, 4, 5]);
        connect(&store, 1, 2);
        connect(&store, 2, 3);
        connect(&store, 3, 1);
        connect(&store, 4, 5);

        let engine = TraversalEngine::new(&store);
        let component = engine.connected(&[NodeId::Int(1)], None).unwrap();
        assert_eq!(component.nodes.len(), 3);
        assert_eq!(component.edges.len(), 3);

        let shallow = engine.connected(&[NodeId::Int(1)], Some(0)).unwrap();
        assert_eq!(shallow.nodes.len(), 1);
        assert!(shallow.edges.is_empty());

        let both = engine.connected(&[NodeId::Int(1), NodeId::Int(4)], None).unwrap();
        assert_eq!(both.nodes.len(), 5);
    }
}
