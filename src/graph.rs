//! GraphDb - the consistency coordinator
//!
//! Pairs the relational [`GraphStore`] with a [`VectorStore`] and keeps them
//! in step: every structural write has its embedding counterpart, issued in
//! the same call.
//!
//! - insert: graph row, then embedding under the new sequence
//! - update: graph row re-sequenced, old embedding deleted, new one added
//! - remove: sequences captured and rows cascaded in one unit of work, then
//!   the captured embeddings deleted
//!
//! The embedding write is not atomic with the graph write. A crash in
//! between leaves either a row without an embedding (a search miss) or an
//! embedding without a row; similarity hits are therefore always resolved
//! against the graph store, and [`GraphDb::repair`] reconciles both sides.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::config::{BackendKind, GraphConfig, ProviderKind, VectorPlacement};
use crate::edge::{Direction, Edge, EdgeRecord};
use crate::fragment::GraphFragment;
use crate::merge::{MergeEngine, MergeOptions, MergeReport};
use crate::node::{Node, NodeId};
use crate::ontology::{OntologyValidator, RequiredKeysValidator, ValidationPolicy};
use crate::query::{Clause, Condition, SearchMode, Traversal, TraversalEngine};
use crate::storage::{EdgeFilter, GraphStore, SharedBackend, SqliteBackend, StoredNode};
use crate::vector::{
    EmbeddingProvider, EntityClass, HashEmbeddingProvider, MemoryVectorIndex, NullEmbeddingProvider,
    SearchHit, SearchParams, SqlVectorIndex, VectorIndex, VectorStore,
};
use crate::{Error, Result};

/// Options for [`GraphDb::search`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Keep hits at most this far from the query
    pub threshold: Option<f32>,
    /// Nearest hits fetched per entity class
    pub limit: usize,
    /// Order hits by this attribute instead of distance
    pub sort_by: Option<String>,
    /// Reverse the `sort_by` order; ignored without `sort_by`
    pub descending: bool,
    /// Hops expanded around each hit; `None` for the whole component
    pub max_depth: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threshold: None,
            limit: 10,
            sort_by: None,
            descending: false,
            max_depth: None,
        }
    }
}

impl SearchOptions {
    fn params(&self) -> SearchParams {
        SearchParams {
            k: self.limit,
            threshold: self.threshold,
            sort_key: self.sort_by.clone(),
            descending: self.descending,
        }
    }
}

/// A node matched by similarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMatch {
    pub node: Node,
    pub distance: f32,
}

/// An edge matched by similarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMatch {
    pub edge: Edge,
    pub distance: f32,
}

/// Hits of a similarity search plus the subgraph connected to them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub nodes: Vec<NodeMatch>,
    pub edges: Vec<EdgeMatch>,
    pub subgraph: GraphFragment,
}

/// Row and embedding counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub node_embeddings: usize,
    pub edge_embeddings: usize,
    pub colocated: bool,
    pub graph_location: String,
    pub vector_location: String,
}

impl fmt::Display for GraphStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Nodes: {}, Edges: {}, Node embeddings: {}, Edge embeddings: {}",
            self.nodes, self.edges, self.node_embeddings, self.edge_embeddings
        )
    }
}

/// What [`GraphDb::repair`] changed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Embedding rows deleted because their owner is gone
    pub orphans_removed: usize,
    /// Graph rows that were missing an embedding and got one
    pub embeddings_added: usize,
}

/// What [`GraphDb::import`] inserted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub nodes: usize,
    pub edges: usize,
}

/// Graph database with similarity search
pub struct GraphDb {
    store: GraphStore,
    vectors: VectorStore,
    colocated: bool,
    validator: Option<Arc<dyn OntologyValidator>>,
    policy: ValidationPolicy,
    gate: Mutex<()>,
}

impl GraphDb {
    /// Combine a graph store and a vector store
    ///
    /// The two are co-located when they report the same store location.
    pub fn new(store: GraphStore, vectors: VectorStore) -> Self {
        let colocated = store.location() == vectors.location();
        tracing::debug!(
            "Graph at {}, vectors at {} ({})",
            store.location(),
            vectors.location(),
            if colocated { "co-located" } else { "decoupled" }
        );

        Self {
            store,
            vectors,
            colocated,
            validator: None,
            policy: ValidationPolicy::default(),
            gate: Mutex::new(()),
        }
    }

    /// In-memory SQLite with co-located vectors and hash embeddings
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&GraphConfig::in_memory(), Path::new("."))
    }

    /// Build the backend, vector index, provider and validator from `config`
    ///
    /// Relative database paths are resolved against `base`. A decoupled index
    /// starts empty, so it is rebuilt from the graph rows before returning.
    pub fn open(config: &GraphConfig, base: &Path) -> Result<Self> {
        let backend = Arc::new(match config.backend.kind {
            BackendKind::Memory => SharedBackend::new(SqliteBackend::open_in_memory()?),
            BackendKind::Local => {
                let path = config.database_path_in(base);
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                SharedBackend::new(SqliteBackend::open(&path)?)
            }
            BackendKind::Remote => open_remote(config)?,
        });

        let store = GraphStore::new(backend.clone())?;

        let index: Arc<dyn VectorIndex> = match config.vectors.placement {
            VectorPlacement::Colocated => Arc::new(SqlVectorIndex::new(backend, config.vectors.metric)?),
            VectorPlacement::Memory => Arc::new(MemoryVectorIndex::new(config.vectors.metric)),
        };

        let provider: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
            ProviderKind::Hash => Arc::new(HashEmbeddingProvider::new(config.embedding.dimension)),
            ProviderKind::None => Arc::new(NullEmbeddingProvider),
            ProviderKind::Fastembed => fastembed_provider()?,
        };

        let mut db = Self::new(store, VectorStore::new(index, provider));
        if !config.ontology.required.is_empty() {
            let validator = RequiredKeysValidator::new(config.ontology.required.clone());
            db = db.with_validator(Arc::new(validator), config.ontology.policy);
        }
        if !db.colocated {
            db.repair()?;
        }

        tracing::info!("Opened graph at {}", db.store.location());
        Ok(db)
    }

    /// Validate every node before it is written
    pub fn with_validator(mut self, validator: Arc<dyn OntologyValidator>, policy: ValidationPolicy) -> Self {
        self.validator = Some(validator);
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    /// Whether embeddings live in the graph backend itself
    pub fn is_colocated(&self) -> bool {
        self.colocated
    }

    fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the validator; `Ok(false)` means discard
    fn admit(&self, node: &Node) -> Result<bool> {
        let Some(validator) = &self.validator else {
            return Ok(true);
        };
        if validator.validate(&node.label, &node.attributes) {
            return Ok(true);
        }

        match self.policy {
            ValidationPolicy::Reject => Err(Error::Validation {
                resource_type: node.label.clone(),
            }),
            ValidationPolicy::Discard => {
                tracing::debug!("Discarding node {} failing '{}' validation", node.id, node.label);
                Ok(false)
            }
        }
    }

    /// Whether the validator (if any) accepts `node`, without applying the policy
    pub(crate) fn accepts(&self, node: &Node) -> bool {
        self.validator
            .as_ref()
            .is_none_or(|validator| validator.validate(&node.label, &node.attributes))
    }

    fn embed_node(&self, sequence: i64, node: &Node) -> Result<bool> {
        self.vectors
            .add_embedding(EntityClass::Node, sequence, &Value::Object(node.attributes.clone()))
    }

    fn embed_edge(&self, sequence: i64, edge: &Edge) -> Result<bool> {
        self.vectors
            .add_embedding(EntityClass::Edge, sequence, &edge.embedding_document())
    }

    // === Nodes ===

    /// Insert a node and its embedding
    ///
    /// Returns `false` if the id already existed (nothing written) or the
    /// node was discarded by validation.
    pub fn add_node(&self, node: &Node) -> Result<bool> {
        if !self.admit(node)? {
            return Ok(false);
        }

        let _gate = self.write_gate();
        match self.store.insert_node(node)? {
            Some(seq) => {
                self.embed_node(seq, node)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Insert a node under a freshly generated id
    pub fn add_node_generated(&self, label: &str, attributes: impl Into<Value>) -> Result<Option<NodeId>> {
        let attributes = crate::node::into_object(attributes.into());
        let id = NodeId::generate(label, &attributes);
        let node = Node::new(id.clone(), label, attributes);
        Ok(self.add_node(&node)?.then_some(id))
    }

    /// Insert a batch of nodes; returns how many were written
    ///
    /// Validation runs over the whole batch before anything is written. The
    /// batch is not atomic: a backend failure keeps earlier rows.
    pub fn add_nodes(&self, nodes: &[Node]) -> Result<usize> {
        let mut admitted = Vec::with_capacity(nodes.len());
        for node in nodes {
            if self.admit(node)? {
                admitted.push(node.clone());
            }
        }

        let _gate = self.write_gate();
        let plan = self.store.insert_nodes(&admitted)?;

        let mut inserted = 0;
        for (node, seq) in admitted.iter().zip(plan) {
            if let Some(seq) = seq {
                self.embed_node(seq, node)?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Merge `node.attributes` onto the stored node (inserting if absent)
    /// and re-embed it
    ///
    /// The previous embedding is always deleted. Returns the node as stored,
    /// or `None` if validation discarded the update.
    pub fn update_node(&self, node: &Node) -> Result<Option<Node>> {
        let _gate = self.write_gate();

        if self.validator.is_some() {
            let mut candidate = node.clone();
            if let Some(existing) = self.store.find_node(&node.id)? {
                candidate.attributes = existing.attributes;
                crate::node::merge_shallow(&mut candidate.attributes, node.attributes.clone());
            }
            if !self.admit(&candidate)? {
                return Ok(None);
            }
        }

        let upserted = self.store.upsert_node(node)?;
        if let Some(previous) = upserted.previous {
            self.vectors.remove_embedding(EntityClass::Node, previous)?;
        }
        self.embed_node(upserted.sequence, &upserted.node)?;
        Ok(Some(upserted.node))
    }

    /// [`update_node`](Self::update_node) for each node in turn
    pub fn upsert_nodes(&self, nodes: &[Node]) -> Result<Vec<Node>> {
        let mut written = Vec::with_capacity(nodes.len());
        for node in nodes {
            if let Some(stored) = self.update_node(node)? {
                written.push(stored);
            }
        }
        Ok(written)
    }

    /// Remove a node, its edges, and all their embeddings
    pub fn remove_node(&self, id: &NodeId) -> Result<bool> {
        let _gate = self.write_gate();

        let Some(removed) = self.store.remove_node(id)? else {
            return Ok(false);
        };

        self.vectors.remove_embedding(EntityClass::Node, removed.sequence)?;
        for seq in removed.edge_sequences {
            self.vectors.remove_embedding(EntityClass::Edge, seq)?;
        }
        Ok(true)
    }

    pub fn find_node(&self, id: &NodeId) -> Result<Option<Node>> {
        self.store.find_node(id)
    }

    pub fn find_nodes(&self, condition: &Condition, mode: SearchMode) -> Result<Vec<Node>> {
        self.store.find_nodes(condition, mode)
    }

    pub fn find_nodes_by_clauses(&self, clauses: &[Clause], bindings: &[Value], mode: SearchMode) -> Result<Vec<Node>> {
        self.store.find_nodes_by_clauses(clauses, bindings, mode)
    }

    /// Every node, in sequence order
    pub fn all_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.store.all_nodes()?.into_iter().map(|s| s.node).collect())
    }

    // === Edges ===

    /// Connect two existing nodes and embed the edge
    ///
    /// Returns `false` if an endpoint is missing or the tuple already exists.
    pub fn connect_nodes(&self, edge: &Edge) -> Result<bool> {
        let _gate = self.write_gate();
        match self.store.connect_nodes(edge)? {
            Some(seq) => {
                self.embed_edge(seq, edge)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Connect a batch of edges; returns how many were written
    pub fn connect_many_nodes(&self, edges: &[Edge]) -> Result<usize> {
        let _gate = self.write_gate();
        let plan = self.store.connect_many(edges)?;

        let mut inserted = 0;
        for (edge, seq) in edges.iter().zip(plan) {
            if let Some(seq) = seq {
                self.embed_edge(seq, edge)?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Merge attributes onto the edge with the same endpoints and label
    pub fn update_edge(&self, edge: &Edge) -> Result<Option<Edge>> {
        let _gate = self.write_gate();

        let Some(upserted) = self.store.upsert_edge(edge)? else {
            return Ok(None);
        };
        if let Some(previous) = upserted.previous {
            self.vectors.remove_embedding(EntityClass::Edge, previous)?;
        }
        self.embed_edge(upserted.sequence, &upserted.edge)?;
        Ok(Some(upserted.edge))
    }

    /// Remove edges from `source` to `target` (optionally only one label)
    pub fn disconnect_nodes(&self, source: &NodeId, target: &NodeId, label: Option<&str>) -> Result<usize> {
        let _gate = self.write_gate();

        let filter = EdgeFilter {
            source: Some(source.clone()),
            target: Some(target.clone()),
            label: label.map(str::to_string),
        };
        let removed = self.store.disconnect(&filter)?;
        for seq in &removed {
            self.vectors.remove_embedding(EntityClass::Edge, *seq)?;
        }
        Ok(removed.len())
    }

    pub fn find_edges(&self, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        Ok(self.store.find_edges(filter)?.into_iter().map(|r| r.edge).collect())
    }

    pub fn find_edges_where(&self, condition: &Condition, mode: SearchMode) -> Result<Vec<Edge>> {
        Ok(self.store.find_edges_where(condition, mode)?.into_iter().map(|r| r.edge).collect())
    }

    pub fn edges_of(&self, id: &NodeId, direction: Direction) -> Result<Vec<Edge>> {
        Ok(self.store.edges_of(id, direction)?.into_iter().map(|r| r.edge).collect())
    }

    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        Ok(self.store.all_edges()?.into_iter().map(|r| r.edge).collect())
    }

    // === Traversal & search ===

    /// Single-hop neighbour scan from `source`
    pub fn traverse(
        &self,
        source: &NodeId,
        target: Option<&NodeId>,
        direction: Direction,
        with_bodies: bool,
    ) -> Result<Traversal> {
        self.store.traverse_adjacency(source, target, direction, with_bodies)
    }

    /// Nodes nearest to an attribute document, resolved against the graph
    ///
    /// `None` when there is no similarity data to compare against.
    pub fn similar_nodes(&self, query: &Value, params: &SearchParams) -> Result<Option<Vec<NodeMatch>>> {
        let Some(hits) = self.vectors.search(EntityClass::Node, query, params)? else {
            return Ok(None);
        };
        self.resolve_node_hits(hits).map(Some)
    }

    /// Edges nearest to a document, resolved against the graph
    pub fn similar_edges(&self, query: &Value, params: &SearchParams) -> Result<Option<Vec<EdgeMatch>>> {
        let Some(hits) = self.vectors.search(EntityClass::Edge, query, params)? else {
            return Ok(None);
        };
        self.resolve_edge_hits(hits).map(Some)
    }

    /// Similarity search over nodes and edges
    ///
    /// Hits passing the threshold seed a BFS (visited-set guarded) that
    /// collects their connected neighbourhood into `subgraph`. Returns `None`
    /// if neither class has similarity data or `text` embeds to nothing.
    pub fn search(&self, text: &str, options: &SearchOptions) -> Result<Option<SearchResult>> {
        let query = Value::String(text.to_string());
        let params = options.params();

        let nodes = self.similar_nodes(&query, &params)?;
        let edges = self.similar_edges(&query, &params)?;
        if nodes.is_none() && edges.is_none() {
            return Ok(None);
        }

        let nodes = nodes.unwrap_or_default();
        let edges = edges.unwrap_or_default();

        let mut seeds = Vec::new();
        let mut seen = HashSet::new();
        let endpoints = edges.iter().flat_map(|m| [&m.edge.source, &m.edge.target]);
        for id in nodes.iter().map(|m| &m.node.id).chain(endpoints) {
            if seen.insert(id.key()) {
                seeds.push(id.clone());
            }
        }

        let subgraph = TraversalEngine::new(&self.store).connected(&seeds, options.max_depth)?;
        Ok(Some(SearchResult { nodes, edges, subgraph }))
    }

    /// Map index hits back to graph rows
    ///
    /// A co-located index already joined against the owner table; a
    /// decoupled one may return rows whose owner is gone, which are skipped.
    fn resolve_node_hits(&self, hits: Vec<SearchHit>) -> Result<Vec<NodeMatch>> {
        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.node_by_sequence(hit.sequence)? {
                Some(StoredNode { node, .. }) => matches.push(NodeMatch {
                    node,
                    distance: hit.distance,
                }),
                None => self.report_orphan(EntityClass::Node, hit.sequence),
            }
        }
        Ok(matches)
    }

    fn resolve_edge_hits(&self, hits: Vec<SearchHit>) -> Result<Vec<EdgeMatch>> {
        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.edge_by_sequence(hit.sequence)? {
                Some(EdgeRecord { edge, .. }) => matches.push(EdgeMatch {
                    edge,
                    distance: hit.distance,
                }),
                None => self.report_orphan(EntityClass::Edge, hit.sequence),
            }
        }
        Ok(matches)
    }

    fn report_orphan(&self, class: EntityClass, sequence: i64) {
        if self.colocated {
            tracing::debug!("{} {} removed during search", class, sequence);
        } else {
            tracing::warn!("Orphaned {} embedding {} skipped (run repair)", class, sequence);
        }
    }

    // === Maintenance ===

    /// Merge near-duplicate nodes, see [`MergeEngine`]
    pub fn merge_by_similarity(&self, options: &MergeOptions) -> Result<MergeReport> {
        MergeEngine::new(self, options.clone()).run()
    }

    pub fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            nodes: self.store.count_nodes()?,
            edges: self.store.count_edges()?,
            node_embeddings: self.vectors.count(EntityClass::Node)?,
            edge_embeddings: self.vectors.count(EntityClass::Edge)?,
            colocated: self.colocated,
            graph_location: self.store.location().to_string(),
            vector_location: self.vectors.location().to_string(),
        })
    }

    /// Reconcile the vector index with the graph
    ///
    /// Deletes embeddings whose owner row is gone and embeds rows that have
    /// no embedding.
    pub fn repair(&self) -> Result<RepairReport> {
        let _gate = self.write_gate();
        let mut report = RepairReport::default();

        let node_rows = self.store.node_sequences()?;
        let edge_rows = self.store.edge_sequences()?;

        for (class, rows) in [(EntityClass::Node, &node_rows), (EntityClass::Edge, &edge_rows)] {
            let owners: HashSet<i64> = rows.iter().copied().collect();
            for seq in self.vectors.index().sequences(class)? {
                if !owners.contains(&seq) && self.vectors.remove_embedding(class, seq)? {
                    report.orphans_removed += 1;
                }
            }
        }

        let embedded: HashSet<i64> = self.vectors.index().sequences(EntityClass::Node)?.into_iter().collect();
        for stored in self.store.all_nodes()? {
            if !embedded.contains(&stored.sequence) && self.embed_node(stored.sequence, &stored.node)? {
                report.embeddings_added += 1;
            }
        }

        let embedded: HashSet<i64> = self.vectors.index().sequences(EntityClass::Edge)?.into_iter().collect();
        for record in self.store.all_edges()? {
            if !embedded.contains(&record.sequence) && self.embed_edge(record.sequence, &record.edge)? {
                report.embeddings_added += 1;
            }
        }

        if report != RepairReport::default() {
            tracing::info!(
                "Repair removed {} orphaned embeddings, added {} missing",
                report.orphans_removed,
                report.embeddings_added
            );
        }
        Ok(report)
    }

    /// Insert a fragment's nodes, then its edges
    pub fn import(&self, fragment: &GraphFragment) -> Result<ImportReport> {
        Ok(ImportReport {
            nodes: self.add_nodes(&fragment.nodes)?,
            edges: self.connect_many_nodes(&fragment.edges)?,
        })
    }

    pub fn export(&self) -> Result<GraphFragment> {
        Ok(GraphFragment {
            nodes: self.all_nodes()?,
            edges: self.all_edges()?,
        })
    }
}

#[cfg(feature = "remote")]
fn open_remote(config: &GraphConfig) -> Result<SharedBackend> {
    use crate::storage::RemoteBackend;

    let url = config
        .backend
        .url
        .as_deref()
        .ok_or_else(|| Error::Config("backend.url is required for a remote backend".to_string()))?;
    let token = config
        .backend
        .auth_token
        .clone()
        .or_else(|| std::env::var("LIBSQL_AUTH_TOKEN").ok())
        .unwrap_or_default();

    Ok(SharedBackend::new(RemoteBackend::connect(url, &token)?))
}

#[cfg(not(feature = "remote"))]
fn open_remote(_config: &GraphConfig) -> Result<SharedBackend> {
    Err(Error::Config(
        "remote backend requested but vectorgraph was built without the `remote` feature".to_string(),
    ))
}

#[cfg(feature = "fastembed")]
fn fastembed_provider() -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(crate::vector::FastEmbedProvider::new()?))
}

#[cfg(not(feature = "fastembed"))]
fn fastembed_provider() -> Result<Arc<dyn EmbeddingProvider>> {
    Err(Error::Config(
        "fastembed provider requested but vectorgraph was built without the `fastembed` feature".to_string(),
    ))
}
