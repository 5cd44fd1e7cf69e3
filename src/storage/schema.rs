//! Database schema and statement table
//!
//! Every SQL string the crate runs lives here as a `const`, so the full set
//! of statements is fixed at compile time and shared read-only by every
//! backend. Only the predicate builder in `query::predicate` assembles SQL
//! at runtime, and it does so from the fragments below.

/// SQL to create the nodes table
///
/// `seq` is the surrogate sequence correlating a node with its embedding;
/// `id` is the caller-facing identifier in text form.
pub const CREATE_NODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    seq INTEGER PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    label TEXT NOT NULL,
    body TEXT NOT NULL
)
"#;

/// SQL to create the edges table
pub const CREATE_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    seq INTEGER PRIMARY KEY,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    label TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    UNIQUE(source, target, label, properties)
)
"#;

/// Highest sequence ever handed out per entity table
pub const CREATE_SEQUENCE_COUNTERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sequence_counters (
    entity TEXT PRIMARY KEY,
    high_water INTEGER NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label)",
    "CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source)",
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target)",
    "CREATE INDEX IF NOT EXISTS idx_edges_label ON edges(label)",
];

/// Script creating the graph tables, suitable for `execute_script`
pub fn graph_schema() -> String {
    let mut stmts = vec![
        CREATE_NODES_TABLE,
        CREATE_EDGES_TABLE,
        CREATE_SEQUENCE_COUNTERS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    join_script(&stmts)
}

/// Script creating both embedding tables
pub fn embedding_schema() -> String {
    join_script(&[NODE_EMBEDDINGS.create, EDGE_EMBEDDINGS.create])
}

fn join_script(stmts: &[&str]) -> String {
    stmts
        .iter()
        .map(|s| s.trim())
        .collect::<Vec<_>>()
        .join(";\n")
        + ";"
}

// Sequence allocation

pub const NODES_ENTITY: &str = "nodes";
pub const EDGES_ENTITY: &str = "edges";

pub const NEXT_NODE_SEQUENCE: &str = "SELECT MAX(\
    COALESCE((SELECT high_water FROM sequence_counters WHERE entity = 'nodes'), 0), \
    COALESCE((SELECT MAX(seq) FROM nodes), 0)) + 1";

pub const NEXT_EDGE_SEQUENCE: &str = "SELECT MAX(\
    COALESCE((SELECT high_water FROM sequence_counters WHERE entity = 'edges'), 0), \
    COALESCE((SELECT MAX(seq) FROM edges), 0)) + 1";

pub const BUMP_SEQUENCE: &str = "INSERT INTO sequence_counters (entity, high_water) VALUES (?1, ?2) \
    ON CONFLICT(entity) DO UPDATE SET high_water = MAX(high_water, excluded.high_water)";

// Nodes

pub const NODE_COLUMNS: &str = "seq, label, body";

pub const INSERT_NODE: &str = "INSERT INTO nodes (seq, id, label, body) VALUES (?1, ?2, ?3, ?4)";
pub const SELECT_NODE_BY_ID: &str = "SELECT seq, label, body FROM nodes WHERE id = ?1";
pub const SELECT_NODE_BY_SEQ: &str = "SELECT seq, label, body FROM nodes WHERE seq = ?1";
pub const SELECT_ALL_NODES: &str = "SELECT seq, label, body FROM nodes ORDER BY seq";
pub const SELECT_NODE_SEQUENCES: &str = "SELECT seq FROM nodes ORDER BY seq";
pub const UPDATE_NODE: &str = "UPDATE nodes SET seq = ?1, label = ?2, body = ?3 WHERE id = ?4";
pub const DELETE_NODE: &str = "DELETE FROM nodes WHERE id = ?1";
pub const COUNT_NODES: &str = "SELECT COUNT(*) FROM nodes";

// Edges

pub const EDGE_COLUMNS: &str = "seq, source, target, label, properties";

/// Insert an edge only if both endpoints exist and the exact tuple is new
pub const INSERT_EDGE_GUARDED: &str = r#"
INSERT INTO edges (seq, source, target, label, properties)
SELECT ?1, ?2, ?3, ?4, ?5
WHERE EXISTS (SELECT 1 FROM nodes WHERE id = ?2)
  AND EXISTS (SELECT 1 FROM nodes WHERE id = ?3)
  AND NOT EXISTS (
    SELECT 1 FROM edges
    WHERE source = ?2 AND target = ?3 AND label = ?4 AND properties = ?5
  )
"#;

pub const SELECT_EDGE_BY_SEQ: &str =
    "SELECT seq, source, target, label, properties FROM edges WHERE seq = ?1";
pub const SELECT_ALL_EDGES: &str =
    "SELECT seq, source, target, label, properties FROM edges ORDER BY seq";
pub const SELECT_EDGE_SEQUENCES: &str = "SELECT seq FROM edges ORDER BY seq";

/// Filter on any combination of endpoints and label; a NULL binding matches all
pub const SELECT_EDGES_FILTERED: &str = r#"
SELECT seq, source, target, label, properties FROM edges
WHERE (?1 IS NULL OR source = ?1)
  AND (?2 IS NULL OR target = ?2)
  AND (?3 IS NULL OR label = ?3)
ORDER BY seq
"#;

pub const SELECT_EDGES_FROM: &str =
    "SELECT seq, source, target, label, properties FROM edges WHERE source = ?1 ORDER BY seq";
pub const SELECT_EDGES_TO: &str =
    "SELECT seq, source, target, label, properties FROM edges WHERE target = ?1 ORDER BY seq";
pub const SELECT_EDGES_TOUCHING: &str = "SELECT seq, source, target, label, properties FROM edges \
    WHERE source = ?1 OR target = ?1 ORDER BY seq";

pub const UPDATE_EDGE: &str = "UPDATE edges SET seq = ?1, properties = ?2 WHERE seq = ?3";
pub const DELETE_EDGE_BY_SEQ: &str = "DELETE FROM edges WHERE seq = ?1";
pub const DELETE_EDGES_TOUCHING: &str = "DELETE FROM edges WHERE source = ?1 OR target = ?1";
pub const COUNT_EDGES: &str = "SELECT COUNT(*) FROM edges";

// Adjacency, in edge insertion order

pub const SELECT_NEIGHBORS_OUT: &str = r#"
SELECT n.seq, n.label, n.body FROM edges e
JOIN nodes n ON n.id = e.target
WHERE e.source = ?1
ORDER BY e.seq
"#;

pub const SELECT_NEIGHBORS_IN: &str = r#"
SELECT n.seq, n.label, n.body FROM edges e
JOIN nodes n ON n.id = e.source
WHERE e.target = ?1
ORDER BY e.seq
"#;

pub const SELECT_NEIGHBORS_BOTH: &str = r#"
SELECT n.seq, n.label, n.body FROM edges e
JOIN nodes n ON n.id = CASE WHEN e.source = ?1 THEN e.target ELSE e.source END
WHERE e.source = ?1 OR e.target = ?1
ORDER BY e.seq
"#;

// Co-located embedding tables

/// Statements for one embedding table
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingStatements {
    pub create: &'static str,
    pub insert: &'static str,
    pub delete: &'static str,
    /// Rows whose owner still exists (joined against the owner table)
    pub scan_owned: &'static str,
    pub sequences: &'static str,
    pub count: &'static str,
}

pub const NODE_EMBEDDINGS: EmbeddingStatements = EmbeddingStatements {
    create: r#"
CREATE TABLE IF NOT EXISTS node_embeddings (
    seq INTEGER PRIMARY KEY,
    vector BLOB NOT NULL,
    metadata TEXT
)
"#,
    insert: "INSERT OR IGNORE INTO node_embeddings (seq, vector, metadata) VALUES (?1, ?2, ?3)",
    delete: "DELETE FROM node_embeddings WHERE seq = ?1",
    scan_owned: "SELECT e.seq, e.vector, e.metadata FROM node_embeddings e \
        JOIN nodes o ON o.seq = e.seq ORDER BY e.seq",
    sequences: "SELECT seq FROM node_embeddings ORDER BY seq",
    count: "SELECT COUNT(*) FROM node_embeddings",
};

pub const EDGE_EMBEDDINGS: EmbeddingStatements = EmbeddingStatements {
    create: r#"
CREATE TABLE IF NOT EXISTS edge_embeddings (
    seq INTEGER PRIMARY KEY,
    vector BLOB NOT NULL,
    metadata TEXT
)
"#,
    insert: "INSERT OR IGNORE INTO edge_embeddings (seq, vector, metadata) VALUES (?1, ?2, ?3)",
    delete: "DELETE FROM edge_embeddings WHERE seq = ?1",
    scan_owned: "SELECT e.seq, e.vector, e.metadata FROM edge_embeddings e \
        JOIN edges o ON o.seq = e.seq ORDER BY e.seq",
    sequences: "SELECT seq FROM edge_embeddings ORDER BY seq",
    count: "SELECT COUNT(*) FROM edge_embeddings",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_are_terminated() {
        let script = graph_schema();
        assert!(script.contains("CREATE TABLE IF NOT EXISTS nodes"));
        assert!(script.contains("idx_edges_source"));
        assert!(script.ends_with(';'));
        assert!(embedding_schema().contains("edge_embeddings"));
    }
}
