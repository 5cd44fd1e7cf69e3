use crate::graph::GraphStats;
use crate::node::Node;
use tabled::{Table, Tabled, settings::Style};

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Attributes")]
    attributes: String,
}

pub fn stats_table(stats: &GraphStats) -> String {
    let rows = [
        ("Nodes", stats.nodes.to_string()),
        ("Edges", stats.edges.to_string()),
        ("Node embeddings", stats.node_embeddings.to_string()),
        ("Edge embeddings", stats.edge_embeddings.to_string()),
        ("Graph store", stats.graph_location.clone()),
        ("Vector store", stats.vector_location.clone()),
        ("Co-located", if stats.colocated { "yes" } else { "no" }.to_string()),
    ]
    .map(|(metric, value)| MetricRow { metric, value });
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn nodes_table(nodes: &[Node]) -> String {
    let rows: Vec<NodeRow> = nodes
        .iter()
        .map(|node| NodeRow {
            id: node.id.to_string(),
            label: node.label.clone(),
            attributes: node.body(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stats_table_lists_counts() {
        let stats = GraphStats {
            nodes: 3,
            edges: 2,
            node_embeddings: 3,
            edge_embeddings: 2,
            colocated: true,
            graph_location: "sqlite:memory:1".to_string(),
            vector_location: "sqlite:memory:1".to_string(),
        };
        let table = stats_table(&stats);
        assert!(table.contains("Node embeddings"));
        assert!(table.contains("sqlite:memory:1"));
        assert!(table.contains("yes"));
    }

    #[test]
    fn test_nodes_table() {
        let table = nodes_table(&[Node::new(7, "person", json!({"name": "Ada"}))]);
        assert!(table.contains("person"));
        assert!(table.contains("Ada"));
    }
}
