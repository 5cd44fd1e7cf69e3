use crate::{OutputMode, emit_success};
use anyhow::Context;
use owo_colors::OwoColorize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use vectorgraph::config::{self, GraphConfig};
use vectorgraph::query::Clause;
use vectorgraph::ui::{self, Icons, Spinner};
use vectorgraph::{
    Condition, Direction, Edge, GraphDb, GraphFragment, Node, NodeId, NumericMerge, SearchMode, SearchOptions,
};

/// Resolved global flags shared by every command
pub struct Session {
    config_path: PathBuf,
    database: Option<PathBuf>,
    output_mode: OutputMode,
}

impl Session {
    pub fn new(config_path: Option<PathBuf>, database: Option<PathBuf>, output_mode: OutputMode) -> Self {
        Self {
            config_path: config_path.unwrap_or_else(config::default_config_path),
            database,
            output_mode,
        }
    }

    /// Directory relative database paths are resolved against
    fn base(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn config(&self) -> anyhow::Result<GraphConfig> {
        let mut config = config::load_config(Some(&self.config_path))
            .with_context(|| format!("failed to read {}", self.config_path.display()))?
            .unwrap_or_default();

        if let Some(database) = &self.database {
            config.backend.kind = config::BackendKind::Local;
            config.backend.path = Some(std::path::absolute(database)?.to_string_lossy().into_owned());
        }
        Ok(config)
    }

    fn open(&self) -> anyhow::Result<GraphDb> {
        Ok(GraphDb::open(&self.config()?, &self.base())?)
    }

    fn is_human(&self) -> bool {
        self.output_mode.is_human()
    }
}

fn parse_json(text: &str) -> anyhow::Result<Value> {
    serde_json::from_str(text).with_context(|| format!("invalid JSON: {}", text))
}

/// Command-line literal: JSON when it parses, otherwise a plain string
fn parse_literal(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Parse `key=value`, `key~pattern`, `key>value` or `key<value`
fn parse_condition(text: &str) -> anyhow::Result<Condition> {
    let Some(at) = text.find(['=', '~', '>', '<']) else {
        anyhow::bail!("expected key=value, key~pattern, key>value or key<value: {}", text);
    };
    let (key, rest) = text.split_at(at);
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("missing key in condition: {}", text);
    }

    let value = &rest[1..];
    Ok(match &rest[..1] {
        "~" => Condition::like(key, value),
        ">" => Condition::gt(key, parse_literal(value)),
        "<" => Condition::lt(key, parse_literal(value)),
        _ => Condition::eq(key, parse_literal(value)),
    })
}

pub fn run_init(session: &Session, force: bool) -> anyhow::Result<()> {
    let config = GraphConfig::default();
    config::write_config(&session.config_path, &config, force)?;

    let base = session.base();
    let config = session.config()?;
    let db_path = config.database_path_in(&base);
    config::ensure_db_dir(&db_path)?;
    config::ensure_gitignore(&base)?;
    let db = GraphDb::open(&config, &base)?;

    if session.is_human() {
        ui::success("Initialized vectorgraph");
        ui::status(Icons::PACKAGE, "Config", &session.config_path.display().to_string());
        ui::status(Icons::DATABASE, "Database", &db_path.display().to_string());
    } else {
        emit_success(
            session.output_mode,
            "init",
            json!({
                "config": session.config_path,
                "database": db_path,
                "stats": db.stats()?,
            }),
        )?;
    }
    Ok(())
}

pub fn run_add_node(session: &Session, id: Option<String>, label: &str, attrs: &str) -> anyhow::Result<()> {
    let db = session.open()?;
    let attributes = parse_json(attrs)?;

    let inserted = match id {
        Some(id) => {
            let id = NodeId::from_key(&id);
            db.add_node(&Node::new(id.clone(), label, attributes))?.then_some(id)
        }
        None => db.add_node_generated(label, attributes)?,
    };

    if session.is_human() {
        match &inserted {
            Some(id) => ui::success(&format!("Added node {}", id)),
            None => ui::warn("Node not added (id exists or payload rejected)"),
        }
    } else {
        emit_success(
            session.output_mode,
            "add-node",
            json!({ "inserted": inserted.is_some(), "id": inserted }),
        )?;
    }
    Ok(())
}

pub fn run_update_node(session: &Session, id: &str, label: Option<String>, attrs: &str) -> anyhow::Result<()> {
    let db = session.open()?;
    let id = NodeId::from_key(id);
    let label = match label {
        Some(label) => label,
        None => match db.find_node(&id)? {
            Some(existing) => existing.label,
            None => anyhow::bail!("Node {} not found (pass --label to insert it)", id),
        },
    };

    let updated = db.update_node(&Node::new(id, label, parse_json(attrs)?))?;

    if session.is_human() {
        match &updated {
            Some(node) => {
                ui::success("Node updated");
                ui::node_line(node);
            }
            None => ui::warn("Update discarded by validation"),
        }
    } else {
        emit_success(session.output_mode, "update-node", json!({ "node": updated }))?;
    }
    Ok(())
}

pub fn run_connect(session: &Session, source: &str, target: &str, label: &str, attrs: &str) -> anyhow::Result<()> {
    let db = session.open()?;
    let edge = Edge::new(NodeId::from_key(source), NodeId::from_key(target), label, parse_json(attrs)?);
    let connected = db.connect_nodes(&edge)?;

    if session.is_human() {
        if connected {
            ui::success("Connected");
            ui::edge_line(&edge);
        } else {
            ui::warn("Not connected (missing endpoint or edge already exists)");
        }
    } else {
        emit_success(session.output_mode, "connect", json!({ "connected": connected, "edge": edge }))?;
    }
    Ok(())
}

pub fn run_disconnect(session: &Session, source: &str, target: &str, label: Option<&str>) -> anyhow::Result<()> {
    let db = session.open()?;
    let removed = db.disconnect_nodes(&NodeId::from_key(source), &NodeId::from_key(target), label)?;

    if session.is_human() {
        ui::status(Icons::DEL, "Edges removed", &removed.to_string());
    } else {
        emit_success(session.output_mode, "disconnect", json!({ "removed": removed }))?;
    }
    Ok(())
}

pub fn run_remove_node(session: &Session, id: &str) -> anyhow::Result<()> {
    let db = session.open()?;
    let removed = db.remove_node(&NodeId::from_key(id))?;

    if session.is_human() {
        if removed {
            ui::success(&format!("Removed node {}", id));
        } else {
            ui::warn(&format!("Node {} not found", id));
        }
    } else {
        emit_success(session.output_mode, "remove-node", json!({ "removed": removed }))?;
    }
    Ok(())
}

pub fn run_get(session: &Session, id: &str) -> anyhow::Result<()> {
    let db = session.open()?;
    let id = NodeId::from_key(id);
    let Some(node) = db.find_node(&id)? else {
        anyhow::bail!("Node {} not found", id);
    };
    let edges = db.edges_of(&id, Direction::Both)?;

    if session.is_human() {
        ui::node_line(&node);
        if !edges.is_empty() {
            ui::section("Edges");
            for edge in &edges {
                ui::edge_line(edge);
            }
        }
    } else {
        emit_success(session.output_mode, "get", json!({ "node": node, "edges": edges }))?;
    }
    Ok(())
}

pub struct FindArgs {
    pub conditions: Vec<String>,
    pub clauses: Option<String>,
    pub bindings: Option<String>,
    pub tree: bool,
    pub edges: bool,
}

pub fn run_find(session: &Session, args: FindArgs) -> anyhow::Result<()> {
    let db = session.open()?;
    let mode = if args.tree { SearchMode::Tree } else { SearchMode::Direct };

    let condition = match &args.clauses {
        Some(clauses) => {
            let clauses: Vec<Clause> = serde_json::from_str(clauses).context("invalid clause list")?;
            let bindings: Vec<Value> = match &args.bindings {
                Some(bindings) => serde_json::from_str(bindings).context("invalid bindings")?,
                None => Vec::new(),
            };
            Some(Condition::from_clauses(&clauses, &bindings)?)
        }
        None => args
            .conditions
            .iter()
            .map(|c| parse_condition(c))
            .collect::<anyhow::Result<Vec<_>>>()?
            .into_iter()
            .reduce(Condition::and),
    };

    if args.edges {
        let edges = match &condition {
            Some(condition) => db.find_edges_where(condition, mode)?,
            None => db.all_edges()?,
        };
        if session.is_human() {
            ui::section(&format!("{} edges", edges.len()));
            for edge in &edges {
                ui::edge_line(edge);
            }
        } else {
            emit_success(session.output_mode, "find", json!({ "edges": edges }))?;
        }
        return Ok(());
    }

    let nodes = match &condition {
        Some(condition) => db.find_nodes(condition, mode)?,
        None => db.all_nodes()?,
    };
    if session.is_human() {
        if nodes.is_empty() {
            println!("{} No nodes found.", Icons::CROSS);
        } else {
            println!("{}", ui::nodes_table(&nodes));
        }
    } else {
        emit_success(session.output_mode, "find", json!({ "nodes": nodes }))?;
    }
    Ok(())
}

pub fn run_traverse(
    session: &Session,
    source: &str,
    target: Option<&str>,
    direction: &str,
    bodies: bool,
) -> anyhow::Result<()> {
    let db = session.open()?;
    let direction: Direction = direction.parse()?;
    let target = target.map(NodeId::from_key);
    let traversal = db.traverse(&NodeId::from_key(source), target.as_ref(), direction, bodies)?;

    if session.is_human() {
        let path: Vec<String> = traversal.ids().iter().map(|id| id.to_string()).collect();
        ui::status(Icons::RIGHT, "Path", &path.join(" → "));
        let outcome = if traversal.found() { "found" } else { "exhausted" };
        ui::status(Icons::INFO, "Outcome", outcome);
    } else {
        emit_success(session.output_mode, "traverse", serde_json::to_value(&traversal)?)?;
    }
    Ok(())
}

pub fn run_search(session: &Session, query: &str, options: &SearchOptions) -> anyhow::Result<()> {
    let db = session.open()?;
    let result = db.search(query, options)?;

    if !session.is_human() {
        return emit_success(session.output_mode, "search", serde_json::to_value(&result)?);
    }

    println!("{} Searching for: '{}'", Icons::SEARCH, query);
    let Some(result) = result else {
        ui::warn("No similarity data to search");
        return Ok(());
    };

    if result.nodes.is_empty() && result.edges.is_empty() {
        println!("{} No matches.", Icons::CROSS);
        return Ok(());
    }
    if !result.nodes.is_empty() {
        ui::section("Nodes");
        for hit in &result.nodes {
            ui::match_line(hit.distance, &hit.node.short_description());
        }
    }
    if !result.edges.is_empty() {
        ui::section("Edges");
        for hit in &result.edges {
            let edge = &hit.edge;
            ui::match_line(hit.distance, &format!("{} -[{}]-> {}", edge.source, edge.label, edge.target));
        }
    }
    println!();
    ui::summary_row(
        "Connected subgraph:",
        &format!("{} nodes, {} edges", result.subgraph.nodes.len(), result.subgraph.edges.len()),
    );
    Ok(())
}

pub fn run_merge(session: &Session, threshold: Option<f32>, numeric: Option<NumericMerge>) -> anyhow::Result<()> {
    let config = session.config()?;
    let db = GraphDb::open(&config, &session.base())?;

    let mut options = config.merge.options();
    if let Some(threshold) = threshold {
        options = options.with_threshold(threshold);
    }
    if let Some(numeric) = numeric {
        options = options.with_numeric(numeric);
    }

    if !session.is_human() {
        let report = db.merge_by_similarity(&options)?;
        return emit_success(session.output_mode, "merge", serde_json::to_value(&report)?);
    }

    let spinner = Spinner::new("Merging similar nodes...");
    let report = db.merge_by_similarity(&options)?;
    spinner.finish(&format!("Merged {} nodes", report.merged.len()));

    for (survivor, duplicate) in &report.merged {
        println!(
            "  {} {} {} {}",
            Icons::MERGE,
            duplicate,
            "→".style(ui::theme().dim.clone()),
            survivor
        );
    }
    ui::summary_row("Edges re-pointed:", &report.edges_repointed.to_string());
    Ok(())
}

pub fn run_import(session: &Session, file: &Path) -> anyhow::Result<()> {
    let db = session.open()?;
    let fragment = GraphFragment::read_from(file).with_context(|| format!("failed to read {}", file.display()))?;

    if !session.is_human() {
        let report = db.import(&fragment)?;
        return emit_success(session.output_mode, "import", serde_json::to_value(&report)?);
    }

    let spinner = Spinner::new(&format!("Importing {}...", file.display()));
    let report = db.import(&fragment)?;
    spinner.finish("Import complete");
    ui::summary_row("Nodes:", &format!("{} of {}", report.nodes, fragment.nodes.len()));
    ui::summary_row("Edges:", &format!("{} of {}", report.edges, fragment.edges.len()));
    Ok(())
}

pub fn run_export(session: &Session, output: Option<&Path>) -> anyhow::Result<()> {
    let db = session.open()?;
    let fragment = db.export()?;

    match output {
        Some(path) => {
            fragment.write_to(path)?;
            if session.is_human() {
                ui::success(&format!(
                    "Exported {} nodes, {} edges to {}",
                    fragment.nodes.len(),
                    fragment.edges.len(),
                    path.display()
                ));
            } else {
                emit_success(
                    session.output_mode,
                    "export",
                    json!({ "path": path, "nodes": fragment.nodes.len(), "edges": fragment.edges.len() }),
                )?;
            }
        }
        None if session.is_human() => println!("{}", fragment.to_json_pretty()?),
        None => emit_success(session.output_mode, "export", serde_json::to_value(&fragment)?)?,
    }
    Ok(())
}

pub fn run_stats(session: &Session) -> anyhow::Result<()> {
    let db = session.open()?;
    let stats = db.stats()?;

    if session.is_human() {
        ui::banner(
            &format!("{}", "vectorgraph".bold()),
            &format!("Version {}", env!("CARGO_PKG_VERSION")),
        );
        println!("{} Graph statistics", Icons::STATS);
        println!("{}", ui::stats_table(&stats));
    } else {
        emit_success(session.output_mode, "stats", serde_json::to_value(&stats)?)?;
    }
    Ok(())
}

pub fn run_repair(session: &Session) -> anyhow::Result<()> {
    let db = session.open()?;

    if !session.is_human() {
        let report = db.repair()?;
        return emit_success(session.output_mode, "repair", serde_json::to_value(&report)?);
    }

    let spinner = Spinner::new("Reconciling embeddings...");
    let report = db.repair()?;
    spinner.finish("Repair complete");
    ui::summary_row("Orphaned embeddings removed:", &report.orphans_removed.to_string());
    ui::summary_row("Missing embeddings added:", &report.embeddings_added.to_string());
    Ok(())
}
