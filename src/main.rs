//! vectorgraph CLI - graph store with vector similarity search

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vectorgraph::NumericMerge;
use vectorgraph::ui;

#[derive(Parser)]
#[command(name = "vectorgraph")]
#[command(version)]
#[command(about = "Graph store where every node and edge carries a JSON payload and a vector embedding")]
#[command(long_about = r#"
vectorgraph keeps a property graph and a vector index in step, enabling:
  • Structural queries over JSON attributes (=, LIKE, >, <)
  • Similarity search over nodes and edges
  • Neighbour traversal and connected-subgraph expansion
  • Merging of near-duplicate nodes

Example usage:
  vectorgraph init
  vectorgraph add-node --id 1 --label person --attrs '{"name": "Ada"}'
  vectorgraph connect 1 2 --label knows
  vectorgraph search "mathematician"
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of human output
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file (defaults to ./vectorgraph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to a local database file (overrides the config backend)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Insert a node (skipped if the id already exists)
    AddNode {
        /// Node id; generated when omitted
        #[arg(long)]
        id: Option<String>,

        #[arg(short, long)]
        label: String,

        /// JSON object payload
        #[arg(short, long, default_value = "{}")]
        attrs: String,
    },

    /// Merge attributes into an existing node (inserting it if absent)
    UpdateNode {
        id: String,

        /// New label (defaults to the current one)
        #[arg(short, long)]
        label: Option<String>,

        /// JSON object merged over the stored payload
        #[arg(short, long, default_value = "{}")]
        attrs: String,
    },

    /// Connect two existing nodes
    Connect {
        source: String,
        target: String,

        #[arg(short, long)]
        label: String,

        #[arg(short, long, default_value = "{}")]
        attrs: String,
    },

    /// Remove edges between two nodes
    Disconnect {
        source: String,
        target: String,

        /// Only edges with this label
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Remove a node with its edges and embeddings
    RemoveNode { id: String },

    /// Show a node and its edges
    Get { id: String },

    /// Find nodes (or edges) by attribute predicates
    Find {
        /// `key=value`, `key~pattern` (LIKE), `key>value` or `key<value`; repeatable, AND-ed
        #[arg(short = 'w', long = "where")]
        conditions: Vec<String>,

        /// JSON clause list, e.g. '[{"key":"age","predicate":">"}]'
        #[arg(long, conflicts_with = "conditions")]
        clauses: Option<String>,

        /// JSON array of values bound to the clause list
        #[arg(long, requires = "clauses")]
        bindings: Option<String>,

        /// Match keys at any depth of the payload
        #[arg(long)]
        tree: bool,

        /// Match edges instead of nodes
        #[arg(long)]
        edges: bool,
    },

    /// Walk the direct neighbours of a node
    Traverse {
        source: String,

        /// Stop when this node is reached
        #[arg(short, long)]
        target: Option<String>,

        /// out, in or both
        #[arg(long, default_value = "both")]
        direction: String,

        /// Include full node payloads in the path
        #[arg(long)]
        bodies: bool,
    },

    /// Similarity search over nodes and edges
    Search {
        query: String,

        /// Nearest hits per entity class
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Maximum distance of a hit
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Order hits by this attribute
        #[arg(long)]
        sort_by: Option<String>,

        #[arg(long, requires = "sort_by")]
        descending: bool,

        /// Hops of connected subgraph around each hit
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Merge near-duplicate nodes
    Merge {
        /// Distance below which nodes are merged (defaults to the config)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// How colliding numeric attributes are combined
        #[arg(long, value_enum)]
        numeric: Option<NumericArg>,
    },

    /// Import a `{nodes, edges}` JSON fragment
    Import { file: PathBuf },

    /// Export the whole graph as a JSON fragment
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show node, edge and embedding counts
    Stats,

    /// Reconcile embeddings with the graph
    Repair,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum NumericArg {
    Overwrite,
    Sum,
    Concatenate,
}

impl From<NumericArg> for NumericMerge {
    fn from(arg: NumericArg) -> Self {
        match arg {
            NumericArg::Overwrite => NumericMerge::Overwrite,
            NumericArg::Sum => NumericMerge::Sum,
            NumericArg::Concatenate => NumericMerge::Concatenate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(&self) -> bool {
        *self == OutputMode::Human
    }
}

/// Print a `{"ok": true, "command", "data"}` envelope
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode == OutputMode::Json {
        let envelope = serde_json::json!({
            "ok": true,
            "command": command,
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

fn emit_error(output_mode: OutputMode, err: &anyhow::Error) {
    match output_mode {
        OutputMode::Json => {
            let envelope = serde_json::json!({
                "ok": false,
                "error": format!("{:#}", err),
            });
            println!("{}", envelope);
        }
        OutputMode::Human => ui::error(&format!("{:#}", err)),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let session = commands::Session::new(cli.config, cli.database, output_mode);

    let result = match cli.command {
        Commands::Init { force } => commands::run_init(&session, force),
        Commands::AddNode { id, label, attrs } => commands::run_add_node(&session, id, &label, &attrs),
        Commands::UpdateNode { id, label, attrs } => commands::run_update_node(&session, &id, label, &attrs),
        Commands::Connect { source, target, label, attrs } => {
            commands::run_connect(&session, &source, &target, &label, &attrs)
        }
        Commands::Disconnect { source, target, label } => {
            commands::run_disconnect(&session, &source, &target, label.as_deref())
        }
        Commands::RemoveNode { id } => commands::run_remove_node(&session, &id),
        Commands::Get { id } => commands::run_get(&session, &id),
        Commands::Find { conditions, clauses, bindings, tree, edges } => commands::run_find(
            &session,
            commands::FindArgs {
                conditions,
                clauses,
                bindings,
                tree,
                edges,
            },
        ),
        Commands::Traverse { source, target, direction, bodies } => {
            commands::run_traverse(&session, &source, target.as_deref(), &direction, bodies)
        }
        Commands::Search { query, limit, threshold, sort_by, descending, depth } => {
            let options = vectorgraph::SearchOptions {
                threshold,
                limit,
                sort_by,
                descending,
                max_depth: depth,
            };
            commands::run_search(&session, &query, &options)
        }
        Commands::Merge { threshold, numeric } => {
            commands::run_merge(&session, threshold, numeric.map(NumericMerge::from))
        }
        Commands::Import { file } => commands::run_import(&session, &file),
        Commands::Export { output } => commands::run_export(&session, output.as_deref()),
        Commands::Stats => commands::run_stats(&session),
        Commands::Repair => commands::run_repair(&session),
    };

    if let Err(err) = result {
        emit_error(output_mode, &err);
        std::process::exit(1);
    }
    Ok(())
}
