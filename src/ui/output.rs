use crate::edge::Edge;
use crate::node::Node;
use crate::ui::{Icons, theme};
use owo_colors::OwoColorize;

/// Title line followed by a dimmed subtitle
pub fn banner(title: &str, subtitle: &str) {
    println!();
    println!("{} {}", Icons::GRAPH, title.style(theme().header.clone()));
    println!("   {}", subtitle.style(theme().dim.clone()));
    println!();
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().dim.clone()), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}

/// `id [label] {payload}`
pub fn node_line(node: &Node) {
    println!(
        "{} {} [{}] {}",
        Icons::NODE,
        node.id,
        node.label.style(theme().label.clone()),
        muted(&node.body())
    );
}

/// `source -[label]-> target {payload}`
pub fn edge_line(edge: &Edge) {
    println!(
        "{} {} -[{}]-> {} {}",
        Icons::EDGE,
        edge.source,
        edge.label.style(theme().label.clone()),
        edge.target,
        muted(&edge.properties())
    );
}

/// A similarity hit: distance then description
pub fn match_line(distance: f32, description: &str) {
    println!(
        "  {} {}",
        format!("{:.4}", distance).style(theme().score.clone()),
        description
    );
}
