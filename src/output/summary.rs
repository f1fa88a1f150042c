use std::collections::HashMap;
use std::fmt::Write;

use comfy_table::Cell;
use serde_json::Value;

use crate::graph::Graph;
use crate::providers::BuildStatus;

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{create_table, cyan_header, status_count_cell};

/// One graph of the store, ready for printing.
pub struct GraphView {
    pub group: String,
    pub repository: String,
    pub graph: Graph,
}

/// Prints an overview table and one tree per graph to stdout.
///
/// Trees are laid out breadth-first from each repository root, indented by
/// their distance from it.
pub fn print_summary(views: &[GraphView]) {
    println!("{}", render_summary(views));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn node_status(graph: &Graph, id: &str) -> BuildStatus {
    graph
        .get_node(id)
        .and_then(|node| node.data.get("status"))
        .and_then(|status| serde_json::from_value(status.clone()).ok())
        .unwrap_or(BuildStatus::Unknown)
}

fn pipelines(graph: &Graph) -> impl Iterator<Item = &str> {
    let source = graph.get_source();
    graph
        .get_nodes()
        .into_iter()
        .filter(move |id| Some(*id) != source)
}

fn status_counts(graph: &Graph) -> HashMap<BuildStatus, usize> {
    let mut counts = HashMap::new();
    for id in pipelines(graph) {
        *counts.entry(node_status(graph, id)).or_insert(0) += 1;
    }
    counts
}

/// Breadth-first order from the root, each id paired with its depth.
fn levels(graph: &Graph) -> Vec<(String, usize)> {
    let Some(root) = graph.get_source() else {
        return Vec::new();
    };

    let order = graph.breadth_first_search(root);
    let mut depth: HashMap<&str, usize> = HashMap::from([(root, 0)]);

    for id in &order {
        let current = depth.get(id.as_str()).copied().unwrap_or(0);
        for link in graph.get_links(id).unwrap_or_default() {
            depth.entry(link.as_str()).or_insert(current + 1);
        }
    }

    order
        .iter()
        .map(|id| (id.clone(), depth.get(id.as_str()).copied().unwrap_or(0)))
        .collect()
}

fn styled_status(status: BuildStatus) -> String {
    match status {
        BuildStatus::Passed => bright_green(status).to_string(),
        BuildStatus::Failed => bright_red(status).to_string(),
        BuildStatus::Building => bright_yellow(status).to_string(),
        BuildStatus::Cancelled | BuildStatus::Unknown => dim(status).to_string(),
    }
}

fn build_number(graph: &Graph, id: &str) -> Option<String> {
    match graph.get_node(id)?.data.get("build-number")? {
        Value::Null => None,
        value => Some(format!("#{value}")),
    }
}

#[allow(clippy::format_push_string)]
fn render_summary(views: &[GraphView]) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");

    if views.is_empty() {
        output.push_str(&format!("  {}\n", bright_yellow("No source repositories found.")));
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "Group",
        "Repository",
        "Pipelines",
        "Passed",
        "Failed",
        "Building",
    ]));

    for view in views {
        let counts = status_counts(&view.graph);
        let count = |status| counts.get(&status).copied().unwrap_or(0);

        table.add_row(vec![
            Cell::new(&view.group),
            Cell::new(&view.repository),
            Cell::new(pipelines(&view.graph).count()),
            status_count_cell(count(BuildStatus::Passed), BuildStatus::Passed),
            status_count_cell(count(BuildStatus::Failed), BuildStatus::Failed),
            status_count_cell(count(BuildStatus::Building), BuildStatus::Building),
        ]);
    }

    output.push_str(&format!("{table}\n\n"));

    add_section_header(&mut output, "🔀", "Pipelines");

    for view in views {
        output.push_str(&format!(
            "\n  {} {}\n",
            cyan(&view.group),
            dim(&view.repository)
        ));

        for (id, depth) in levels(&view.graph) {
            if depth == 0 {
                continue;
            }

            let indent = "  ".repeat(depth + 1);
            let number = build_number(&view.graph, &id).unwrap_or_default();
            output.push_str(&format!(
                "{indent}└─ {} {} {}\n",
                bright(&id),
                dim(number),
                styled_status(node_status(&view.graph, &id))
            ));
        }
    }

    output
}
