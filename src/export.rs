//! Export utilities for the milestone dependency graph
//!
//! Provides Graphviz DOT export and a plain-text outline grouped by rank.

use crate::graph::{DependencyGraph, Layout};
use crate::models::MilestoneStatus;
use std::fmt::Write;

/// Configuration for DOT export
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Title for the graph
    pub title: Option<String>,
    /// Include task progress in labels
    pub show_progress: bool,
    /// Include milestone IDs in labels
    pub show_ids: bool,
    /// Orientation: "LR" (left-right), "TB" (top-bottom)
    pub rankdir: String,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            title: None,
            show_progress: true,
            show_ids: true,
            rankdir: "LR".to_string(),
        }
    }
}

/// Get the fill color for a milestone status
fn status_color(status: MilestoneStatus) -> &'static str {
    match status {
        MilestoneStatus::NotStarted => "#F5F5F5", // White smoke
        MilestoneStatus::InProgress => "#FFE4B5", // Moccasin
        MilestoneStatus::Done => "#90EE90",       // Light green
    }
}

/// Escape a string for DOT format
fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Truncate a string to at most `max_len` characters, marking the cut with "..."
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Render the graph as DOT. Edges point prerequisite → dependent; edges the
/// layout had to break to escape a cycle are drawn dashed red.
pub fn graph_to_dot(graph: &DependencyGraph, layout: &Layout, config: &DotConfig) -> String {
    let mut dot = String::new();

    // Writing to a String can't fail
    let _ = writeln!(dot, "digraph Milestones {{");
    let _ = writeln!(dot, "  rankdir={};", config.rankdir);
    let _ = writeln!(dot, "  node [shape=box style=\"rounded,filled\" fontname=\"Arial\" fontsize=10];");
    let _ = writeln!(dot, "  edge [fontname=\"Arial\" fontsize=9];");

    if let Some(title) = &config.title {
        let _ = writeln!(dot, "  label=\"{}\";", escape_dot(title));
        let _ = writeln!(dot, "  labelloc=t;");
        let _ = writeln!(dot, "  fontsize=14;");
    }
    let _ = writeln!(dot);

    for node in &graph.nodes {
        let mut label = String::new();
        if config.show_ids {
            let _ = write!(label, "[{}] ", node.id);
        }
        label.push_str(&truncate(&node.name, 40));
        if config.show_progress && node.progress.total > 0 {
            let _ = write!(
                label,
                "\n{}/{} tasks ({}%)",
                node.progress.done,
                node.progress.total,
                node.progress.percent()
            );
        }
        if let Some(owner) = &node.owner {
            let _ = write!(label, "\n@{}", owner);
        }

        let _ = writeln!(
            dot,
            "  m{} [label=\"{}\" fillcolor=\"{}\"];",
            node.id,
            escape_dot(&label),
            status_color(node.status)
        );
    }

    let _ = writeln!(dot);

    for edge in &graph.edges {
        let attrs = if layout.is_broken(edge) {
            " [style=\"dashed\" color=\"#CC0000\" constraint=false]"
        } else {
            ""
        };
        let _ = writeln!(dot, "  m{} -> m{}{};", edge.from, edge.to, attrs);
    }

    let _ = writeln!(dot, "}}");
    dot
}

/// Text outline: one block per rank, milestones in layout order
pub fn graph_to_outline(graph: &DependencyGraph, layout: &Layout) -> String {
    let mut out = String::new();
    for (rank, ids) in layout.ranks.iter().enumerate() {
        let _ = writeln!(out, "Rank {}", rank);
        for id in ids {
            let Some(node) = graph.node(*id) else { continue };
            let prereqs = graph.prerequisites(*id);
            let _ = write!(
                out,
                "  [{}] {} ({}, {}/{} tasks)",
                node.id, node.name, node.status, node.progress.done, node.progress.total
            );
            if !prereqs.is_empty() {
                let list: Vec<String> = prereqs.iter().map(|p| p.to_string()).collect();
                let _ = write!(out, " <- {}", list.join(", "));
            }
            let _ = writeln!(out);
        }
    }
    if !layout.broken_edges.is_empty() {
        let _ = writeln!(out, "Cycles broken at:");
        for edge in &layout.broken_edges {
            let _ = writeln!(out, "  {} -> {}", edge.from, edge.to);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LayoutConfig;
    use crate::models::{DependencyEdge, Milestone, Task, TaskStatus};

    fn milestone(id: i32, name: &str, status: MilestoneStatus) -> Milestone {
        Milestone {
            id,
            project_id: 1,
            name: name.to_string(),
            status,
            priority: 0,
            owner: None,
            description: None,
            start_date: None,
            end_date: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn sample_graph() -> DependencyGraph {
        let milestones = vec![
            milestone(1, "Design \"v2\"", MilestoneStatus::Done),
            milestone(2, "Build", MilestoneStatus::InProgress),
            milestone(3, "Ship", MilestoneStatus::NotStarted),
        ];
        let deps = vec![
            DependencyEdge { milestone_id: 2, depends_on_milestone_id: 1 },
            DependencyEdge { milestone_id: 3, depends_on_milestone_id: 2 },
        ];
        let tasks = vec![Task {
            id: 1,
            milestone_id: 2,
            title: "code".to_string(),
            status: TaskStatus::Done,
            assignee: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            completed_at: None,
        }];
        DependencyGraph::build(&milestones, &deps, &tasks)
    }

    #[test]
    fn test_graph_to_dot() {
        let graph = sample_graph();
        let layout = graph.layout(&LayoutConfig::default());
        let dot = graph_to_dot(&graph, &layout, &DotConfig::default());

        assert!(dot.starts_with("digraph Milestones {"));
        assert!(dot.contains("rankdir=LR;"));
        assert!(dot.contains("m1 -> m2;"));
        assert!(dot.contains("m2 -> m3;"));
        assert!(dot.contains("Design \\\"v2\\\""));
        assert!(dot.contains("1/1 tasks (100%)"));
        assert!(dot.contains("#90EE90"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_broken_edge_is_dashed() {
        let milestones = vec![
            milestone(1, "A", MilestoneStatus::NotStarted),
            milestone(2, "B", MilestoneStatus::NotStarted),
        ];
        let deps = vec![
            DependencyEdge { milestone_id: 2, depends_on_milestone_id: 1 },
            DependencyEdge { milestone_id: 1, depends_on_milestone_id: 2 },
        ];
        let graph = DependencyGraph::build(&milestones, &deps, &[]);
        let layout = graph.layout(&LayoutConfig::default());
        let dot = graph_to_dot(&graph, &layout, &DotConfig::default());
        assert!(dot.contains("m2 -> m1 [style=\"dashed\""));
    }

    #[test]
    fn test_outline() {
        let graph = sample_graph();
        let layout = graph.layout(&LayoutConfig::default());
        let outline = graph_to_outline(&graph, &layout);
        assert!(outline.contains("Rank 0\n  [1] Design \"v2\" (done, 0/0 tasks)"));
        assert!(outline.contains("[3] Ship (not_started, 0/0 tasks) <- 2"));
        assert!(!outline.contains("Cycles broken"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long milestone name", 10), "a long ...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("abcdefgh", 2), "...");
    }
}
