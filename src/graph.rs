//! Milestone dependency graph and its left-to-right layout
//!
//! Dependency edges are advisory and may contain cycles, so the ranking step
//! can't assume a DAG. Ranks come from a Kahn-style longest-path pass; when it
//! stalls on a cycle, one node is forced and the edges that kept it blocked are
//! reported as broken instead of looping forever.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{DependencyEdge, Milestone, MilestoneStatus, Task, TaskStatus};

/// `[graph]` section of the config
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_node_width")]
    pub node_width: f64,
    #[serde(default = "default_node_height")]
    pub node_height: f64,
    /// Horizontal gap between ranks
    #[serde(default = "default_rank_sep")]
    pub rank_sep: f64,
    /// Vertical gap between nodes of one rank
    #[serde(default = "default_node_sep")]
    pub node_sep: f64,
    /// Barycenter passes (each one down sweep plus one up sweep)
    #[serde(default = "default_sweeps")]
    pub sweeps: usize,
}

fn default_node_width() -> f64 {
    200.0
}

fn default_node_height() -> f64 {
    90.0
}

fn default_rank_sep() -> f64 {
    100.0
}

fn default_node_sep() -> f64 {
    50.0
}

fn default_sweeps() -> usize {
    4
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: default_node_width(),
            node_height: default_node_height(),
            rank_sep: default_rank_sep(),
            node_sep: default_node_sep(),
            sweeps: default_sweeps(),
        }
    }
}

/// Task completion of one milestone, counted when the graph is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub done: usize,
    pub in_progress: usize,
}

impl Progress {
    /// Completed fraction in [0, 1]; 0 for a milestone without tasks
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.done as f64 / self.total as f64
        }
    }

    pub fn percent(&self) -> u16 {
        (self.fraction() * 100.0).round() as u16
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: i32,
    pub name: String,
    pub status: MilestoneStatus,
    pub priority: i32,
    pub owner: Option<String>,
    pub progress: Progress,
}

/// Directed prerequisite → dependent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GraphEdge {
    pub from: i32,
    pub to: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl DependencyGraph {
    /// One node per milestone. Edges touching milestones outside the set are
    /// dropped and duplicates collapse.
    pub fn build(milestones: &[Milestone], dependencies: &[DependencyEdge], tasks: &[Task]) -> Self {
        let mut progress: HashMap<i32, Progress> = milestones.iter().map(|m| (m.id, Progress::default())).collect();
        for task in tasks {
            if let Some(p) = progress.get_mut(&task.milestone_id) {
                p.total += 1;
                match task.status {
                    TaskStatus::Done => p.done += 1,
                    TaskStatus::InProgress => p.in_progress += 1,
                    TaskStatus::Pending => {}
                }
            }
        }

        let nodes: Vec<GraphNode> = milestones
            .iter()
            .map(|m| GraphNode {
                id: m.id,
                name: m.name.clone(),
                status: m.status,
                priority: m.priority,
                owner: m.owner.clone(),
                progress: progress.get(&m.id).copied().unwrap_or_default(),
            })
            .collect();

        let edges: BTreeSet<GraphEdge> = dependencies
            .iter()
            .filter(|d| progress.contains_key(&d.milestone_id) && progress.contains_key(&d.depends_on_milestone_id))
            .map(|d| GraphEdge {
                from: d.depends_on_milestone_id,
                to: d.milestone_id,
            })
            .collect();

        Self {
            nodes,
            edges: edges.into_iter().collect(),
        }
    }

    pub fn node(&self, id: i32) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Prerequisites of a milestone
    pub fn prerequisites(&self, id: i32) -> Vec<i32> {
        self.edges.iter().filter(|e| e.to == id).map(|e| e.from).collect()
    }

    /// A milestone is blocked while any prerequisite is not done
    pub fn is_blocked(&self, id: i32) -> bool {
        self.prerequisites(id)
            .iter()
            .filter_map(|p| self.node(*p))
            .any(|n| n.status != MilestoneStatus::Done)
    }

    pub fn layout(&self, config: &LayoutConfig) -> Layout {
        if self.nodes.is_empty() {
            return Layout::default();
        }

        let index: HashMap<i32, usize> = self.nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        let (edges, graph_edges): (Vec<(usize, usize)>, Vec<GraphEdge>) = self
            .edges
            .iter()
            .filter_map(|e| Some(((*index.get(&e.from)?, *index.get(&e.to)?), *e)))
            .unzip();

        let (rank, broken) = self.assign_ranks(&edges);
        let kept: Vec<(usize, usize)> = edges
            .iter()
            .enumerate()
            .filter(|(i, _)| !broken.contains(i))
            .map(|(_, e)| *e)
            .collect();

        let rank_count = rank.iter().max().map_or(0, |r| r + 1);
        let mut ranks: Vec<Vec<usize>> = vec![Vec::new(); rank_count];
        for (node, r) in rank.iter().enumerate() {
            ranks[*r].push(node);
        }
        for members in &mut ranks {
            members.sort_by_key(|&n| (self.nodes[n].priority, self.nodes[n].id));
        }
        let ranks = self.order_ranks(ranks, &kept, config.sweeps);

        // Coordinates
        let tallest = ranks.iter().map(Vec::len).max().unwrap_or(0);
        let column_height = |count: usize| {
            if count == 0 {
                0.0
            } else {
                count as f64 * config.node_height + (count - 1) as f64 * config.node_sep
            }
        };
        let height = column_height(tallest);
        let width = rank_count as f64 * config.node_width + rank_count.saturating_sub(1) as f64 * config.rank_sep;

        let mut positions = Vec::with_capacity(self.nodes.len());
        for (r, members) in ranks.iter().enumerate() {
            let x = r as f64 * (config.node_width + config.rank_sep);
            let top = (height - column_height(members.len())) / 2.0;
            for (order, &n) in members.iter().enumerate() {
                positions.push(NodePosition {
                    id: self.nodes[n].id,
                    rank: r,
                    order,
                    x,
                    y: top + order as f64 * (config.node_height + config.node_sep),
                    width: config.node_width,
                    height: config.node_height,
                });
            }
        }

        Layout {
            positions,
            ranks: ranks
                .iter()
                .map(|members| members.iter().map(|&n| self.nodes[n].id).collect())
                .collect(),
            edges: kept
                .iter()
                .map(|&(f, t)| GraphEdge {
                    from: self.nodes[f].id,
                    to: self.nodes[t].id,
                })
                .collect(),
            broken_edges: broken.iter().map(|&i| graph_edges[i]).collect(),
            width,
            height,
        }
    }

    /// Longest-path ranks plus the indices of edges broken to escape cycles
    fn assign_ranks(&self, edges: &[(usize, usize)]) -> (Vec<usize>, BTreeSet<usize>) {
        let n = self.nodes.len();
        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, &(from, to)) in edges.iter().enumerate() {
            outgoing[from].push(i);
            incoming[to].push(i);
        }

        let key = |v: usize| (self.nodes[v].priority, self.nodes[v].id, v);
        let mut remaining: Vec<usize> = incoming.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<(i32, i32, usize)> = (0..n).filter(|&v| remaining[v] == 0).map(key).collect();
        let mut done = vec![false; n];
        let mut rank = vec![0usize; n];
        let mut broken = BTreeSet::new();

        for _ in 0..n {
            let v = match ready.pop_first() {
                Some((_, _, v)) => v,
                None => {
                    // Stalled on a cycle: force the least-blocked node
                    let Some(v) = (0..n)
                        .filter(|&v| !done[v])
                        .min_by_key(|&v| (remaining[v], self.nodes[v].priority, self.nodes[v].id))
                    else {
                        break;
                    };
                    for &e in &incoming[v] {
                        if !done[edges[e].0] {
                            broken.insert(e);
                        }
                    }
                    remaining[v] = 0;
                    v
                }
            };
            done[v] = true;

            for &e in &outgoing[v] {
                let w = edges[e].1;
                if done[w] || broken.contains(&e) {
                    continue;
                }
                rank[w] = rank[w].max(rank[v] + 1);
                remaining[w] -= 1;
                if remaining[w] == 0 {
                    ready.insert(key(w));
                }
            }
        }

        (rank, broken)
    }

    /// Barycenter sweeps, keeping the ordering with the fewest crossings seen
    fn order_ranks(&self, mut ranks: Vec<Vec<usize>>, edges: &[(usize, usize)], sweeps: usize) -> Vec<Vec<usize>> {
        let mut preds: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut succs: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(from, to) in edges {
            succs.entry(from).or_default().push(to);
            preds.entry(to).or_default().push(from);
        }

        let mut best = ranks.clone();
        let mut best_crossings = count_crossings(&ranks, edges);

        for _ in 0..sweeps {
            if best_crossings == 0 {
                break;
            }
            for r in 1..ranks.len() {
                let (before, after) = ranks.split_at_mut(r);
                reorder(&mut after[0], &before[r - 1], &preds);
            }
            for r in (0..ranks.len().saturating_sub(1)).rev() {
                let (before, after) = ranks.split_at_mut(r + 1);
                reorder(&mut before[r], &after[0], &succs);
            }

            let crossings = count_crossings(&ranks, edges);
            if crossings < best_crossings {
                best_crossings = crossings;
                best = ranks.clone();
            }
        }
        best
    }
}

/// Stable-sort `layer` by the mean position of each node's neighbors in
/// `fixed`. Nodes without neighbors there keep their current position as key.
fn reorder(layer: &mut [usize], fixed: &[usize], neighbors: &HashMap<usize, Vec<usize>>) {
    let position: HashMap<usize, usize> = fixed.iter().enumerate().map(|(i, &n)| (n, i)).collect();
    let mut keyed: Vec<(f64, usize)> = layer
        .iter()
        .enumerate()
        .map(|(current, &n)| {
            let placed: Vec<usize> = neighbors
                .get(&n)
                .map(|ns| ns.iter().filter_map(|m| position.get(m).copied()).collect())
                .unwrap_or_default();
            let key = if placed.is_empty() {
                current as f64
            } else {
                placed.iter().sum::<usize>() as f64 / placed.len() as f64
            };
            (key, n)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    for (slot, (_, n)) in layer.iter_mut().zip(keyed) {
        *slot = n;
    }
}

/// Crossings between edges that join adjacent ranks
fn count_crossings(ranks: &[Vec<usize>], edges: &[(usize, usize)]) -> usize {
    let mut place: HashMap<usize, (usize, usize)> = HashMap::new();
    for (r, members) in ranks.iter().enumerate() {
        for (i, &n) in members.iter().enumerate() {
            place.insert(n, (r, i));
        }
    }

    let mut by_rank: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
    for &(from, to) in edges {
        let (Some(&(rf, of)), Some(&(rt, ot))) = (place.get(&from), place.get(&to)) else {
            continue;
        };
        if rt == rf + 1 {
            by_rank.entry(rf).or_default().push((of, ot));
        }
    }

    let mut crossings = 0;
    for segment in by_rank.values() {
        for (i, a) in segment.iter().enumerate() {
            for b in &segment[i + 1..] {
                if (a.0 < b.0 && a.1 > b.1) || (a.0 > b.0 && a.1 < b.1) {
                    crossings += 1;
                }
            }
        }
    }
    crossings
}

/// Top-left corner and size of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodePosition {
    pub id: i32,
    pub rank: usize,
    /// Index within the rank, top to bottom
    pub order: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NodePosition {
    pub fn overlaps(&self, other: &NodePosition) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Layout {
    /// Rank by rank, top to bottom within each rank
    pub positions: Vec<NodePosition>,
    /// Milestone ids per rank in display order
    pub ranks: Vec<Vec<i32>>,
    /// Edges drawn forward between ranks
    pub edges: Vec<GraphEdge>,
    /// Edges dropped from ranking to break cycles
    pub broken_edges: Vec<GraphEdge>,
    pub width: f64,
    pub height: f64,
}

impl Layout {
    pub fn position(&self, id: i32) -> Option<&NodePosition> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn rank_of(&self, id: i32) -> Option<usize> {
        self.position(id).map(|p| p.rank)
    }

    /// Crossing count between adjacent ranks
    pub fn edge_crossings(&self) -> usize {
        let mut crossings = 0;
        let segments: Vec<(&NodePosition, &NodePosition)> = self
            .edges
            .iter()
            .filter_map(|e| Some((self.position(e.from)?, self.position(e.to)?)))
            .filter(|(a, b)| b.rank == a.rank + 1)
            .collect();
        for (i, (a1, b1)) in segments.iter().enumerate() {
            for (a2, b2) in &segments[i + 1..] {
                if a1.rank != a2.rank {
                    continue;
                }
                if (a1.order < a2.order && b1.order > b2.order) || (a1.order > a2.order && b1.order < b2.order) {
                    crossings += 1;
                }
            }
        }
        crossings
    }

    pub fn is_broken(&self, edge: &GraphEdge) -> bool {
        self.broken_edges.contains(edge)
    }
}

/// Ids of milestones with no prerequisites inside the graph
pub fn roots(graph: &DependencyGraph) -> Vec<i32> {
    let targets: HashSet<i32> = graph.edges.iter().map(|e| e.to).collect();
    graph.nodes.iter().map(|n| n.id).filter(|id| !targets.contains(id)).collect()
}
