//! Application state for the TUI

use std::time::{Duration, Instant};

use crossterm::event::{MouseEvent, MouseEventKind};

use crate::graph::{DependencyGraph, Layout, LayoutConfig};
use crate::models::*;
use crate::sync::{Mutation, Query, QueryResult, SyncEvent, SyncLayer};
use crate::watch::ChangeFeed;
use crate::{Config, Database};

/// Number of dialogue entries the timeline loads
pub const TIMELINE_LIMIT: i64 = 200;

/// Current view mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Board,
    Dialogue,
    Dag,
}

impl View {
    pub fn next(self) -> Self {
        match self {
            View::Board => View::Dialogue,
            View::Dialogue => View::Dag,
            View::Dag => View::Board,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            View::Board => "Board",
            View::Dialogue => "Dialogue",
            View::Dag => "Dependencies",
        }
    }
}

/// Cached queries the TUI keeps fresh
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    Projects,
    Milestones,
    Tasks,
    Dependencies,
    Timeline,
    Detail,
}

/// Where a composed entry goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeTarget {
    Milestone(i32),
    /// Every milestone of the current project
    Broadcast,
}

/// Text entry overlay for a dialogue entry
#[derive(Debug, Clone, PartialEq)]
pub struct Compose {
    pub target: ComposeTarget,
    pub entry_type: EntryType,
    pub buffer: String,
}

impl Compose {
    pub fn cycle_type(&mut self) {
        let all = EntryType::ALL;
        let idx = all.iter().position(|t| *t == self.entry_type).unwrap_or(0);
        self.entry_type = all[(idx + 1) % all.len()];
    }
}

/// Main application state
pub struct App {
    sync: SyncLayer<SlotKey>,
    pub project_id: i32,
    pub author: String,
    layout_config: LayoutConfig,

    // Derived graph, rebuilt when milestones, tasks or edges change
    pub graph: DependencyGraph,
    pub layout: Layout,

    // View state
    pub current_view: View,
    pub column: usize,
    pub rows: [usize; 3],
    pub detail_expanded: bool,
    pub timeline_scroll: usize,

    // Timeline filters
    pub type_filter: Option<EntryType>,
    pub author_filter: Option<String>,
    pub milestone_filter: Option<i32>,

    // DAG view state
    pub dag_offset_x: f64,
    pub dag_offset_y: f64,
    pub dag_zoom: f64,

    // Overlays
    pub compose: Option<Compose>,
    pub show_help: bool,

    pub refresh_shown_at: Option<Instant>,
    pub status_message: Option<(String, Instant)>,
}

impl App {
    pub fn new(db: Database, config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let feed = ChangeFeed::start(db.path(), config.watch)?;
        let project_id = db
            .default_project()?
            .map(|p| p.id)
            .unwrap_or(config.gateway.default_project_id);
        let sync = SyncLayer::new(db, feed, config.watch.poll_interval())?;
        Ok(Self::with_sync(sync, project_id, config.graph))
    }

    pub fn with_sync(sync: SyncLayer<SlotKey>, project_id: i32, layout_config: LayoutConfig) -> Self {
        let author = std::env::var("AGENTBOARD_AUTHOR")
            .or_else(|_| std::env::var("USER"))
            .unwrap_or_else(|_| "Human".to_string());

        let mut app = Self {
            sync,
            project_id,
            author,
            layout_config,
            graph: DependencyGraph::default(),
            layout: Layout::default(),
            current_view: View::Board,
            column: 0,
            rows: [0; 3],
            detail_expanded: false,
            timeline_scroll: 0,
            type_filter: None,
            author_filter: None,
            milestone_filter: None,
            dag_offset_x: 0.0,
            dag_offset_y: 0.0,
            dag_zoom: 1.0,
            compose: None,
            show_help: false,
            refresh_shown_at: None,
            status_message: None,
        };
        app.watch_project();
        app
    }

    /// Point every project-scoped slot at the current project
    fn watch_project(&mut self) {
        let project_id = self.project_id;
        self.sync.watch(SlotKey::Projects, Query::Projects);
        self.sync.watch(
            SlotKey::Milestones,
            Query::Milestones(MilestoneFilter {
                project_id: Some(project_id),
                status: None,
            }),
        );
        self.sync.watch(SlotKey::Tasks, Query::ProjectTasks { project_id });
        self.sync.watch(SlotKey::Dependencies, Query::Dependencies { project_id });
        self.sync.watch(
            SlotKey::Timeline,
            Query::ProjectDialogue {
                project_id,
                limit: TIMELINE_LIMIT,
            },
        );
        self.sync.unwatch(&SlotKey::Detail);
        self.rows = [0; 3];
        self.milestone_filter = None;
    }

    /// Drain finished sync work; returns true when anything visible changed
    pub fn pump(&mut self) -> bool {
        let events = self.sync.pump();
        self.apply_sync_events(events)
    }

    /// Block until in-flight work lands. Used at startup and in tests.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let events = self.sync.settle(timeout);
        self.apply_sync_events(events)
    }

    fn apply_sync_events(&mut self, events: Vec<SyncEvent<SlotKey>>) -> bool {
        let mut changed = false;
        let mut rebuild = false;
        for event in events {
            changed = true;
            match event {
                SyncEvent::Updated(key) => {
                    if matches!(key, SlotKey::Milestones | SlotKey::Tasks | SlotKey::Dependencies) {
                        rebuild = true;
                    }
                }
                SyncEvent::FetchFailed { key, error } => {
                    self.set_status(format!("Refresh of {:?} failed: {}", key, error));
                }
                SyncEvent::MutationApplied { description } => {
                    self.set_status(format!("Saved: {}", description));
                }
                SyncEvent::MutationFailed { description, error } => {
                    self.set_status(format!("Failed to {}: {}", description, error));
                }
            }
        }
        if rebuild {
            self.rebuild_graph();
            self.show_refresh_indicator();
        }
        if changed {
            self.clamp_selection();
            self.watch_detail();
        }
        changed
    }

    fn rebuild_graph(&mut self) {
        self.graph = DependencyGraph::build(self.milestones(), self.dependencies(), self.tasks());
        self.layout = self.graph.layout(&self.layout_config);
    }

    /// Keep the detail slot pointed at the selected milestone
    fn watch_detail(&mut self) {
        if !self.detail_expanded {
            return;
        }
        if let Some(milestone_id) = self.selected_milestone().map(|m| m.id) {
            self.sync.watch(SlotKey::Detail, Query::MilestoneDialogue { milestone_id });
        }
    }

    // ========================================================================
    // Cached data
    // ========================================================================

    pub fn projects(&self) -> &[Project] {
        self.sync
            .get(&SlotKey::Projects)
            .and_then(QueryResult::as_projects)
            .unwrap_or_default()
    }

    pub fn project_name(&self) -> &str {
        self.projects()
            .iter()
            .find(|p| p.id == self.project_id)
            .map(|p| p.name.as_str())
            .unwrap_or("?")
    }

    pub fn milestones(&self) -> &[Milestone] {
        self.sync
            .get(&SlotKey::Milestones)
            .and_then(QueryResult::as_milestones)
            .unwrap_or_default()
    }

    pub fn tasks(&self) -> &[Task] {
        self.sync
            .get(&SlotKey::Tasks)
            .and_then(QueryResult::as_tasks)
            .unwrap_or_default()
    }

    pub fn dependencies(&self) -> &[DependencyEdge] {
        self.sync
            .get(&SlotKey::Dependencies)
            .and_then(QueryResult::as_dependencies)
            .unwrap_or_default()
    }

    /// Dialogue of the milestone shown in the detail panel
    pub fn detail_dialogue(&self) -> &[DialogueEntry] {
        self.sync
            .get(&SlotKey::Detail)
            .and_then(QueryResult::as_dialogue)
            .unwrap_or_default()
    }

    /// Project dialogue after the timeline filters
    pub fn timeline(&self) -> Vec<&DialogueWithMilestone> {
        self.sync
            .get(&SlotKey::Timeline)
            .and_then(QueryResult::as_project_dialogue)
            .unwrap_or_default()
            .iter()
            .filter(|d| self.type_filter.map_or(true, |t| d.entry.entry_type == t))
            .filter(|d| self.author_filter.as_ref().map_or(true, |a| &d.entry.author == a))
            .filter(|d| self.milestone_filter.map_or(true, |m| d.entry.milestone_id == m))
            .collect()
    }

    /// Distinct authors in the timeline, sorted
    pub fn authors(&self) -> Vec<String> {
        let mut authors: Vec<String> = self
            .sync
            .get(&SlotKey::Timeline)
            .and_then(QueryResult::as_project_dialogue)
            .unwrap_or_default()
            .iter()
            .map(|d| d.entry.author.clone())
            .collect();
        authors.sort();
        authors.dedup();
        authors
    }

    pub fn column_status(column: usize) -> MilestoneStatus {
        MilestoneStatus::ALL[column.min(MilestoneStatus::ALL.len() - 1)]
    }

    /// Milestones in one board column, in priority order
    pub fn column_items(&self, column: usize) -> Vec<&Milestone> {
        let status = Self::column_status(column);
        self.milestones().iter().filter(|m| m.status == status).collect()
    }

    pub fn tasks_for(&self, milestone_id: i32) -> Vec<&Task> {
        self.tasks().iter().filter(|t| t.milestone_id == milestone_id).collect()
    }

    pub fn selected_milestone(&self) -> Option<&Milestone> {
        self.column_items(self.column).get(self.rows[self.column]).copied()
    }

    // ========================================================================
    // Board navigation
    // ========================================================================

    fn clamp_selection(&mut self) {
        for column in 0..3 {
            let len = self.column_items(column).len();
            self.rows[column] = self.rows[column].min(len.saturating_sub(1));
        }
    }

    pub fn move_up(&mut self) {
        let row = &mut self.rows[self.column];
        *row = row.saturating_sub(1);
        self.watch_detail();
    }

    pub fn move_down(&mut self) {
        let len = self.column_items(self.column).len();
        if self.rows[self.column] + 1 < len {
            self.rows[self.column] += 1;
        }
        self.watch_detail();
    }

    pub fn move_left(&mut self) {
        self.column = self.column.saturating_sub(1);
        self.watch_detail();
    }

    pub fn move_right(&mut self) {
        self.column = (self.column + 1).min(2);
        self.watch_detail();
    }

    pub fn toggle_detail(&mut self) {
        self.detail_expanded = !self.detail_expanded;
        if self.detail_expanded {
            self.watch_detail();
        } else {
            self.sync.unwatch(&SlotKey::Detail);
        }
    }

    pub fn toggle_view(&mut self) {
        self.current_view = self.current_view.next();
    }

    /// Switch to the next project in the list
    pub fn cycle_project(&mut self) {
        let projects = self.projects();
        if projects.is_empty() {
            return;
        }
        let idx = projects.iter().position(|p| p.id == self.project_id);
        let next = match idx {
            Some(i) => projects[(i + 1) % projects.len()].id,
            None => projects[0].id,
        };
        if next != self.project_id {
            self.project_id = next;
            self.watch_project();
            self.set_status(format!("Project: {}", self.project_name()));
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Advance the selected milestone to the next status column
    pub fn cycle_selected_status(&mut self) {
        let Some(milestone) = self.selected_milestone() else {
            return;
        };
        let id = milestone.id;
        let next = milestone.status.next();
        self.sync.mutate(Mutation::UpdateMilestone {
            id,
            patch: MilestonePatch::status(next),
        });
    }

    pub fn start_note(&mut self) {
        if let Some(id) = self.selected_milestone().map(|m| m.id) {
            self.compose = Some(Compose {
                target: ComposeTarget::Milestone(id),
                entry_type: EntryType::Note,
                buffer: String::new(),
            });
        }
    }

    pub fn start_broadcast(&mut self) {
        self.compose = Some(Compose {
            target: ComposeTarget::Broadcast,
            entry_type: EntryType::Note,
            buffer: String::new(),
        });
    }

    /// Send the composed entry. Empty (whitespace-only) text is discarded.
    pub fn submit_compose(&mut self) {
        let Some(compose) = self.compose.take() else {
            return;
        };
        let content = compose.buffer.trim();
        if content.is_empty() {
            return;
        }
        let mutation = match compose.target {
            ComposeTarget::Milestone(id) => Mutation::LogDialogue(DialogueDraft::new(
                id,
                self.author.clone(),
                compose.entry_type,
                content,
            )),
            ComposeTarget::Broadcast => Mutation::Broadcast {
                project_id: self.project_id,
                author: self.author.clone(),
                entry_type: compose.entry_type,
                content: content.to_string(),
            },
        };
        self.sync.mutate(mutation);
    }

    pub fn refresh(&mut self) {
        self.sync.refresh_all();
        self.set_status("Refreshing".to_string());
    }

    // ========================================================================
    // Timeline filters
    // ========================================================================

    pub fn cycle_type_filter(&mut self) {
        self.type_filter = match self.type_filter {
            None => Some(EntryType::ALL[0]),
            Some(current) => {
                let idx = EntryType::ALL.iter().position(|t| *t == current);
                match idx {
                    Some(i) if i + 1 < EntryType::ALL.len() => Some(EntryType::ALL[i + 1]),
                    _ => None,
                }
            }
        };
        self.timeline_scroll = 0;
    }

    pub fn cycle_author_filter(&mut self) {
        let authors = self.authors();
        self.author_filter = match &self.author_filter {
            None => authors.first().cloned(),
            Some(current) => {
                let idx = authors.iter().position(|a| a == current);
                match idx {
                    Some(i) if i + 1 < authors.len() => Some(authors[i + 1].clone()),
                    _ => None,
                }
            }
        };
        self.timeline_scroll = 0;
    }

    pub fn cycle_milestone_filter(&mut self) {
        let ids: Vec<i32> = self.milestones().iter().map(|m| m.id).collect();
        self.milestone_filter = match self.milestone_filter {
            None => ids.first().copied(),
            Some(current) => {
                let idx = ids.iter().position(|id| *id == current);
                match idx {
                    Some(i) if i + 1 < ids.len() => Some(ids[i + 1]),
                    _ => None,
                }
            }
        };
        self.timeline_scroll = 0;
    }

    pub fn clear_filters(&mut self) {
        self.type_filter = None;
        self.author_filter = None;
        self.milestone_filter = None;
        self.timeline_scroll = 0;
    }

    pub fn scroll_timeline(&mut self, delta: isize) {
        let len = self.timeline().len();
        let next = self.timeline_scroll.saturating_add_signed(delta);
        self.timeline_scroll = next.min(len.saturating_sub(1));
    }

    // ========================================================================
    // DAG navigation
    // ========================================================================

    pub fn dag_pan(&mut self, dx: f64, dy: f64) {
        self.dag_offset_x += dx * 50.0 / self.dag_zoom;
        self.dag_offset_y += dy * 50.0 / self.dag_zoom;
    }

    pub fn dag_zoom_in(&mut self) {
        self.dag_zoom = (self.dag_zoom * 1.2).min(3.0);
    }

    pub fn dag_zoom_out(&mut self) {
        self.dag_zoom = (self.dag_zoom / 1.2).max(0.2);
    }

    pub fn dag_reset_zoom(&mut self) {
        self.dag_zoom = 1.0;
        self.dag_offset_x = 0.0;
        self.dag_offset_y = 0.0;
    }

    // ========================================================================
    // Misc
    // ========================================================================

    pub fn handle_mouse(&mut self, event: MouseEvent) {
        match (self.current_view, event.kind) {
            (View::Dialogue, MouseEventKind::ScrollDown) => self.scroll_timeline(1),
            (View::Dialogue, MouseEventKind::ScrollUp) => self.scroll_timeline(-1),
            (View::Dag, MouseEventKind::ScrollDown) => self.dag_zoom_out(),
            (View::Dag, MouseEventKind::ScrollUp) => self.dag_zoom_in(),
            (_, MouseEventKind::ScrollDown) => self.move_down(),
            (_, MouseEventKind::ScrollUp) => self.move_up(),
            _ => {}
        }
    }

    pub fn show_refresh_indicator(&mut self) {
        self.refresh_shown_at = Some(Instant::now());
    }

    pub fn set_status(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    pub fn watch_backend(&self) -> crate::watch::ActiveBackend {
        self.sync.feed().backend()
    }

    /// Periodic tick for expiring indicators
    pub fn tick(&mut self) {
        if let Some(shown_at) = self.refresh_shown_at {
            if shown_at.elapsed().as_secs() >= 2 {
                self.refresh_shown_at = None;
            }
        }
        if let Some((_, shown_at)) = &self.status_message {
            if shown_at.elapsed().as_secs() >= 3 {
                self.status_message = None;
            }
        }
    }
}
