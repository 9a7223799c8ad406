//! agentboard - a shared project board for humans and AI agents
//!
//! One SQLite file holds projects, milestones, milestone dependencies, tasks and
//! a dialogue log. Humans work the board from a terminal dashboard; agents work
//! it through a schema-validated tool catalog served over stdio JSON-RPC. Every
//! writer opens the same file, and a change feed tells readers when to refetch.
//!
//! # Entities
//!
//! | Entity | Notes |
//! |--------|-------|
//! | project | top-level container; project 1 always exists |
//! | milestone | `not_started` → `in_progress` → `done`, with priority and owner |
//! | dependency | "milestone needs milestone"; advisory, may form cycles |
//! | task | `pending` / `in_progress` / `done`; completion time stamped once |
//! | dialogue | `decision` / `progress` / `blocker` / `note` entries per milestone |
//!
//! # Quick Start
//!
//! ```no_run
//! use agentboard::{Database, MilestoneDraft, TaskDraft};
//!
//! let db = Database::open_at("board.db").unwrap();
//!
//! let design = db.create_milestone(&MilestoneDraft::new(1, "Design")).unwrap();
//! let build = db.create_milestone(&MilestoneDraft::new(1, "Build")).unwrap();
//! db.add_dependency(build.id, design.id).unwrap();
//! db.create_task(&TaskDraft::new(build.id, "Write the parser")).unwrap();
//!
//! let status = db.project_status(1, 10).unwrap();
//! println!("{} milestones", status.total_milestones);
//! ```

pub mod config;
pub mod db;
pub mod export;
pub mod gateway;
pub mod graph;
pub mod models;
pub mod schema;
pub mod serve;
pub mod sync;
pub mod tui;
pub mod watch;

pub use config::Config;
pub use db::{Database, DbError, EdgePolicy};
pub use export::{graph_to_dot, graph_to_outline, DotConfig};
pub use gateway::{Tool, ToolError, ToolGateway};
pub use graph::{DependencyGraph, Layout, LayoutConfig};
pub use models::{
    DependencyEdge, DialogueDraft, DialogueEntry, DialogueWithMilestone, EntryType, Milestone,
    MilestoneDraft, MilestoneFilter, MilestonePatch, MilestoneStatus, Project, ProjectStatus, Task,
    TaskDraft, TaskFilter, TaskPatch, TaskStatus,
};
pub use sync::{Mutation, Query, QueryResult, SyncEvent, SyncLayer};
pub use watch::{ChangeFeed, ChangeSignal, WatchBackend, WatchOptions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Core types are reachable from the crate root
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.edge_policy(), EdgePolicy::Permissive);
        assert_eq!(Tool::ALL.len(), 14);
        assert_eq!(WatchOptions::default().backend, WatchBackend::Auto);
    }
}
