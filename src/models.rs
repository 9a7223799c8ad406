//! Board models: Diesel rows, typed statuses, drafts and patches
//!
//! Statuses are stored as TEXT (guarded by CHECK constraints in the schema) and
//! surface in Rust as closed enums, so nothing outside this module ever compares
//! raw status strings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};

use crate::schema::*;

/// Error returned when a status or entry-type string is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}' (expected one of: {})", .expected.join(", "))]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static [&'static str],
}

/// Declares a closed string enum that round-trips through a TEXT column.
/// Exactly one variant carries `#[default]`.
macro_rules! text_enum {
    (
        $(#[$meta:meta])* $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, AsExpression, FromSqlRow,
        )]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                        expected: Self::NAMES,
                    }),
                }
            }
        }

        impl ToSql<Text, Sqlite> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.as_str());
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Sqlite> for $name {
            fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                Ok(text.parse::<$name>()?)
            }
        }
    };
}

text_enum! {
    /// Lifecycle of a milestone
    MilestoneStatus, "milestone status" {
        #[default]
        NotStarted => "not_started",
        InProgress => "in_progress",
        Done => "done",
    }
}

text_enum! {
    /// Lifecycle of a task
    TaskStatus, "task status" {
        #[default]
        Pending => "pending",
        InProgress => "in_progress",
        Done => "done",
    }
}

text_enum! {
    /// Kind of a dialogue entry
    EntryType, "entry type" {
        Decision => "decision",
        Progress => "progress",
        Blocker => "blocker",
        #[default]
        Note => "note",
    }
}

impl MilestoneStatus {
    /// Next status in the board's column order, wrapping around
    pub fn next(self) -> Self {
        match self {
            MilestoneStatus::NotStarted => MilestoneStatus::InProgress,
            MilestoneStatus::InProgress => MilestoneStatus::Done,
            MilestoneStatus::Done => MilestoneStatus::NotStarted,
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Queryable project
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = projects)]
pub struct Project {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

/// Queryable milestone
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = milestones)]
pub struct Milestone {
    pub id: i32,
    pub project_id: i32,
    pub name: String,
    pub status: MilestoneStatus,
    pub priority: i32,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: String,
}

/// "milestone_id cannot start until depends_on_milestone_id is done"
///
/// Advisory only: the store never checks statuses against it.
#[derive(
    Queryable, Selectable, Insertable, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[diesel(table_name = milestone_dependencies)]
pub struct DependencyEdge {
    pub milestone_id: i32,
    pub depends_on_milestone_id: i32,
}

/// Queryable task
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: i32,
    pub milestone_id: i32,
    pub title: String,
    pub status: TaskStatus,
    pub assignee: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// Queryable dialogue entry
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = dialogue_entries)]
pub struct DialogueEntry {
    pub id: i32,
    pub milestone_id: i32,
    pub author: String,
    pub entry_type: EntryType,
    pub content: String,
    pub created_at: String,
}

/// Dialogue entry joined with the name of its milestone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueWithMilestone {
    #[serde(flatten)]
    pub entry: DialogueEntry,
    pub milestone_name: String,
}

/// Applied migration ledger row
#[derive(Queryable, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name = _migrations)]
pub struct AppliedMigration {
    pub id: i32,
    pub name: String,
    pub applied_at: String,
}

// ============================================================================
// Insertables
// ============================================================================

#[derive(Insertable)]
#[diesel(table_name = projects)]
pub(crate) struct NewProject<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub created_at: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = milestones)]
pub(crate) struct NewMilestone<'a> {
    pub project_id: i32,
    pub name: &'a str,
    pub status: MilestoneStatus,
    pub priority: i32,
    pub owner: Option<&'a str>,
    pub description: Option<&'a str>,
    pub start_date: Option<&'a str>,
    pub end_date: Option<&'a str>,
    pub created_at: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
pub(crate) struct NewTask<'a> {
    pub milestone_id: i32,
    pub title: &'a str,
    pub status: TaskStatus,
    pub assignee: Option<&'a str>,
    pub created_at: &'a str,
    pub completed_at: Option<&'a str>,
}

#[derive(Insertable)]
#[diesel(table_name = dialogue_entries)]
pub(crate) struct NewDialogueEntry<'a> {
    pub milestone_id: i32,
    pub author: &'a str,
    pub entry_type: EntryType,
    pub content: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Drafts (caller input for creation)
// ============================================================================

/// Fields for a new milestone
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneDraft {
    pub project_id: i32,
    pub name: String,
    pub status: MilestoneStatus,
    pub priority: i32,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl MilestoneDraft {
    pub fn new(project_id: i32, name: impl Into<String>) -> Self {
        Self {
            project_id,
            name: name.into(),
            status: MilestoneStatus::default(),
            priority: 0,
            owner: None,
            description: None,
            start_date: None,
            end_date: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: MilestoneStatus) -> Self {
        self.status = status;
        self
    }
}

/// Fields for a new task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub milestone_id: i32,
    pub title: String,
    pub status: TaskStatus,
    pub assignee: Option<String>,
}

impl TaskDraft {
    pub fn new(milestone_id: i32, title: impl Into<String>) -> Self {
        Self {
            milestone_id,
            title: title.into(),
            status: TaskStatus::default(),
            assignee: None,
        }
    }
}

/// Fields for a new dialogue entry
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueDraft {
    pub milestone_id: i32,
    pub author: String,
    pub entry_type: EntryType,
    pub content: String,
}

impl DialogueDraft {
    pub fn new(
        milestone_id: i32,
        author: impl Into<String>,
        entry_type: EntryType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            milestone_id,
            author: author.into(),
            entry_type,
            content: content.into(),
        }
    }
}

// ============================================================================
// Patches (sparse updates over a closed field set)
// ============================================================================

/// Sparse milestone update. `None` fields are left untouched.
///
/// `project_id` and `created_at` are deliberately absent: both are immutable.
#[derive(AsChangeset, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = milestones)]
pub struct MilestonePatch {
    pub name: Option<String>,
    pub status: Option<MilestoneStatus>,
    pub priority: Option<i32>,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl MilestonePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.owner.is_none()
            && self.description.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    pub fn status(status: MilestoneStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Sparse task update. `completed_at` can be supplied but never cleared.
#[derive(AsChangeset, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = tasks)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub completed_at: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.assignee.is_none()
            && self.completed_at.is_none()
    }

    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MilestoneFilter {
    pub project_id: Option<i32>,
    pub status: Option<MilestoneStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TaskFilter {
    pub milestone_id: Option<i32>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
}

// ============================================================================
// Summaries
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneCounts {
    pub not_started: i64,
    pub in_progress: i64,
    pub done: i64,
}

impl MilestoneCounts {
    pub fn record(&mut self, status: MilestoneStatus) {
        match status {
            MilestoneStatus::NotStarted => self.not_started += 1,
            MilestoneStatus::InProgress => self.in_progress += 1,
            MilestoneStatus::Done => self.done += 1,
        }
    }

    pub fn total(&self) -> i64 {
        self.not_started + self.in_progress + self.done
    }
}

/// Aggregate view of one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub project_id: i32,
    pub milestones_by_status: MilestoneCounts,
    pub total_milestones: i64,
    /// Only statuses with at least one task appear
    pub task_counts: BTreeMap<TaskStatus, i64>,
    pub recent_activity: Vec<DialogueWithMilestone>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in MilestoneStatus::ALL {
            assert_eq!(status.as_str().parse::<MilestoneStatus>().unwrap(), *status);
        }
        for status in TaskStatus::ALL {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn test_defaults_match_new_rows() {
        assert_eq!(MilestoneStatus::default(), MilestoneStatus::NotStarted);
        assert_eq!(TaskStatus::default(), TaskStatus::Pending);
        assert_eq!(EntryType::default(), EntryType::Note);
    }

    #[test]
    fn test_parse_rejects_unknown_value() {
        let err = "blocked".parse::<TaskStatus>().unwrap_err();
        assert_eq!(err.value, "blocked");
        assert!(err.to_string().contains("pending, in_progress, done"));
    }

    #[test]
    fn test_enums_serialize_snake_case() {
        let json = serde_json::to_string(&MilestoneStatus::NotStarted).unwrap();
        assert_eq!(json, "\"not_started\"");
        let parsed: EntryType = serde_json::from_str("\"blocker\"").unwrap();
        assert_eq!(parsed, EntryType::Blocker);
    }

    #[test]
    fn test_empty_patches() {
        assert!(MilestonePatch::default().is_empty());
        assert!(!MilestonePatch::status(MilestoneStatus::Done).is_empty());
        assert!(TaskPatch::default().is_empty());
        assert!(!TaskPatch {
            assignee: Some("kelso".to_string()),
            ..TaskPatch::default()
        }
        .is_empty());
    }

    #[test]
    fn test_milestone_counts_total() {
        let mut counts = MilestoneCounts::default();
        counts.record(MilestoneStatus::Done);
        counts.record(MilestoneStatus::Done);
        counts.record(MilestoneStatus::InProgress);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.done, 2);
    }

    #[test]
    fn test_status_cycle() {
        let mut s = MilestoneStatus::NotStarted;
        for _ in 0..3 {
            s = s.next();
        }
        assert_eq!(s, MilestoneStatus::NotStarted);
    }

    #[test]
    fn test_dialogue_with_milestone_flattens() {
        let entry = DialogueWithMilestone {
            entry: DialogueEntry {
                id: 7,
                milestone_id: 2,
                author: "Cox".to_string(),
                entry_type: EntryType::Decision,
                content: "Ship it".to_string(),
                created_at: "2026-01-01T00:00:00.000Z".to_string(),
            },
            milestone_name: "Launch".to_string(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["entry_type"], "decision");
        assert_eq!(value["milestone_name"], "Launch");
    }
}
