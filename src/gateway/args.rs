//! Typed argument shapes for each tool
//!
//! Every struct rejects unknown fields, and serde's integer parsing rejects
//! floats, strings and out-of-range numbers, so a call that reaches the store
//! has already been fully validated.

use serde::Deserialize;

use crate::models::{
    DialogueDraft, EntryType, MilestoneDraft, MilestoneFilter, MilestonePatch, MilestoneStatus,
    TaskDraft, TaskFilter, TaskPatch, TaskStatus,
};

pub(crate) fn default_project_id() -> i32 {
    1
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CreateProjectArgs {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CreateMilestoneArgs {
    #[serde(default = "default_project_id")]
    pub project_id: i32,
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: MilestoneStatus,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl From<CreateMilestoneArgs> for MilestoneDraft {
    fn from(args: CreateMilestoneArgs) -> Self {
        MilestoneDraft {
            project_id: args.project_id,
            name: args.name,
            status: args.status,
            priority: args.priority,
            owner: args.owner,
            description: args.description,
            start_date: args.start_date,
            end_date: args.end_date,
        }
    }
}

/// Absent and `null` fields are both left untouched
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UpdateMilestoneArgs {
    pub id: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<MilestoneStatus>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl UpdateMilestoneArgs {
    pub fn into_parts(self) -> (i32, MilestonePatch) {
        let patch = MilestonePatch {
            name: self.name,
            status: self.status,
            priority: self.priority,
            owner: self.owner,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
        };
        (self.id, patch)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ListMilestonesArgs {
    #[serde(default = "default_project_id")]
    pub project_id: i32,
    #[serde(default)]
    pub status: Option<MilestoneStatus>,
}

impl From<ListMilestonesArgs> for MilestoneFilter {
    fn from(args: ListMilestonesArgs) -> Self {
        MilestoneFilter {
            project_id: Some(args.project_id),
            status: args.status,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AddDependencyArgs {
    pub milestone_id: i32,
    pub depends_on_milestone_id: i32,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectArgs {
    #[serde(default = "default_project_id")]
    pub project_id: i32,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CreateTaskArgs {
    pub milestone_id: i32,
    pub title: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl From<CreateTaskArgs> for TaskDraft {
    fn from(args: CreateTaskArgs) -> Self {
        TaskDraft {
            milestone_id: args.milestone_id,
            title: args.title,
            status: args.status,
            assignee: args.assignee,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UpdateTaskArgs {
    pub id: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignee: Option<String>,
}

impl UpdateTaskArgs {
    pub fn into_parts(self) -> (i32, TaskPatch) {
        let patch = TaskPatch {
            title: self.title,
            status: self.status,
            assignee: self.assignee,
            completed_at: None,
        };
        (self.id, patch)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AssignTaskArgs {
    pub id: i32,
    pub assignee: String,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ListTasksArgs {
    #[serde(default)]
    pub milestone_id: Option<i32>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignee: Option<String>,
}

impl From<ListTasksArgs> for TaskFilter {
    fn from(args: ListTasksArgs) -> Self {
        TaskFilter {
            milestone_id: args.milestone_id,
            status: args.status,
            assignee: args.assignee,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LogDialogueArgs {
    pub milestone_id: i32,
    pub author: String,
    pub entry_type: EntryType,
    pub content: String,
}

impl From<LogDialogueArgs> for DialogueDraft {
    fn from(args: LogDialogueArgs) -> Self {
        DialogueDraft::new(args.milestone_id, args.author, args.entry_type, args.content)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MilestoneDialogueArgs {
    pub milestone_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_milestone_defaults() {
        let args: CreateMilestoneArgs = serde_json::from_value(json!({"name": "Alpha"})).unwrap();
        assert_eq!(args.project_id, 1);
        assert_eq!(args.priority, 0);
        assert_eq!(args.status, MilestoneStatus::NotStarted);
        assert!(args.owner.is_none());
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(serde_json::from_value::<CreateMilestoneArgs>(json!({"name": 5})).is_err());
        assert!(serde_json::from_value::<CreateMilestoneArgs>(json!({"name": "a", "priority": "high"})).is_err());
        assert!(serde_json::from_value::<CreateMilestoneArgs>(json!({"name": "a", "priority": 1.5})).is_err());
        assert!(serde_json::from_value::<AddDependencyArgs>(json!({"milestone_id": "1", "depends_on_milestone_id": 2})).is_err());
    }

    #[test]
    fn test_rejects_unknown_enum_and_fields() {
        assert!(serde_json::from_value::<CreateTaskArgs>(json!({"milestone_id": 1, "title": "t", "status": "blocked"})).is_err());
        assert!(serde_json::from_value::<LogDialogueArgs>(json!({
            "milestone_id": 1, "author": "a", "entry_type": "rant", "content": "c"
        }))
        .is_err());
        assert!(serde_json::from_value::<ListTasksArgs>(json!({"milestone": 1})).is_err());
    }

    #[test]
    fn test_rejects_missing_required() {
        assert!(serde_json::from_value::<AssignTaskArgs>(json!({"id": 1})).is_err());
        assert!(serde_json::from_value::<CreateProjectArgs>(json!({})).is_err());
    }

    #[test]
    fn test_update_args_strip_absent_fields() {
        let args: UpdateMilestoneArgs =
            serde_json::from_value(json!({"id": 3, "status": "done", "owner": null})).unwrap();
        let (id, patch) = args.into_parts();
        assert_eq!(id, 3);
        assert_eq!(patch, MilestonePatch::status(MilestoneStatus::Done));
    }
}
