//! Tool gateway: the fixed catalog of operations exposed to agent callers
//!
//! Each tool deserializes its arguments into a typed struct (see [`args`]),
//! substitutes defaults, and forwards to exactly one store operation. Nothing
//! touches the store until the arguments have parsed.

pub mod args;
pub mod server;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::GatewayConfig;
use crate::db::{Database, DbError};
use crate::models::{EntryType, MilestoneStatus, TaskPatch, TaskStatus};

use args::*;

/// Bumped whenever a tool is added, removed or changes shape
pub const CATALOG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },
    #[error(transparent)]
    Store(#[from] DbError),
}

/// Every tool in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    CreateProject,
    ListProjects,
    CreateMilestone,
    UpdateMilestone,
    ListMilestones,
    AddDependency,
    ListDependencies,
    CreateTask,
    UpdateTask,
    AssignTask,
    ListTasks,
    LogDialogue,
    GetMilestoneDialogue,
    GetProjectStatus,
}

impl Tool {
    pub const ALL: &'static [Tool] = &[
        Tool::CreateProject,
        Tool::ListProjects,
        Tool::CreateMilestone,
        Tool::UpdateMilestone,
        Tool::ListMilestones,
        Tool::AddDependency,
        Tool::ListDependencies,
        Tool::CreateTask,
        Tool::UpdateTask,
        Tool::AssignTask,
        Tool::ListTasks,
        Tool::LogDialogue,
        Tool::GetMilestoneDialogue,
        Tool::GetProjectStatus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::CreateProject => "create_project",
            Tool::ListProjects => "list_projects",
            Tool::CreateMilestone => "create_milestone",
            Tool::UpdateMilestone => "update_milestone",
            Tool::ListMilestones => "list_milestones",
            Tool::AddDependency => "add_dependency",
            Tool::ListDependencies => "list_dependencies",
            Tool::CreateTask => "create_task",
            Tool::UpdateTask => "update_task",
            Tool::AssignTask => "assign_task",
            Tool::ListTasks => "list_tasks",
            Tool::LogDialogue => "log_dialogue",
            Tool::GetMilestoneDialogue => "get_milestone_dialogue",
            Tool::GetProjectStatus => "get_project_status",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::CreateProject => "Create a new project on the board",
            Tool::ListProjects => "List all projects",
            Tool::CreateMilestone => "Create a new milestone in the project board",
            Tool::UpdateMilestone => "Update an existing milestone. Only provided fields change.",
            Tool::ListMilestones => "List milestones of a project, optionally filtered by status",
            Tool::AddDependency => "Add a dependency edge: milestone depends on another milestone",
            Tool::ListDependencies => "List dependency edges among a project's milestones",
            Tool::CreateTask => "Create a task within a milestone",
            Tool::UpdateTask => "Update a task's title, status or assignee",
            Tool::AssignTask => "Shorthand to assign a task to a team member",
            Tool::ListTasks => "List tasks, filtered by milestone, status, or assignee",
            Tool::LogDialogue => {
                "Log a dialogue entry (decision, progress, blocker, or note) on a milestone"
            }
            Tool::GetMilestoneDialogue => "Get full dialogue history for a milestone, newest first",
            Tool::GetProjectStatus => {
                "Get project summary: milestone counts by status, task counts, recent activity"
            }
        }
    }

    /// JSON schema of the tool's arguments
    pub fn input_schema(self) -> Value {
        let int = |d: &str| json!({"type": "integer", "description": d});
        let text = |d: &str| json!({"type": "string", "description": d});
        let milestone_status = json!({"type": "string", "enum": MilestoneStatus::NAMES});
        let task_status = json!({"type": "string", "enum": TaskStatus::NAMES});

        let (properties, required): (Value, &[&str]) = match self {
            Tool::CreateProject => (
                json!({"name": text("Project name"), "description": text("Project description")}),
                &["name"],
            ),
            Tool::ListProjects => (json!({}), &[]),
            Tool::CreateMilestone => (
                json!({
                    "project_id": {"type": "integer", "default": 1, "description": "Project ID (defaults to 1)"},
                    "name": text("Milestone name"),
                    "priority": {"type": "integer", "default": 0, "description": "Priority (0=P0 highest)"},
                    "owner": text("Owner/team member"),
                    "description": text("Description (markdown)"),
                    "status": {"type": "string", "enum": MilestoneStatus::NAMES, "default": "not_started"},
                    "start_date": text("Start date (ISO)"),
                    "end_date": text("End date (ISO)"),
                }),
                &["name"],
            ),
            Tool::UpdateMilestone => (
                json!({
                    "id": int("Milestone ID"),
                    "name": {"type": "string"},
                    "status": milestone_status,
                    "priority": {"type": "integer"},
                    "owner": {"type": "string"},
                    "description": {"type": "string"},
                    "start_date": {"type": "string"},
                    "end_date": {"type": "string"},
                }),
                &["id"],
            ),
            Tool::ListMilestones => (
                json!({
                    "project_id": {"type": "integer", "default": 1},
                    "status": milestone_status,
                }),
                &[],
            ),
            Tool::AddDependency => (
                json!({
                    "milestone_id": int("The milestone that depends on another"),
                    "depends_on_milestone_id": int("The prerequisite milestone"),
                }),
                &["milestone_id", "depends_on_milestone_id"],
            ),
            Tool::ListDependencies | Tool::GetProjectStatus => (
                json!({"project_id": {"type": "integer", "default": 1}}),
                &[],
            ),
            Tool::CreateTask => (
                json!({
                    "milestone_id": int("Parent milestone ID"),
                    "title": text("Task title"),
                    "assignee": text("Assigned team member"),
                    "status": {"type": "string", "enum": TaskStatus::NAMES, "default": "pending"},
                }),
                &["milestone_id", "title"],
            ),
            Tool::UpdateTask => (
                json!({
                    "id": int("Task ID"),
                    "title": {"type": "string"},
                    "status": task_status,
                    "assignee": {"type": "string"},
                }),
                &["id"],
            ),
            Tool::AssignTask => (
                json!({"id": int("Task ID"), "assignee": text("Team member name")}),
                &["id", "assignee"],
            ),
            Tool::ListTasks => (
                json!({
                    "milestone_id": {"type": "integer"},
                    "status": task_status,
                    "assignee": {"type": "string"},
                }),
                &[],
            ),
            Tool::LogDialogue => (
                json!({
                    "milestone_id": int("Milestone ID"),
                    "author": text("Author name (e.g. \"Cox\", \"Kelso\", \"Human\")"),
                    "entry_type": {"type": "string", "enum": EntryType::NAMES, "description": "Entry type"},
                    "content": text("Entry content (markdown supported)"),
                }),
                &["milestone_id", "author", "entry_type", "content"],
            ),
            Tool::GetMilestoneDialogue => (json!({"milestone_id": int("Milestone ID")}), &["milestone_id"]),
        };

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Catalog entry as advertised to callers
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    Tool::ALL
        .iter()
        .map(|t| ToolDefinition {
            name: t.name(),
            description: t.description(),
            input_schema: t.input_schema(),
        })
        .collect()
}

/// Dispatches tool calls to the store
#[derive(Debug, Clone)]
pub struct ToolGateway {
    db: Database,
    config: GatewayConfig,
}

impl ToolGateway {
    pub fn new(db: Database) -> Self {
        Self::with_config(db, GatewayConfig::default())
    }

    pub fn with_config(db: Database, config: GatewayConfig) -> Self {
        Self { db, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Invoke a tool by name. `Value::Null` arguments count as `{}`.
    pub fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = Tool::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        debug!(tool = name, "tool call");
        self.invoke(tool, arguments)
    }

    pub fn invoke(&self, tool: Tool, arguments: Value) -> Result<Value, ToolError> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let db = &self.db;

        match tool {
            Tool::CreateProject => {
                let a: CreateProjectArgs = parse(tool, arguments)?;
                to_value(db.create_project(&a.name, a.description.as_deref())?)
            }
            Tool::ListProjects => {
                let _: NoArgs = parse(tool, arguments)?;
                to_value(db.list_projects()?)
            }
            Tool::CreateMilestone => {
                let a: CreateMilestoneArgs = parse(tool, self.with_default_project(arguments))?;
                to_value(db.create_milestone(&a.into())?)
            }
            Tool::UpdateMilestone => {
                let (id, patch) = parse::<UpdateMilestoneArgs>(tool, arguments)?.into_parts();
                to_value(db.update_milestone(id, &patch)?)
            }
            Tool::ListMilestones => {
                let a: ListMilestonesArgs = parse(tool, self.with_default_project(arguments))?;
                to_value(db.list_milestones(&a.into())?)
            }
            Tool::AddDependency => {
                let a: AddDependencyArgs = parse(tool, arguments)?;
                to_value(db.add_dependency(a.milestone_id, a.depends_on_milestone_id)?)
            }
            Tool::ListDependencies => {
                let a: ProjectArgs = parse(tool, self.with_default_project(arguments))?;
                to_value(db.list_dependencies(a.project_id)?)
            }
            Tool::CreateTask => {
                let a: CreateTaskArgs = parse(tool, arguments)?;
                to_value(db.create_task(&a.into())?)
            }
            Tool::UpdateTask => {
                let (id, patch) = parse::<UpdateTaskArgs>(tool, arguments)?.into_parts();
                to_value(db.update_task(id, &patch)?)
            }
            Tool::AssignTask => {
                let a: AssignTaskArgs = parse(tool, arguments)?;
                let patch = TaskPatch {
                    assignee: Some(a.assignee),
                    ..TaskPatch::default()
                };
                to_value(db.update_task(a.id, &patch)?)
            }
            Tool::ListTasks => {
                let a: ListTasksArgs = parse(tool, arguments)?;
                to_value(db.list_tasks(&a.into())?)
            }
            Tool::LogDialogue => {
                let a: LogDialogueArgs = parse(tool, arguments)?;
                to_value(db.log_dialogue(&a.into())?)
            }
            Tool::GetMilestoneDialogue => {
                let a: MilestoneDialogueArgs = parse(tool, arguments)?;
                to_value(db.milestone_dialogue(a.milestone_id)?)
            }
            Tool::GetProjectStatus => {
                let a: ProjectArgs = parse(tool, self.with_default_project(arguments))?;
                to_value(db.project_status(a.project_id, self.config.recent_activity_limit)?)
            }
        }
    }

    /// Fill `project_id` from config when the caller omitted it
    fn with_default_project(&self, mut arguments: Value) -> Value {
        if let Some(obj) = arguments.as_object_mut() {
            if !obj.contains_key("project_id") {
                obj.insert("project_id".to_string(), json!(self.config.default_project_id));
            }
        }
        arguments
    }
}

fn parse<T: serde::de::DeserializeOwned>(tool: Tool, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.name(),
        message: e.to_string(),
    })
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ToolError> {
    // Row types are plain data; serialization into a Value can't fail
    Ok(serde_json::to_value(value).unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gateway() -> (TempDir, ToolGateway) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("board.db")).unwrap();
        (dir, ToolGateway::new(db))
    }

    #[test]
    fn test_catalog_names_are_unique_and_resolvable() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), 14);
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(*tool));
        }
        let schema = Tool::LogDialogue.input_schema();
        assert_eq!(schema["required"].as_array().unwrap().len(), 4);
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn test_unknown_tool() {
        let (_dir, gw) = gateway();
        let err = gw.call("drop_tables", json!({})).unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[test]
    fn test_create_milestone_defaults_to_project_one() {
        let (_dir, gw) = gateway();
        let m = gw.call("create_milestone", json!({"name": "Alpha"})).unwrap();
        assert_eq!(m["project_id"], 1);
        assert_eq!(m["status"], "not_started");
        assert_eq!(m["priority"], 0);
    }

    #[test]
    fn test_configured_default_project() {
        let (_dir, gw) = gateway();
        let project = gw.call("create_project", json!({"name": "Second"})).unwrap();
        let pid = project["id"].as_i64().unwrap() as i32;
        let gw = ToolGateway::with_config(
            gw.database().clone(),
            GatewayConfig {
                default_project_id: pid,
                ..GatewayConfig::default()
            },
        );
        let m = gw.call("create_milestone", json!({"name": "Beta"})).unwrap();
        assert_eq!(m["project_id"], pid);
    }

    #[test]
    fn test_invalid_arguments_have_no_side_effects() {
        let (_dir, gw) = gateway();
        for bad in [
            json!({"name": "x", "priority": "high"}),
            json!({"name": "x", "status": "blocked"}),
            json!({"name": "x", "colour": "red"}),
            json!({"priority": 1}),
            json!({"name": "x", "priority": 2.5}),
        ] {
            let err = gw.call("create_milestone", bad).unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments { tool: "create_milestone", .. }));
        }
        let listed = gw.call("list_milestones", Value::Null).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_missing_parent_is_store_error() {
        let (_dir, gw) = gateway();
        let err = gw
            .call("create_task", json!({"milestone_id": 77, "title": "orphan"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::Store(DbError::ForeignKey(_))));
    }

    #[test]
    fn test_update_missing_returns_null() {
        let (_dir, gw) = gateway();
        let result = gw.call("update_milestone", json!({"id": 404, "name": "ghost"})).unwrap();
        assert!(result.is_null());
    }

    #[test]
    fn test_task_flow() {
        let (_dir, gw) = gateway();
        let m = gw.call("create_milestone", json!({"name": "M"})).unwrap();
        let mid = m["id"].clone();
        let t = gw.call("create_task", json!({"milestone_id": mid, "title": "t"})).unwrap();
        let tid = t["id"].clone();

        let assigned = gw.call("assign_task", json!({"id": tid, "assignee": "kelso"})).unwrap();
        assert_eq!(assigned["assignee"], "kelso");
        assert_eq!(assigned["status"], "pending");

        let done = gw.call("update_task", json!({"id": tid, "status": "done"})).unwrap();
        assert!(done["completed_at"].is_string());
        assert_eq!(done["assignee"], "kelso");

        let listed = gw.call("list_tasks", json!({"assignee": "kelso"})).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_dialogue_and_status() {
        let (_dir, gw) = gateway();
        let a = gw.call("create_milestone", json!({"name": "A"})).unwrap();
        let b = gw.call("create_milestone", json!({"name": "B", "status": "done"})).unwrap();
        gw.call(
            "add_dependency",
            json!({"milestone_id": b["id"], "depends_on_milestone_id": a["id"]}),
        )
        .unwrap();
        gw.call(
            "log_dialogue",
            json!({"milestone_id": a["id"], "author": "Cox", "entry_type": "decision", "content": "Go"}),
        )
        .unwrap();

        let deps = gw.call("list_dependencies", json!({})).unwrap();
        assert_eq!(deps.as_array().unwrap().len(), 1);

        let dialogue = gw.call("get_milestone_dialogue", json!({"milestone_id": a["id"]})).unwrap();
        assert_eq!(dialogue[0]["author"], "Cox");

        let status = gw.call("get_project_status", json!({})).unwrap();
        assert_eq!(status["total_milestones"], 2);
        assert_eq!(status["milestones_by_status"]["done"], 1);
        assert_eq!(status["recent_activity"][0]["milestone_name"], "A");
    }
}
