//! SQLite store with Diesel ORM
//!
//! Holds the project board shared by every writer on the host: the TUI, the CLI
//! and any number of agent processes behind the tool gateway. They all open the
//! same file. SQLite's WAL mode admits one writer and many readers, and
//! `busy_timeout` makes a second writer wait instead of failing, so nothing here
//! takes a process-level lock.
//!
//! Reads for a missing id return `Ok(None)`; only writes can fail on a missing
//! parent (`DbError::ForeignKey`).

use crate::models::*;
use crate::schema::*;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Per-user directory holding the state file
pub const DATA_DIR_NAME: &str = ".agentic-project-board";
/// State file name inside the data directory
pub const DB_FILE_NAME: &str = "board.db";
/// Env var overriding the state file location
pub const DB_PATH_ENV: &str = "AGENTBOARD_DB_PATH";

/// Number of dialogue entries `project_status` reports by default
pub const DEFAULT_RECENT_ACTIVITY: i64 = 10;

/// `~/.agentic-project-board`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// Default state file, overridable with AGENTBOARD_DB_PATH
fn get_db_path() -> PathBuf {
    // Env var always takes priority
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        return PathBuf::from(path);
    }
    data_dir().join(DB_FILE_NAME)
}

/// Path of the WAL side-car next to a state file (`board.db` → `board.db-wal`)
pub fn wal_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push("-wal");
    PathBuf::from(name)
}

/// Store-assigned timestamp: UTC, millisecond precision, sortable as text
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ============================================================================
// Migrations
// ============================================================================

/// A named schema change, applied at most once per state file
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

const LEDGER_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        name TEXT NOT NULL UNIQUE,
        applied_at TEXT NOT NULL
    );
"#;

/// Append-only, ordered by name. Never edit an entry once released.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS milestones (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'not_started'
                    CHECK (status IN ('not_started', 'in_progress', 'done')),
                priority INTEGER NOT NULL DEFAULT 0,
                owner TEXT,
                description TEXT,
                start_date TEXT,
                end_date TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS milestone_dependencies (
                milestone_id INTEGER NOT NULL REFERENCES milestones(id) ON DELETE CASCADE,
                depends_on_milestone_id INTEGER NOT NULL REFERENCES milestones(id) ON DELETE CASCADE,
                PRIMARY KEY (milestone_id, depends_on_milestone_id)
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                milestone_id INTEGER NOT NULL REFERENCES milestones(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'in_progress', 'done')),
                assignee TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE TABLE IF NOT EXISTS dialogue_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                milestone_id INTEGER NOT NULL REFERENCES milestones(id) ON DELETE CASCADE,
                author TEXT NOT NULL,
                entry_type TEXT NOT NULL DEFAULT 'note'
                    CHECK (entry_type IN ('decision', 'progress', 'blocker', 'note')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        name: "0002_default_project",
        sql: r#"
            INSERT OR IGNORE INTO projects (id, name, description, created_at)
            VALUES (1, 'Default Project', NULL, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
        "#,
    },
    Migration {
        name: "0003_indexes",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_milestones_project ON milestones(project_id);
            CREATE INDEX IF NOT EXISTS idx_dependencies_prereq ON milestone_dependencies(depends_on_milestone_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_milestone ON tasks(milestone_id);
            CREATE INDEX IF NOT EXISTS idx_dialogue_milestone ON dialogue_entries(milestone_id, created_at);
        "#,
    },
];

// ============================================================================
// Errors
// ============================================================================

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The state file can't be opened or created. Fatal to the caller.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Connection error: {0}")]
    Connection(String),
    /// A write referenced a parent row that doesn't exist
    #[error("Referential integrity error: {0}")]
    ForeignKey(String),
    #[error("Query error: {0}")]
    Query(#[source] DieselError),
    #[error("{0}")]
    Validation(String),
}

impl From<DieselError> for DbError {
    fn from(e: DieselError) -> Self {
        match &e {
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                DbError::ForeignKey(info.message().to_string())
            }
            DieselError::DatabaseError(_, info)
                if info.message().contains("FOREIGN KEY constraint failed") =>
            {
                DbError::ForeignKey(info.message().to_string())
            }
            _ => DbError::Query(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// How `add_dependency` treats edges the graph can't honor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgePolicy {
    /// Accept self-loops, cross-project edges and cycles (advisory edges)
    #[default]
    Permissive,
    /// Reject them with `DbError::Validation`
    Strict,
}

/// Per-connection pragmas. `foreign_keys` is not persisted by SQLite, so every
/// pooled connection has to turn it on itself.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Database connection wrapper with connection pool
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    path: PathBuf,
    edge_policy: EdgePolicy,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("edge_policy", &self.edge_policy)
            .finish()
    }
}

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> PathBuf {
        get_db_path()
    }

    /// Open (and migrate) the database at the default path
    pub fn open() -> Result<Self> {
        Self::open_at(get_db_path())
    }

    /// Open (and migrate) the database described by a config
    pub fn open_with(config: &crate::Config) -> Result<Self> {
        let db = Self::connect(config.db_path(), config.busy_timeout())?
            .with_edge_policy(config.edge_policy());
        db.migrate()?;
        Ok(db)
    }

    /// Open (and migrate) the database at the specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Self::connect(path, Duration::from_secs(5))?;
        db.migrate()?;
        Ok(db)
    }

    /// Initialize the state file without migrating: create it if absent,
    /// switch it to WAL and enable foreign keys. Safe to call from several
    /// processes at once.
    pub fn connect<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(5)
            .connection_timeout(Duration::from_secs(10))
            .connection_customizer(Box::new(ConnectionOptions { busy_timeout }))
            .build(manager)
            .map_err(|e| DbError::Unavailable(format!("{}: {}", path.display(), e)))?;

        let db = Self {
            pool,
            path,
            edge_policy: EdgePolicy::default(),
        };
        db.get_conn()?
            .batch_execute("PRAGMA journal_mode = WAL;")
            .map_err(|e| DbError::Unavailable(format!("{}: {}", db.path.display(), e)))?;
        debug!(path = %db.path.display(), "store initialized");
        Ok(db)
    }

    /// Open a private in-memory store (single connection). Useful in tests.
    pub fn open_in_memory() -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout: Duration::from_secs(5),
            }))
            .build(manager)
            .map_err(|e| DbError::Unavailable(e.to_string()))?;
        let db = Self {
            pool,
            path: PathBuf::from(":memory:"),
            edge_policy: EdgePolicy::default(),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn with_edge_policy(mut self, policy: EdgePolicy) -> Self {
        self.edge_policy = policy;
        self
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge_policy
    }

    /// Path of the state file this store writes to
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    /// Apply pending migrations, returning the names applied by this call.
    ///
    /// Each migration claims its ledger row with `INSERT OR IGNORE` inside an
    /// IMMEDIATE transaction. When two processes race, the loser sees zero
    /// affected rows and skips the body; the UNIQUE constraint on the ledger
    /// name is the only arbiter.
    pub fn migrate(&self) -> Result<Vec<&'static str>> {
        let mut conn = self.get_conn()?;
        conn.batch_execute(LEDGER_SQL)?;

        let mut applied = Vec::new();
        for migration in MIGRATIONS {
            let ran = conn.immediate_transaction::<bool, DbError, _>(|conn| {
                let claimed = diesel::insert_or_ignore_into(_migrations::table)
                    .values((
                        _migrations::name.eq(migration.name),
                        _migrations::applied_at.eq(now_timestamp()),
                    ))
                    .execute(conn)?;
                if claimed == 0 {
                    return Ok(false);
                }
                conn.batch_execute(migration.sql)?;
                Ok(true)
            })?;

            if ran {
                info!(migration = migration.name, "applied migration");
                applied.push(migration.name);
            }
        }
        Ok(applied)
    }

    /// Ledger of applied migrations, oldest first
    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        let mut conn = self.get_conn()?;
        let rows = _migrations::table
            .order(_migrations::name.asc())
            .select(AppliedMigration::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    // ========================================================================
    // Projects
    // ========================================================================

    pub fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();

        diesel::insert_into(projects::table)
            .values(&NewProject {
                name,
                description,
                created_at: &now,
            })
            .execute(&mut conn)?;

        let id = last_insert_rowid(&mut conn)?;
        let project = projects::table
            .find(id)
            .select(Project::as_select())
            .first(&mut conn)?;
        Ok(project)
    }

    /// All projects, newest first
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut conn = self.get_conn()?;
        let projects = projects::table
            .order((projects::created_at.desc(), projects::id.desc()))
            .select(Project::as_select())
            .load(&mut conn)?;
        Ok(projects)
    }

    pub fn get_project(&self, id: i32) -> Result<Option<Project>> {
        let mut conn = self.get_conn()?;
        let project = projects::table
            .find(id)
            .select(Project::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(project)
    }

    /// The project with the lowest id
    pub fn default_project(&self) -> Result<Option<Project>> {
        let mut conn = self.get_conn()?;
        let project = projects::table
            .order(projects::id.asc())
            .select(Project::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(project)
    }

    /// Delete a project and, by cascade, everything under it.
    /// Returns whether a row was removed.
    pub fn delete_project(&self, id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let removed = diesel::delete(projects::table.find(id)).execute(&mut conn)?;
        Ok(removed > 0)
    }

    // ========================================================================
    // Milestones
    // ========================================================================

    pub fn create_milestone(&self, draft: &MilestoneDraft) -> Result<Milestone> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();

        diesel::insert_into(milestones::table)
            .values(&NewMilestone {
                project_id: draft.project_id,
                name: &draft.name,
                status: draft.status,
                priority: draft.priority,
                owner: draft.owner.as_deref(),
                description: draft.description.as_deref(),
                start_date: draft.start_date.as_deref(),
                end_date: draft.end_date.as_deref(),
                created_at: &now,
            })
            .execute(&mut conn)?;

        let id = last_insert_rowid(&mut conn)?;
        let milestone = milestones::table
            .find(id)
            .select(Milestone::as_select())
            .first(&mut conn)?;
        Ok(milestone)
    }

    pub fn get_milestone(&self, id: i32) -> Result<Option<Milestone>> {
        let mut conn = self.get_conn()?;
        let milestone = milestones::table
            .find(id)
            .select(Milestone::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(milestone)
    }

    /// Milestones ordered by priority, then creation time
    pub fn list_milestones(&self, filter: &MilestoneFilter) -> Result<Vec<Milestone>> {
        let mut conn = self.get_conn()?;
        let mut query = milestones::table.select(Milestone::as_select()).into_boxed();

        if let Some(project_id) = filter.project_id {
            query = query.filter(milestones::project_id.eq(project_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(milestones::status.eq(status));
        }

        let milestones = query
            .order((
                milestones::priority.asc(),
                milestones::created_at.asc(),
                milestones::id.asc(),
            ))
            .load(&mut conn)?;
        Ok(milestones)
    }

    /// Apply a sparse update. Returns `None` when the milestone doesn't exist.
    pub fn update_milestone(&self, id: i32, patch: &MilestonePatch) -> Result<Option<Milestone>> {
        let mut conn = self.get_conn()?;

        if !patch.is_empty() {
            diesel::update(milestones::table.find(id))
                .set(patch)
                .execute(&mut conn)?;
        }

        let milestone = milestones::table
            .find(id)
            .select(Milestone::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(milestone)
    }

    pub fn delete_milestone(&self, id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let removed = diesel::delete(milestones::table.find(id)).execute(&mut conn)?;
        Ok(removed > 0)
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Record that `milestone_id` depends on `depends_on_milestone_id`.
    /// Inserting an existing edge is a no-op.
    pub fn add_dependency(&self, milestone_id: i32, depends_on_milestone_id: i32) -> Result<DependencyEdge> {
        let edge = DependencyEdge {
            milestone_id,
            depends_on_milestone_id,
        };
        let mut conn = self.get_conn()?;

        match self.edge_policy {
            EdgePolicy::Permissive => {
                diesel::insert_or_ignore_into(milestone_dependencies::table)
                    .values(&edge)
                    .execute(&mut conn)?;
            }
            EdgePolicy::Strict => {
                conn.immediate_transaction::<(), DbError, _>(|conn| {
                    check_strict_edge(conn, &edge)?;
                    diesel::insert_or_ignore_into(milestone_dependencies::table)
                        .values(&edge)
                        .execute(conn)?;
                    Ok(())
                })?;
            }
        }

        debug!(milestone_id, depends_on_milestone_id, "dependency recorded");
        Ok(edge)
    }

    /// Edges whose dependent milestone belongs to the project
    pub fn list_dependencies(&self, project_id: i32) -> Result<Vec<DependencyEdge>> {
        let mut conn = self.get_conn()?;
        let edges = milestone_dependencies::table
            .inner_join(milestones::table.on(milestones::id.eq(milestone_dependencies::milestone_id)))
            .filter(milestones::project_id.eq(project_id))
            .order((
                milestone_dependencies::milestone_id.asc(),
                milestone_dependencies::depends_on_milestone_id.asc(),
            ))
            .select(DependencyEdge::as_select())
            .load(&mut conn)?;
        Ok(edges)
    }

    pub fn remove_dependency(&self, milestone_id: i32, depends_on_milestone_id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let removed = diesel::delete(
            milestone_dependencies::table
                .filter(milestone_dependencies::milestone_id.eq(milestone_id))
                .filter(milestone_dependencies::depends_on_milestone_id.eq(depends_on_milestone_id)),
        )
        .execute(&mut conn)?;
        Ok(removed > 0)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Create a task. A task created as done is stamped completed immediately.
    pub fn create_task(&self, draft: &TaskDraft) -> Result<Task> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();
        let completed_at = (draft.status == TaskStatus::Done).then_some(now.as_str());

        diesel::insert_into(tasks::table)
            .values(&NewTask {
                milestone_id: draft.milestone_id,
                title: &draft.title,
                status: draft.status,
                assignee: draft.assignee.as_deref(),
                created_at: &now,
                completed_at,
            })
            .execute(&mut conn)?;

        let id = last_insert_rowid(&mut conn)?;
        let task = tasks::table
            .find(id)
            .select(Task::as_select())
            .first(&mut conn)?;
        Ok(task)
    }

    pub fn get_task(&self, id: i32) -> Result<Option<Task>> {
        let mut conn = self.get_conn()?;
        let task = tasks::table
            .find(id)
            .select(Task::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(task)
    }

    /// Tasks in creation order
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut conn = self.get_conn()?;
        let mut query = tasks::table.select(Task::as_select()).into_boxed();

        if let Some(milestone_id) = filter.milestone_id {
            query = query.filter(tasks::milestone_id.eq(milestone_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(tasks::status.eq(status));
        }
        if let Some(assignee) = &filter.assignee {
            query = query.filter(tasks::assignee.eq(assignee.clone()));
        }

        let tasks = query
            .order((tasks::created_at.asc(), tasks::id.asc()))
            .load(&mut conn)?;
        Ok(tasks)
    }

    /// Every task under every milestone of a project, in creation order
    pub fn list_project_tasks(&self, project_id: i32) -> Result<Vec<Task>> {
        let mut conn = self.get_conn()?;
        let tasks = tasks::table
            .inner_join(milestones::table)
            .filter(milestones::project_id.eq(project_id))
            .order((tasks::created_at.asc(), tasks::id.asc()))
            .select(Task::as_select())
            .load(&mut conn)?;
        Ok(tasks)
    }

    /// Apply a sparse update. Returns `None` when the task doesn't exist.
    ///
    /// Moving to done without an explicit `completed_at` stamps the task, but
    /// only if it has never been stamped; `completed_at` is never cleared.
    pub fn update_task(&self, id: i32, patch: &TaskPatch) -> Result<Option<Task>> {
        let mut conn = self.get_conn()?;

        conn.immediate_transaction::<Option<Task>, DbError, _>(|conn| {
            let Some(current) = tasks::table
                .find(id)
                .select(Task::as_select())
                .first(conn)
                .optional()?
            else {
                return Ok(None);
            };

            let mut patch = patch.clone();
            if patch.status == Some(TaskStatus::Done)
                && patch.completed_at.is_none()
                && current.completed_at.is_none()
            {
                patch.completed_at = Some(now_timestamp());
            }

            if !patch.is_empty() {
                diesel::update(tasks::table.find(id)).set(&patch).execute(conn)?;
            }

            let task = tasks::table
                .find(id)
                .select(Task::as_select())
                .first(conn)
                .optional()?;
            Ok(task)
        })
    }

    pub fn delete_task(&self, id: i32) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let removed = diesel::delete(tasks::table.find(id)).execute(&mut conn)?;
        Ok(removed > 0)
    }

    // ========================================================================
    // Dialogue (append-only)
    // ========================================================================

    pub fn log_dialogue(&self, draft: &DialogueDraft) -> Result<DialogueEntry> {
        let mut conn = self.get_conn()?;
        let now = now_timestamp();

        diesel::insert_into(dialogue_entries::table)
            .values(&NewDialogueEntry {
                milestone_id: draft.milestone_id,
                author: &draft.author,
                entry_type: draft.entry_type,
                content: &draft.content,
                created_at: &now,
            })
            .execute(&mut conn)?;

        let id = last_insert_rowid(&mut conn)?;
        let entry = dialogue_entries::table
            .find(id)
            .select(DialogueEntry::as_select())
            .first(&mut conn)?;
        Ok(entry)
    }

    /// Log the same entry on every milestone of a project. Each insert is its
    /// own statement, so other writers may interleave between them.
    pub fn broadcast_dialogue(
        &self,
        project_id: i32,
        author: &str,
        entry_type: EntryType,
        content: &str,
    ) -> Result<Vec<DialogueEntry>> {
        let milestones = self.list_milestones(&MilestoneFilter {
            project_id: Some(project_id),
            status: None,
        })?;
        milestones
            .iter()
            .map(|m| self.log_dialogue(&DialogueDraft::new(m.id, author, entry_type, content)))
            .collect()
    }

    /// A milestone's dialogue, newest first
    pub fn milestone_dialogue(&self, milestone_id: i32) -> Result<Vec<DialogueEntry>> {
        let mut conn = self.get_conn()?;
        let entries = dialogue_entries::table
            .filter(dialogue_entries::milestone_id.eq(milestone_id))
            .order((dialogue_entries::created_at.desc(), dialogue_entries::id.desc()))
            .select(DialogueEntry::as_select())
            .load(&mut conn)?;
        Ok(entries)
    }

    /// Dialogue across a project with milestone names, newest first
    pub fn project_dialogue(&self, project_id: i32, limit: i64) -> Result<Vec<DialogueWithMilestone>> {
        let mut conn = self.get_conn()?;
        load_project_dialogue(&mut conn, project_id, limit)
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// Milestone counts by status, task counts by status, recent dialogue
    pub fn project_status(&self, project_id: i32, recent_limit: i64) -> Result<ProjectStatus> {
        let mut conn = self.get_conn()?;

        let statuses: Vec<MilestoneStatus> = milestones::table
            .filter(milestones::project_id.eq(project_id))
            .select(milestones::status)
            .load(&mut conn)?;
        let mut milestones_by_status = MilestoneCounts::default();
        for status in &statuses {
            milestones_by_status.record(*status);
        }

        let task_statuses: Vec<TaskStatus> = tasks::table
            .inner_join(milestones::table)
            .filter(milestones::project_id.eq(project_id))
            .select(tasks::status)
            .load(&mut conn)?;
        let mut task_counts = std::collections::BTreeMap::new();
        for status in task_statuses {
            *task_counts.entry(status).or_insert(0) += 1;
        }

        let recent_activity = load_project_dialogue(&mut conn, project_id, recent_limit)?;

        Ok(ProjectStatus {
            project_id,
            milestones_by_status,
            total_milestones: statuses.len() as i64,
            task_counts,
            recent_activity,
        })
    }
}

fn last_insert_rowid(conn: &mut SqliteConnection) -> Result<i32> {
    let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
        .first(conn)?;
    Ok(id)
}

fn load_project_dialogue(
    conn: &mut SqliteConnection,
    project_id: i32,
    limit: i64,
) -> Result<Vec<DialogueWithMilestone>> {
    let rows: Vec<(DialogueEntry, String)> = dialogue_entries::table
        .inner_join(milestones::table)
        .filter(milestones::project_id.eq(project_id))
        .order((dialogue_entries::created_at.desc(), dialogue_entries::id.desc()))
        .limit(limit.max(0))
        .select((DialogueEntry::as_select(), milestones::name))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(entry, milestone_name)| DialogueWithMilestone {
            entry,
            milestone_name,
        })
        .collect())
}

/// Strict-mode checks: both ends exist in the same project, no self-loop, and
/// the prerequisite doesn't already (transitively) depend on the dependent.
fn check_strict_edge(conn: &mut SqliteConnection, edge: &DependencyEdge) -> Result<()> {
    if edge.milestone_id == edge.depends_on_milestone_id {
        return Err(DbError::Validation(format!(
            "Milestone {} cannot depend on itself",
            edge.milestone_id
        )));
    }

    let ends: Vec<(i32, i32)> = milestones::table
        .filter(milestones::id.eq_any(vec![edge.milestone_id, edge.depends_on_milestone_id]))
        .select((milestones::id, milestones::project_id))
        .load(conn)?;
    let project_of: HashMap<i32, i32> = ends.into_iter().collect();

    let (Some(dependent_project), Some(prereq_project)) = (
        project_of.get(&edge.milestone_id),
        project_of.get(&edge.depends_on_milestone_id),
    ) else {
        let missing = if project_of.contains_key(&edge.milestone_id) {
            edge.depends_on_milestone_id
        } else {
            edge.milestone_id
        };
        return Err(DbError::ForeignKey(format!("Milestone {} does not exist", missing)));
    };

    if dependent_project != prereq_project {
        return Err(DbError::Validation(format!(
            "Milestones {} and {} belong to different projects",
            edge.milestone_id, edge.depends_on_milestone_id
        )));
    }

    let existing: Vec<DependencyEdge> = milestone_dependencies::table
        .inner_join(milestones::table.on(milestones::id.eq(milestone_dependencies::milestone_id)))
        .filter(milestones::project_id.eq(*dependent_project))
        .select(DependencyEdge::as_select())
        .load(conn)?;

    // Walk prerequisites of the new prerequisite; reaching the dependent means a cycle
    let mut prereqs: HashMap<i32, Vec<i32>> = HashMap::new();
    for e in &existing {
        prereqs
            .entry(e.milestone_id)
            .or_default()
            .push(e.depends_on_milestone_id);
    }
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([edge.depends_on_milestone_id]);
    while let Some(current) = queue.pop_front() {
        if current == edge.milestone_id {
            return Err(DbError::Validation(format!(
                "Dependency {} -> {} would create a cycle",
                edge.milestone_id, edge.depends_on_milestone_id
            )));
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = prereqs.get(&current) {
            queue.extend(next.iter().copied());
        }
    }

    Ok(())
}
