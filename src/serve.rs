//! Read-only HTTP query surface
//!
//! `agentboard serve` → JSON endpoints over the board, plus a long-poll on the
//! change feed so browser clients can refetch when another process writes.
//!
//! | Route | Result |
//! |-------|--------|
//! | `GET /api/projects` | all projects |
//! | `GET /api/projects/default` | the default project or null |
//! | `GET /api/projects/{id}` | one project |
//! | `GET /api/projects/{id}/status?recent=N` | project status |
//! | `GET /api/milestones?project_id=&status=` | milestones |
//! | `GET /api/milestones/{id}` | one milestone |
//! | `GET /api/milestones/{id}/dialogue` | a milestone's dialogue |
//! | `GET /api/dependencies?project_id=` | dependency edges |
//! | `GET /api/tasks?milestone_id=&project_id=&status=&assignee=` | tasks |
//! | `GET /api/dialogue?project_id=&limit=` | project dialogue |
//! | `GET /api/graph?project_id=` | graph plus computed layout |
//! | `GET /api/changes?since=N&timeout_ms=` | waits for a change past `N` |

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

use crate::db::{Database, DbError, DEFAULT_RECENT_ACTIVITY};
use crate::graph::{DependencyGraph, Layout, LayoutConfig};
use crate::models::{MilestoneFilter, MilestoneStatus, TaskFilter, TaskStatus};
use crate::watch::{ActiveBackend, ChangeFeed};
use crate::Config;

/// Longest a `/api/changes` request may wait
const MAX_LONG_POLL: Duration = Duration::from_secs(30);
const DEFAULT_LONG_POLL: Duration = Duration::from_secs(25);

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Latest change sequence seen on the feed, with a condvar for long-polls
#[derive(Debug, Default)]
pub struct ChangeTracker {
    seq: Mutex<u64>,
    changed: Condvar,
}

impl ChangeTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seq(&self) -> u64 {
        self.seq.lock().map(|s| *s).unwrap_or_else(|e| *e.into_inner())
    }

    /// Record a change and wake every waiter
    pub fn publish(&self) -> u64 {
        let mut seq = self.seq.lock().unwrap_or_else(|e| e.into_inner());
        *seq += 1;
        self.changed.notify_all();
        *seq
    }

    /// Block until the sequence passes `since` or `timeout` elapses; returns the
    /// sequence at wake-up
    pub fn wait_past(&self, since: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut seq = self.seq.lock().unwrap_or_else(|e| e.into_inner());
        while *seq <= since {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            seq = match self.changed.wait_timeout(seq, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        *seq
    }
}

/// Shared state for request handlers
pub struct ApiState {
    db: Database,
    layout: LayoutConfig,
    default_project_id: i32,
    tracker: Arc<ChangeTracker>,
    backend: ActiveBackend,
}

impl ApiState {
    pub fn new(db: Database, config: &Config, tracker: Arc<ChangeTracker>, backend: ActiveBackend) -> Self {
        Self {
            db,
            layout: config.graph,
            default_project_id: config.gateway.default_project_id,
            tracker,
            backend,
        }
    }
}

/// Start the query server on 127.0.0.1:`port` and serve until killed
pub fn start_server(db: Database, config: &Config, port: u16) -> std::io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let server = Server::http(&addr).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let tracker = ChangeTracker::new();
    let backend = match ChangeFeed::start(db.path(), config.watch) {
        Ok(feed) => spawn_forwarder(feed, tracker.clone())?,
        Err(e) => {
            warn!(error = %e, "change feed unavailable; /api/changes will only time out");
            ActiveBackend::Disabled
        }
    };

    let state = Arc::new(ApiState::new(db, config, tracker, backend));

    eprintln!("\n\x1b[1;32magentboard\x1b[0m");
    eprintln!("   Query API: http://localhost:{}/api/projects", port);
    eprintln!("   Press Ctrl+C to stop\n");
    info!(%addr, %backend, "query server listening");

    for request in server.incoming_requests() {
        let state = state.clone();
        // One thread per request so a long-poll never stalls other clients
        let spawned = thread::Builder::new()
            .name("agentboard-http".to_string())
            .spawn(move || {
                if let Err(e) = handle_request(&state, request) {
                    warn!(error = %e, "failed to send response");
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn request thread");
        }
    }

    Ok(())
}

/// Move the feed onto a thread that publishes every signal to `tracker`
fn spawn_forwarder(feed: ChangeFeed, tracker: Arc<ChangeTracker>) -> std::io::Result<ActiveBackend> {
    let backend = feed.backend();
    if backend == ActiveBackend::Disabled {
        return Ok(backend);
    }
    thread::Builder::new()
        .name("agentboard-feed".to_string())
        .spawn(move || loop {
            if let Some(signal) = feed.recv_timeout(Duration::from_secs(60)) {
                let seq = tracker.publish();
                debug!(feed_seq = signal.seq, seq, "state file changed");
            }
        })?;
    Ok(backend)
}

fn handle_request(state: &ApiState, request: Request) -> std::io::Result<()> {
    let (status, body) = route(state, request.method(), request.url());
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    request.respond(response)
}

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct MilestoneQuery {
    project_id: Option<i32>,
    status: Option<MilestoneStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct TaskQuery {
    milestone_id: Option<i32>,
    project_id: Option<i32>,
    status: Option<TaskStatus>,
    assignee: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectQuery {
    project_id: Option<i32>,
    limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    recent: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChangesQuery {
    #[serde(default)]
    since: u64,
    timeout_ms: Option<u64>,
}

#[derive(Serialize)]
struct GraphPayload {
    graph: DependencyGraph,
    layout: Layout,
}

#[derive(Serialize)]
struct ChangesPayload {
    seq: u64,
    changed: bool,
    backend: ActiveBackend,
}

enum RouteError {
    BadQuery(String),
    NotFound,
    Store(DbError),
}

impl From<DbError> for RouteError {
    fn from(e: DbError) -> Self {
        RouteError::Store(e)
    }
}

type RouteResult = Result<String, RouteError>;

fn ok_json<T: Serialize>(data: T) -> RouteResult {
    serde_json::to_string(&ApiResponse::success(data)).map_err(|e| RouteError::BadQuery(e.to_string()))
}

fn parse_query<T: for<'de> Deserialize<'de> + Default>(query: &str) -> Result<T, RouteError> {
    if query.is_empty() {
        return Ok(T::default());
    }
    serde_urlencoded::from_str(query).map_err(|e| RouteError::BadQuery(format!("invalid query string: {}", e)))
}

fn parse_id(segment: &str) -> Result<i32, RouteError> {
    segment
        .parse()
        .map_err(|_| RouteError::BadQuery(format!("invalid id '{}'", segment)))
}

/// Resolve one request to a status code and JSON body
pub fn route(state: &ApiState, method: &Method, url: &str) -> (u16, String) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    debug!(%method, path, "http request");

    if *method != Method::Get {
        return error_body(405, "only GET is supported");
    }

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let result = match segments.as_slice() {
        ["api", "projects"] => state.db.list_projects().map_err(Into::into).and_then(ok_json),
        ["api", "projects", "default"] => state.db.default_project().map_err(Into::into).and_then(ok_json),
        ["api", "projects", id] => parse_id(id).and_then(|id| {
            let project = state.db.get_project(id)?.ok_or(RouteError::NotFound)?;
            ok_json(project)
        }),
        ["api", "projects", id, "status"] => parse_id(id).and_then(|id| {
            let q: StatusQuery = parse_query(query)?;
            let recent = q.recent.unwrap_or(DEFAULT_RECENT_ACTIVITY);
            ok_json(state.db.project_status(id, recent)?)
        }),
        ["api", "milestones"] => parse_query::<MilestoneQuery>(query).and_then(|q| {
            let filter = MilestoneFilter {
                project_id: q.project_id,
                status: q.status,
            };
            ok_json(state.db.list_milestones(&filter)?)
        }),
        ["api", "milestones", id] => parse_id(id).and_then(|id| {
            let milestone = state.db.get_milestone(id)?.ok_or(RouteError::NotFound)?;
            ok_json(milestone)
        }),
        ["api", "milestones", id, "dialogue"] => {
            parse_id(id).and_then(|id| ok_json(state.db.milestone_dialogue(id)?))
        }
        ["api", "dependencies"] => parse_query::<ProjectQuery>(query).and_then(|q| {
            let project_id = q.project_id.unwrap_or(state.default_project_id);
            ok_json(state.db.list_dependencies(project_id)?)
        }),
        ["api", "tasks"] => parse_query::<TaskQuery>(query).and_then(|q| match q.project_id {
            Some(project_id) if q.milestone_id.is_none() => {
                let tasks = state.db.list_project_tasks(project_id)?;
                let tasks: Vec<_> = tasks
                    .into_iter()
                    .filter(|t| q.status.map_or(true, |s| t.status == s))
                    .filter(|t| q.assignee.as_ref().map_or(true, |a| t.assignee.as_ref() == Some(a)))
                    .collect();
                ok_json(tasks)
            }
            _ => {
                let filter = TaskFilter {
                    milestone_id: q.milestone_id,
                    status: q.status,
                    assignee: q.assignee,
                };
                ok_json(state.db.list_tasks(&filter)?)
            }
        }),
        ["api", "dialogue"] => parse_query::<ProjectQuery>(query).and_then(|q| {
            let project_id = q.project_id.unwrap_or(state.default_project_id);
            let limit = q.limit.unwrap_or(50);
            ok_json(state.db.project_dialogue(project_id, limit)?)
        }),
        ["api", "graph"] => parse_query::<ProjectQuery>(query).and_then(|q| {
            let project_id = q.project_id.unwrap_or(state.default_project_id);
            let milestones = state.db.list_milestones(&MilestoneFilter {
                project_id: Some(project_id),
                status: None,
            })?;
            let deps = state.db.list_dependencies(project_id)?;
            let tasks = state.db.list_project_tasks(project_id)?;
            let graph = DependencyGraph::build(&milestones, &deps, &tasks);
            let layout = graph.layout(&state.layout);
            ok_json(GraphPayload { graph, layout })
        }),
        ["api", "changes"] => parse_query::<ChangesQuery>(query).and_then(|q| {
            let timeout = q
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_LONG_POLL)
                .min(MAX_LONG_POLL);
            let seq = state.tracker.wait_past(q.since, timeout);
            ok_json(ChangesPayload {
                seq,
                changed: seq > q.since,
                backend: state.backend,
            })
        }),
        _ => Err(RouteError::NotFound),
    };

    match result {
        Ok(body) => (200, body),
        Err(RouteError::BadQuery(msg)) => error_body(400, &msg),
        Err(RouteError::NotFound) => error_body(404, "not found"),
        Err(RouteError::Store(e)) => {
            warn!(error = %e, path, "query failed");
            error_body(500, &format!("Database error: {}", e))
        }
    }
}

fn error_body(status: u16, message: &str) -> (u16, String) {
    let body = serde_json::to_string(&ApiResponse::failure(message))
        .unwrap_or_else(|_| r#"{"ok":false,"data":null,"error":"internal"}"#.to_string());
    (status, body)
}
