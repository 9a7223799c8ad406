//! Client-side cache of store queries, kept fresh from the change feed
//!
//! The UI registers keyed queries with [`SyncLayer::watch`] and reads cached
//! results with [`SyncLayer::get`]. All store round trips, reads and client
//! writes alike, happen on one background worker so the UI loop only ever
//! calls the non-blocking [`SyncLayer::pump`].
//!
//! A slot refetches when the change feed signals, when the poll interval
//! elapses, or when its parameters change. Each request carries the slot's
//! generation; a result for an older generation is dropped on arrival.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::db::{Database, DbError};
use crate::models::*;
use crate::watch::ChangeFeed;

/// A read the UI can subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    Projects,
    DefaultProject,
    Project(i32),
    Milestones(MilestoneFilter),
    Milestone(i32),
    Dependencies { project_id: i32 },
    Tasks(TaskFilter),
    ProjectTasks { project_id: i32 },
    MilestoneDialogue { milestone_id: i32 },
    ProjectDialogue { project_id: i32, limit: i64 },
    ProjectStatus { project_id: i32, recent_limit: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Projects(Vec<Project>),
    Project(Option<Project>),
    Milestones(Vec<Milestone>),
    Milestone(Option<Milestone>),
    Dependencies(Vec<DependencyEdge>),
    Tasks(Vec<Task>),
    Dialogue(Vec<DialogueEntry>),
    ProjectDialogue(Vec<DialogueWithMilestone>),
    Status(ProjectStatus),
}

impl Query {
    pub fn run(&self, db: &Database) -> Result<QueryResult, DbError> {
        Ok(match self {
            Query::Projects => QueryResult::Projects(db.list_projects()?),
            Query::DefaultProject => QueryResult::Project(db.default_project()?),
            Query::Project(id) => QueryResult::Project(db.get_project(*id)?),
            Query::Milestones(filter) => QueryResult::Milestones(db.list_milestones(filter)?),
            Query::Milestone(id) => QueryResult::Milestone(db.get_milestone(*id)?),
            Query::Dependencies { project_id } => {
                QueryResult::Dependencies(db.list_dependencies(*project_id)?)
            }
            Query::Tasks(filter) => QueryResult::Tasks(db.list_tasks(filter)?),
            Query::ProjectTasks { project_id } => QueryResult::Tasks(db.list_project_tasks(*project_id)?),
            Query::MilestoneDialogue { milestone_id } => {
                QueryResult::Dialogue(db.milestone_dialogue(*milestone_id)?)
            }
            Query::ProjectDialogue { project_id, limit } => {
                QueryResult::ProjectDialogue(db.project_dialogue(*project_id, *limit)?)
            }
            Query::ProjectStatus {
                project_id,
                recent_limit,
            } => QueryResult::Status(db.project_status(*project_id, *recent_limit)?),
        })
    }
}

impl QueryResult {
    pub fn as_milestones(&self) -> Option<&[Milestone]> {
        match self {
            QueryResult::Milestones(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tasks(&self) -> Option<&[Task]> {
        match self {
            QueryResult::Tasks(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dependencies(&self) -> Option<&[DependencyEdge]> {
        match self {
            QueryResult::Dependencies(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dialogue(&self) -> Option<&[DialogueEntry]> {
        match self {
            QueryResult::Dialogue(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_project_dialogue(&self) -> Option<&[DialogueWithMilestone]> {
        match self {
            QueryResult::ProjectDialogue(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_projects(&self) -> Option<&[Project]> {
        match self {
            QueryResult::Projects(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_project(&self) -> Option<&Project> {
        match self {
            QueryResult::Project(p) => p.as_ref(),
            _ => None,
        }
    }

    pub fn as_status(&self) -> Option<&ProjectStatus> {
        match self {
            QueryResult::Status(s) => Some(s),
            _ => None,
        }
    }
}

/// A client write
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateProject { name: String, description: Option<String> },
    CreateMilestone(MilestoneDraft),
    UpdateMilestone { id: i32, patch: MilestonePatch },
    AddDependency { milestone_id: i32, depends_on_milestone_id: i32 },
    CreateTask(TaskDraft),
    UpdateTask { id: i32, patch: TaskPatch },
    LogDialogue(DialogueDraft),
    /// Same entry on every milestone of a project
    Broadcast {
        project_id: i32,
        author: String,
        entry_type: EntryType,
        content: String,
    },
}

impl Mutation {
    pub fn apply(&self, db: &Database) -> Result<(), DbError> {
        match self {
            Mutation::CreateProject { name, description } => {
                db.create_project(name, description.as_deref())?;
            }
            Mutation::CreateMilestone(draft) => {
                db.create_milestone(draft)?;
            }
            Mutation::UpdateMilestone { id, patch } => {
                db.update_milestone(*id, patch)?;
            }
            Mutation::AddDependency {
                milestone_id,
                depends_on_milestone_id,
            } => {
                db.add_dependency(*milestone_id, *depends_on_milestone_id)?;
            }
            Mutation::CreateTask(draft) => {
                db.create_task(draft)?;
            }
            Mutation::UpdateTask { id, patch } => {
                db.update_task(*id, patch)?;
            }
            Mutation::LogDialogue(draft) => {
                db.log_dialogue(draft)?;
            }
            Mutation::Broadcast {
                project_id,
                author,
                entry_type,
                content,
            } => {
                db.broadcast_dialogue(*project_id, author, *entry_type, content)?;
            }
        }
        Ok(())
    }

    /// Short human-readable summary for status lines
    pub fn describe(&self) -> String {
        match self {
            Mutation::CreateProject { name, .. } => format!("create project '{}'", name),
            Mutation::CreateMilestone(d) => format!("create milestone '{}'", d.name),
            Mutation::UpdateMilestone { id, patch } => match patch.status {
                Some(status) => format!("milestone {} -> {}", id, status),
                None => format!("update milestone {}", id),
            },
            Mutation::AddDependency {
                milestone_id,
                depends_on_milestone_id,
            } => format!("milestone {} depends on {}", milestone_id, depends_on_milestone_id),
            Mutation::CreateTask(d) => format!("create task '{}'", d.title),
            Mutation::UpdateTask { id, patch } => match patch.status {
                Some(status) => format!("task {} -> {}", id, status),
                None => format!("update task {}", id),
            },
            Mutation::LogDialogue(d) => format!("{} logged on milestone {}", d.entry_type, d.milestone_id),
            Mutation::Broadcast { entry_type, .. } => format!("{} broadcast", entry_type),
        }
    }
}

/// What `pump` observed
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent<K> {
    Updated(K),
    FetchFailed { key: K, error: String },
    MutationApplied { description: String },
    MutationFailed { description: String, error: String },
}

/// Cached state of one watched query
#[derive(Debug, Clone)]
pub struct Slot {
    pub query: Query,
    pub generation: u64,
    pub result: Option<QueryResult>,
    pub error: Option<String>,
    pub in_flight: bool,
    pub fetched_at: Option<Instant>,
}

enum Request<K> {
    Fetch { key: K, generation: u64, query: Query },
    Mutate(Mutation),
}

enum Response<K> {
    Fetched {
        key: K,
        generation: u64,
        result: Result<QueryResult, String>,
    },
    Mutated {
        description: String,
        result: Result<(), String>,
    },
}

pub struct SyncLayer<K> {
    slots: HashMap<K, Slot>,
    requests: Option<Sender<Request<K>>>,
    responses: Receiver<Response<K>>,
    worker: Option<JoinHandle<()>>,
    feed: ChangeFeed,
    poll_interval: Duration,
    last_refresh: Instant,
    next_generation: u64,
    pending_mutations: usize,
}

impl<K> SyncLayer<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    /// Spawn the worker. It owns its own handle onto the store's pool.
    pub fn new(db: Database, feed: ChangeFeed, poll_interval: Duration) -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, responses) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("agentboard-sync".to_string())
            .spawn(move || worker_loop(db, request_rx, response_tx))?;

        Ok(Self {
            slots: HashMap::new(),
            requests: Some(request_tx),
            responses,
            worker: Some(worker),
            feed,
            poll_interval,
            last_refresh: Instant::now(),
            next_generation: 0,
            pending_mutations: 0,
        })
    }

    /// Subscribe `key` to `query`. Re-watching with identical parameters is a
    /// no-op; different parameters supersede any fetch still in flight.
    pub fn watch(&mut self, key: K, query: Query) {
        if self.slots.get(&key).is_some_and(|s| s.query == query) {
            return;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let previous = self.slots.remove(&key);
        self.slots.insert(
            key.clone(),
            Slot {
                query: query.clone(),
                generation,
                // Keep showing the old rows until the new ones land
                result: previous.and_then(|s| s.result),
                error: None,
                in_flight: true,
                fetched_at: None,
            },
        );
        self.send(Request::Fetch { key, generation, query });
    }

    pub fn unwatch(&mut self, key: &K) {
        self.slots.remove(key);
    }

    pub fn get(&self, key: &K) -> Option<&QueryResult> {
        self.slots.get(key).and_then(|s| s.result.as_ref())
    }

    pub fn slot(&self, key: &K) -> Option<&Slot> {
        self.slots.get(key)
    }

    /// Queue a write. Its effect shows up after the refetch that follows it.
    pub fn mutate(&mut self, mutation: Mutation) {
        self.pending_mutations += 1;
        self.send(Request::Mutate(mutation));
    }

    /// Refetch every slot with a fresh generation
    pub fn refresh_all(&mut self) {
        self.last_refresh = Instant::now();
        let mut fetches = Vec::with_capacity(self.slots.len());
        for (key, slot) in self.slots.iter_mut() {
            self.next_generation += 1;
            slot.generation = self.next_generation;
            slot.in_flight = true;
            fetches.push(Request::Fetch {
                key: key.clone(),
                generation: slot.generation,
                query: slot.query.clone(),
            });
        }
        for fetch in fetches {
            self.send(fetch);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending_mutations > 0 || self.slots.values().any(|s| s.in_flight)
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Apply finished work and fire due refetches. Never blocks.
    pub fn pump(&mut self) -> Vec<SyncEvent<K>> {
        let mut events = Vec::new();
        while let Ok(response) = self.responses.try_recv() {
            self.apply(response, &mut events);
        }

        if let Some(signal) = self.feed.try_recv() {
            trace!(seq = signal.seq, "change signal, refetching");
            self.refresh_all();
        } else if self.last_refresh.elapsed() >= self.poll_interval {
            self.refresh_all();
        }
        events
    }

    /// Block until nothing is in flight or `timeout` passes
    pub fn settle(&mut self, timeout: Duration) -> Vec<SyncEvent<K>> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        while self.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) => self.apply(response, &mut events),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        events
    }

    fn send(&mut self, request: Request<K>) {
        let sent = self.requests.as_ref().is_some_and(|tx| tx.send(request).is_ok());
        if !sent {
            warn!("sync worker is gone; request dropped");
        }
    }

    fn apply(&mut self, response: Response<K>, events: &mut Vec<SyncEvent<K>>) {
        match response {
            Response::Fetched {
                key,
                generation,
                result,
            } => {
                let Some(slot) = self.slots.get_mut(&key) else {
                    return;
                };
                if slot.generation != generation {
                    trace!(?key, generation, current = slot.generation, "discarding stale result");
                    return;
                }
                slot.in_flight = false;
                slot.fetched_at = Some(Instant::now());
                match result {
                    Ok(value) => {
                        slot.error = None;
                        slot.result = Some(value);
                        events.push(SyncEvent::Updated(key));
                    }
                    Err(error) => {
                        slot.error = Some(error.clone());
                        events.push(SyncEvent::FetchFailed { key, error });
                    }
                }
            }
            Response::Mutated { description, result } => {
                self.pending_mutations = self.pending_mutations.saturating_sub(1);
                match result {
                    Ok(()) => {
                        events.push(SyncEvent::MutationApplied { description });
                        self.refresh_all();
                    }
                    Err(error) => events.push(SyncEvent::MutationFailed { description, error }),
                }
            }
        }
    }
}

impl<K> Drop for SyncLayer<K> {
    fn drop(&mut self) {
        // Closing the channel ends the worker's receive loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("sync worker panicked");
            }
        }
    }
}

fn worker_loop<K: Eq + Hash + Clone>(db: Database, requests: Receiver<Request<K>>, responses: Sender<Response<K>>) {
    while let Ok(first) = requests.recv() {
        // Drain what's queued so superseded fetches of one key run once
        let mut batch = vec![first];
        batch.extend(requests.try_iter());

        let mut latest: HashMap<K, u64> = HashMap::new();
        for request in &batch {
            if let Request::Fetch { key, generation, .. } = request {
                let entry = latest.entry(key.clone()).or_insert(*generation);
                *entry = (*entry).max(*generation);
            }
        }

        for request in batch {
            let response = match request {
                Request::Fetch {
                    key,
                    generation,
                    query,
                } => {
                    if latest.get(&key).is_some_and(|g| *g != generation) {
                        continue;
                    }
                    let result = query.run(&db).map_err(|e| e.to_string());
                    Response::Fetched {
                        key,
                        generation,
                        result,
                    }
                }
                Request::Mutate(mutation) => {
                    let description = mutation.describe();
                    let result = mutation.apply(&db).map_err(|e| e.to_string());
                    if let Err(e) = &result {
                        warn!(%description, error = %e, "client write failed");
                    } else {
                        debug!(%description, "client write applied");
                    }
                    Response::Mutated { description, result }
                }
            };
            if responses.send(response).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum Key {
        Milestones,
        Tasks,
    }

    fn layer() -> (TempDir, Database, SyncLayer<Key>) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("board.db")).unwrap();
        let layer = SyncLayer::new(db.clone(), ChangeFeed::disabled(), Duration::from_secs(3600)).unwrap();
        (dir, db, layer)
    }

    fn milestones_of(project_id: i32) -> Query {
        Query::Milestones(MilestoneFilter {
            project_id: Some(project_id),
            status: None,
        })
    }

    #[test]
    fn test_watch_fetches() {
        let (_dir, db, mut layer) = layer();
        db.create_milestone(&MilestoneDraft::new(1, "A")).unwrap();

        layer.watch(Key::Milestones, milestones_of(1));
        let events = layer.settle(Duration::from_secs(5));
        assert_eq!(events, vec![SyncEvent::Updated(Key::Milestones)]);
        let rows = layer.get(&Key::Milestones).and_then(QueryResult::as_milestones).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let (_dir, _db, mut layer) = layer();
        layer.watch(Key::Milestones, milestones_of(1));
        let stale = layer.slot(&Key::Milestones).unwrap().generation;
        layer.watch(Key::Milestones, milestones_of(2));
        layer.settle(Duration::from_secs(5));

        let mut events = Vec::new();
        layer.apply(
            Response::Fetched {
                key: Key::Milestones,
                generation: stale,
                result: Ok(QueryResult::Milestones(vec![])),
            },
            &mut events,
        );
        assert!(events.is_empty());
        assert_eq!(layer.slot(&Key::Milestones).unwrap().query, milestones_of(2));
    }

    #[test]
    fn test_mutation_visible_after_refetch() {
        let (_dir, db, mut layer) = layer();
        let m = db.create_milestone(&MilestoneDraft::new(1, "A")).unwrap();
        layer.watch(Key::Tasks, Query::ProjectTasks { project_id: 1 });
        layer.settle(Duration::from_secs(5));

        layer.mutate(Mutation::CreateTask(TaskDraft::new(m.id, "write docs")));
        let events = layer.settle(Duration::from_secs(5));
        assert!(events.contains(&SyncEvent::MutationApplied {
            description: "create task 'write docs'".to_string()
        }));
        let tasks = layer.get(&Key::Tasks).and_then(QueryResult::as_tasks).unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_failed_mutation_reported() {
        let (_dir, _db, mut layer) = layer();
        layer.mutate(Mutation::CreateTask(TaskDraft::new(999, "orphan")));
        let events = layer.settle(Duration::from_secs(5));
        assert!(matches!(events.as_slice(), [SyncEvent::MutationFailed { .. }]));
        assert!(!layer.is_busy());
    }

    #[test]
    fn test_poll_interval_triggers_refresh() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("board.db")).unwrap();
        let mut layer: SyncLayer<Key> =
            SyncLayer::new(db.clone(), ChangeFeed::disabled(), Duration::from_millis(10)).unwrap();
        layer.watch(Key::Milestones, milestones_of(1));
        layer.settle(Duration::from_secs(5));

        // An outside writer the layer is not told about
        db.create_milestone(&MilestoneDraft::new(1, "External")).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        layer.pump();
        layer.settle(Duration::from_secs(5));

        let rows = layer.get(&Key::Milestones).and_then(QueryResult::as_milestones).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_rewatch_same_query_is_noop() {
        let (_dir, _db, mut layer) = layer();
        layer.watch(Key::Milestones, milestones_of(1));
        let generation = layer.slot(&Key::Milestones).unwrap().generation;
        layer.watch(Key::Milestones, milestones_of(1));
        assert_eq!(layer.slot(&Key::Milestones).unwrap().generation, generation);
    }
}
