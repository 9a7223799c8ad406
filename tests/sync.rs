//! Sync layer end to end: an agent writes through the tool gateway on its own
//! store handle, and a client watching the same file picks the write up.

use std::time::{Duration, Instant};

use agentboard::{
    ChangeFeed, Database, MilestoneFilter, Query, QueryResult, SyncEvent, SyncLayer, ToolGateway,
    WatchBackend, WatchOptions,
};
use serde_json::json;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Milestones,
    Status,
}

/// Pump until `done` holds or the deadline passes
fn pump_until(sync: &mut SyncLayer<Key>, done: impl Fn(&SyncLayer<Key>) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        sync.pump();
        if done(sync) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

fn milestone_count(sync: &SyncLayer<Key>) -> usize {
    sync.get(&Key::Milestones)
        .and_then(QueryResult::as_milestones)
        .map_or(0, |m| m.len())
}

#[test]
fn test_client_sees_agent_write_via_change_feed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.db");
    let client_db = Database::open_at(&path).unwrap();
    let agent = ToolGateway::new(Database::open_at(&path).unwrap());

    let feed = ChangeFeed::start(
        client_db.path(),
        WatchOptions {
            backend: WatchBackend::Poll,
            debounce_ms: 50,
            poll_interval_ms: 25,
        },
    )
    .unwrap();
    // Poll interval long enough that only the feed can trigger the refetch
    let mut sync = SyncLayer::new(client_db, feed, Duration::from_secs(3600)).unwrap();
    sync.watch(
        Key::Milestones,
        Query::Milestones(MilestoneFilter {
            project_id: Some(1),
            status: None,
        }),
    );
    sync.settle(Duration::from_secs(5));
    assert_eq!(milestone_count(&sync), 0);

    agent
        .call("create_milestone", json!({"name": "Agent milestone"}))
        .unwrap();

    assert!(pump_until(&mut sync, |s| milestone_count(s) == 1));
}

#[test]
fn test_poll_interval_covers_disabled_feed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.db");
    let client_db = Database::open_at(&path).unwrap();
    let agent = ToolGateway::new(Database::open_at(&path).unwrap());

    let mut sync =
        SyncLayer::new(client_db, ChangeFeed::disabled(), Duration::from_millis(50)).unwrap();
    sync.watch(
        Key::Status,
        Query::ProjectStatus {
            project_id: 1,
            recent_limit: 5,
        },
    );
    sync.settle(Duration::from_secs(5));

    agent
        .call("create_milestone", json!({"name": "A", "status": "done"}))
        .unwrap();

    assert!(pump_until(&mut sync, |s| {
        s.get(&Key::Status)
            .and_then(QueryResult::as_status)
            .is_some_and(|st| st.milestones_by_status.done == 1)
    }));
}

#[test]
fn test_param_change_refetches_and_reports() {
    let dir = TempDir::new().unwrap();
    let db = Database::open_at(dir.path().join("board.db")).unwrap();
    let other = db.create_project("Other", None).unwrap();
    let gateway = ToolGateway::new(db.clone());
    gateway
        .call(
            "create_milestone",
            json!({"project_id": other.id, "name": "Elsewhere"}),
        )
        .unwrap();

    let mut sync = SyncLayer::new(db, ChangeFeed::disabled(), Duration::from_secs(3600)).unwrap();
    sync.watch(
        Key::Milestones,
        Query::Milestones(MilestoneFilter {
            project_id: Some(1),
            status: None,
        }),
    );
    sync.settle(Duration::from_secs(5));
    assert_eq!(milestone_count(&sync), 0);

    sync.watch(
        Key::Milestones,
        Query::Milestones(MilestoneFilter {
            project_id: Some(other.id),
            status: None,
        }),
    );
    let events = sync.settle(Duration::from_secs(5));
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncEvent::Updated(Key::Milestones))));
    assert_eq!(milestone_count(&sync), 1);
}
