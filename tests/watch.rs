//! Change feed against a real store: writes through one handle must reach a
//! feed watching the same file.

use std::time::{Duration, Instant};

use agentboard::watch::ActiveBackend;
use agentboard::{ChangeFeed, Database, MilestoneDraft, WatchBackend, WatchOptions};
use tempfile::TempDir;

fn options(backend: WatchBackend) -> WatchOptions {
    WatchOptions {
        backend,
        debounce_ms: 50,
        poll_interval_ms: 25,
    }
}

/// Make one write and wait for the signal it produces
fn write_once_and_wait(feed: &ChangeFeed, db: &Database) -> bool {
    db.create_milestone(&MilestoneDraft::new(1, "after start"))
        .expect("write succeeds");
    feed.recv_timeout(Duration::from_millis(2300)).is_some()
}

#[test]
fn test_poll_feed_sees_writes_from_another_handle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.db");
    let reader = Database::open_at(&path).unwrap();
    let writer = Database::open_at(&path).unwrap();

    let feed = ChangeFeed::start(reader.path(), options(WatchBackend::Poll)).unwrap();
    assert_eq!(feed.backend(), ActiveBackend::Poll);
    assert!(write_once_and_wait(&feed, &writer));
}

#[test]
fn test_native_feed_sees_writes_from_another_handle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.db");
    let reader = Database::open_at(&path).unwrap();
    let writer = Database::open_at(&path).unwrap();

    let feed = match ChangeFeed::start(reader.path(), options(WatchBackend::Native)) {
        Ok(feed) => feed,
        // No OS watcher in this environment
        Err(_) => return,
    };
    assert_eq!(feed.backend(), ActiveBackend::Native);
    assert!(write_once_and_wait(&feed, &writer));
}

#[test]
fn test_poll_feed_sees_each_of_repeated_starts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.db");
    let reader = Database::open_at(&path).unwrap();
    let writer = Database::open_at(&path).unwrap();

    for _ in 0..5 {
        let feed = ChangeFeed::start(
            reader.path(),
            WatchOptions {
                poll_interval_ms: 100,
                ..options(WatchBackend::Poll)
            },
        )
        .unwrap();
        assert!(write_once_and_wait(&feed, &writer));
    }
}

#[test]
fn test_fallback_poll_feed_sees_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.db");
    let reader = Database::open_at(&path).unwrap();
    let writer = Database::open_at(&path).unwrap();

    let feed = ChangeFeed::disabled()
        .or_poll(reader.path(), options(WatchBackend::Auto))
        .unwrap();
    assert_eq!(feed.backend(), ActiveBackend::Poll);
    assert!(write_once_and_wait(&feed, &writer));
}

#[test]
fn test_quiet_store_emits_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.db");
    let db = Database::open_at(&path).unwrap();

    let feed = ChangeFeed::start(db.path(), options(WatchBackend::Poll)).unwrap();
    assert!(feed.recv_timeout(Duration::from_millis(200)).is_none());
}

#[test]
fn test_drop_stops_feed_promptly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("board.db");
    Database::open_at(&path).unwrap();

    let feed = ChangeFeed::start(&path, WatchOptions {
        poll_interval_ms: 60_000,
        ..options(WatchBackend::Poll)
    })
    .unwrap();
    let started = Instant::now();
    drop(feed);
    assert!(started.elapsed() < Duration::from_secs(5));
}
