//! Change notification for the shared state file
//!
//! Any process may write the board at any time, so readers learn about changes
//! by observing the file rather than by being told. Two backends:
//!
//! - **native**: a `notify` watcher on the directory holding the state file.
//!   Bursts of events (a single commit touches the WAL several times) are
//!   collapsed by a debounce window that restarts on every event.
//! - **poll**: compares (mtime, length) of the state file and its WAL side-car
//!   on a fixed interval.
//!
//! Signals carry no payload beyond a sequence number. Consumers refetch.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::db::wal_path;

/// Which mechanism detects changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    /// Native, falling back to no push notifications if the watcher can't attach
    #[default]
    Auto,
    Native,
    Poll,
}

/// The mechanism a running feed actually uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveBackend {
    Native,
    Poll,
    /// No push notifications; consumers rely on their own periodic refetch
    Disabled,
}

impl std::fmt::Display for ActiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ActiveBackend::Native => "native",
            ActiveBackend::Poll => "poll",
            ActiveBackend::Disabled => "disabled",
        })
    }
}

/// `[watch]` section of the config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    #[serde(default)]
    pub backend: WatchBackend,

    /// Quiet period after the last filesystem event before a signal fires
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Fingerprint interval for the poll backend, and the refetch interval
    /// clients use when no signal arrives
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            backend: WatchBackend::default(),
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WatchOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_backend(mut self, backend: WatchBackend) -> Self {
        self.backend = backend;
        self
    }
}

/// "The state file changed; refetch"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeSignal {
    /// Starts at 1 and increases by one per signal emitted by this feed
    pub seq: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("cannot watch {}: {source}", .path.display())]
    Attach {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("failed to start watcher thread: {0}")]
    Spawn(#[from] std::io::Error),
}

enum Control {
    Touched,
    Stop,
}

/// A running change feed. Dropping it stops the watcher and joins its thread.
pub struct ChangeFeed {
    signals: Receiver<ChangeSignal>,
    control: Option<Sender<Control>>,
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
    backend: ActiveBackend,
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("backend", &self.backend)
            .finish()
    }
}

impl ChangeFeed {
    /// Start watching the state file at `db_path`
    pub fn start(db_path: &Path, options: WatchOptions) -> Result<Self, WatchError> {
        match options.backend {
            WatchBackend::Native => Self::native(db_path, options.debounce()),
            WatchBackend::Poll => Self::poll(db_path, options.poll_interval()),
            WatchBackend::Auto => match Self::native(db_path, options.debounce()) {
                Ok(feed) => Ok(feed),
                Err(e) => {
                    warn!(error = %e, "file watcher unavailable, falling back to periodic refresh");
                    Ok(Self::disabled())
                }
            },
        }
    }

    /// A feed that never signals
    pub fn disabled() -> Self {
        let (_tx, signals) = mpsc::channel();
        Self {
            signals,
            control: None,
            watcher: None,
            worker: None,
            backend: ActiveBackend::Disabled,
        }
    }

    fn native(db_path: &Path, window: Duration) -> Result<Self, WatchError> {
        let dir = watch_dir(db_path);
        let names = watched_names(db_path);

        let (control_tx, control_rx) = mpsc::channel();
        let (signal_tx, signals) = mpsc::channel();

        let event_tx = control_tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let relevant = event.paths.iter().any(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| names.iter().any(|w| w == n))
                    });
                    if relevant {
                        let _ = event_tx.send(Control::Touched);
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            },
            notify::Config::default(),
        )
        .map_err(|source| WatchError::Attach {
            path: dir.clone(),
            source,
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Attach {
                path: dir.clone(),
                source,
            })?;

        let worker = thread::Builder::new()
            .name("agentboard-debounce".to_string())
            .spawn(move || debounce_loop(control_rx, signal_tx, window))?;

        debug!(dir = %dir.display(), "watching state directory");
        Ok(Self {
            signals,
            control: Some(control_tx),
            watcher: Some(watcher),
            worker: Some(worker),
            backend: ActiveBackend::Native,
        })
    }

    fn poll(db_path: &Path, interval: Duration) -> Result<Self, WatchError> {
        let (control_tx, control_rx) = mpsc::channel();
        let (signal_tx, signals) = mpsc::channel();
        let path = db_path.to_path_buf();
        // Baseline before returning, so a write right after start still differs
        let baseline = fingerprint(db_path);

        let worker = thread::Builder::new()
            .name("agentboard-poll".to_string())
            .spawn(move || poll_loop(&path, baseline, control_rx, signal_tx, interval))?;

        debug!(path = %db_path.display(), ?interval, "polling state file");
        Ok(Self {
            signals,
            control: Some(control_tx),
            watcher: None,
            worker: Some(worker),
            backend: ActiveBackend::Poll,
        })
    }

    /// Swap a feed without push notifications for a poll feed. Other feeds
    /// are returned unchanged.
    pub fn or_poll(self, db_path: &Path, options: WatchOptions) -> Result<Self, WatchError> {
        if self.backend != ActiveBackend::Disabled {
            return Ok(self);
        }
        debug!("no push notifications, polling the state file instead");
        Self::poll(db_path, options.poll_interval())
    }

    pub fn backend(&self) -> ActiveBackend {
        self.backend
    }

    /// Latest pending signal, if any. Older pending signals are discarded.
    pub fn try_recv(&self) -> Option<ChangeSignal> {
        let mut latest = None;
        loop {
            match self.signals.try_recv() {
                Ok(signal) => latest = Some(signal),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return latest,
            }
        }
    }

    /// Block up to `timeout` for a signal, then collapse any that queued behind it
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeSignal> {
        let first = self.signals.recv_timeout(timeout).ok()?;
        Some(self.try_recv().unwrap_or(first))
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        // Stop the OS watcher first so no new events race the shutdown
        self.watcher.take();
        if let Some(control) = self.control.take() {
            let _ = control.send(Control::Stop);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("change feed worker panicked");
            }
        }
    }
}

fn watch_dir(db_path: &Path) -> PathBuf {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// File names inside the watched directory that count as a change
fn watched_names(db_path: &Path) -> Vec<String> {
    [db_path.to_path_buf(), wal_path(db_path)]
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect()
}

/// Wait for a first event, then keep pushing the deadline out while events
/// keep arriving. One signal per burst.
fn debounce_loop(control: Receiver<Control>, signals: Sender<ChangeSignal>, window: Duration) {
    let mut seq = 0;
    loop {
        match control.recv() {
            Ok(Control::Touched) => {}
            Ok(Control::Stop) | Err(_) => return,
        }

        loop {
            match control.recv_timeout(window) {
                Ok(Control::Touched) => trace!("debounce window restarted"),
                Err(RecvTimeoutError::Timeout) => break,
                Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        seq += 1;
        debug!(seq, "state file changed");
        if signals.send(ChangeSignal { seq }).is_err() {
            return;
        }
    }
}

type Fingerprint = [Option<(SystemTime, u64)>; 2];

fn fingerprint(db_path: &Path) -> Fingerprint {
    let stat = |p: &Path| {
        std::fs::metadata(p)
            .ok()
            .and_then(|m| Some((m.modified().ok()?, m.len())))
    };
    [stat(db_path), stat(&wal_path(db_path))]
}

fn poll_loop(
    db_path: &Path,
    mut last: Fingerprint,
    control: Receiver<Control>,
    signals: Sender<ChangeSignal>,
    interval: Duration,
) {
    let mut seq = 0;
    loop {
        match control.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(Control::Touched) => continue,
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let current = fingerprint(db_path);
        if current != last {
            last = current;
            seq += 1;
            debug!(seq, "state file fingerprint changed");
            if signals.send(ChangeSignal { seq }).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_debounce_collapses_burst() {
        let (control_tx, control_rx) = mpsc::channel();
        let (signal_tx, signal_rx) = mpsc::channel();
        let window = Duration::from_millis(50);
        let worker = thread::spawn(move || debounce_loop(control_rx, signal_tx, window));

        for _ in 0..10 {
            control_tx.send(Control::Touched).unwrap();
            thread::sleep(Duration::from_millis(5));
        }

        let first = signal_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, ChangeSignal { seq: 1 });
        assert!(signal_rx.recv_timeout(Duration::from_millis(200)).is_err());

        control_tx.send(Control::Touched).unwrap();
        let second = signal_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(second.seq, 2);

        control_tx.send(Control::Stop).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_debounce_stops_mid_window() {
        let (control_tx, control_rx) = mpsc::channel();
        let (signal_tx, signal_rx) = mpsc::channel();
        let worker =
            thread::spawn(move || debounce_loop(control_rx, signal_tx, Duration::from_secs(60)));

        control_tx.send(Control::Touched).unwrap();
        control_tx.send(Control::Stop).unwrap();
        worker.join().unwrap();
        assert!(signal_rx.try_recv().is_err());
    }

    #[test]
    fn test_watched_names_include_wal() {
        let names = watched_names(Path::new("/data/board.db"));
        assert_eq!(names, vec!["board.db".to_string(), "board.db-wal".to_string()]);
        assert_eq!(watch_dir(Path::new("board.db")), PathBuf::from("."));
    }

    #[test]
    fn test_poll_backend_detects_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.db");
        std::fs::write(&path, b"seed").unwrap();

        let options = WatchOptions {
            backend: WatchBackend::Poll,
            poll_interval_ms: 20,
            ..WatchOptions::default()
        };
        let feed = ChangeFeed::start(&path, options).unwrap();
        assert_eq!(feed.backend(), ActiveBackend::Poll);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b" more").unwrap();
        file.sync_all().unwrap();

        let signal = feed.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(signal.seq, 1);
    }

    #[test]
    fn test_poll_sees_write_made_before_first_tick() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.db");
        std::fs::write(&path, b"seed").unwrap();

        // Long first tick: the write lands well before the worker's first look
        let feed = ChangeFeed::poll(&path, Duration::from_millis(200)).unwrap();
        std::fs::write(&path, b"seed plus").unwrap();

        assert!(feed.recv_timeout(Duration::from_secs(2)).is_some());
    }

    #[test]
    fn test_poll_loop_compares_against_given_baseline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.db");
        std::fs::write(&path, b"seed").unwrap();
        let baseline = fingerprint(&path);
        std::fs::write(&path, b"changed").unwrap();

        let (control_tx, control_rx) = mpsc::channel();
        let (signal_tx, signal_rx) = mpsc::channel();
        let worker_path = path.clone();
        let worker = thread::spawn(move || {
            poll_loop(&worker_path, baseline, control_rx, signal_tx, Duration::from_millis(10))
        });

        let signal = signal_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(signal.seq, 1);
        control_tx.send(Control::Stop).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_disabled_feed_falls_back_to_poll() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.db");
        std::fs::write(&path, b"seed").unwrap();
        let options = WatchOptions {
            poll_interval_ms: 20,
            ..WatchOptions::default()
        };

        let feed = ChangeFeed::disabled().or_poll(&path, options).unwrap();
        assert_eq!(feed.backend(), ActiveBackend::Poll);

        std::fs::write(&path, b"seed and more").unwrap();
        assert!(feed.recv_timeout(Duration::from_secs(2)).is_some());
    }

    #[test]
    fn test_or_poll_keeps_active_feed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.db");
        let options = WatchOptions::default().with_backend(WatchBackend::Poll);
        let feed = ChangeFeed::start(&path, options).unwrap();
        let feed = feed.or_poll(&path, options).unwrap();
        assert_eq!(feed.backend(), ActiveBackend::Poll);
    }

    #[test]
    fn test_disabled_feed_never_signals() {
        let feed = ChangeFeed::disabled();
        assert_eq!(feed.backend(), ActiveBackend::Disabled);
        assert!(feed.try_recv().is_none());
        assert!(feed.recv_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_drop_joins_worker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.db");
        let options = WatchOptions::default().with_backend(WatchBackend::Poll);
        let feed = ChangeFeed::start(&path, options).unwrap();
        let started = std::time::Instant::now();
        drop(feed);
        // The poll thread wakes on Stop rather than finishing its 2s sleep
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
