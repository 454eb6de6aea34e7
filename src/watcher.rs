//! Filesystem watcher feeding the incremental pipeline
//!
//! Watches each configured source root recursively and coalesces rapid
//! bursts of change events (saves, branch switches) into a single debounced
//! batch before invoking the callback. The callback typically schedules a
//! file check followed by a file-list rescan.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::EngineError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEBOUNCE: Duration = Duration::from_secs(1);

fn is_php_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("php") | Some("phtml")
    )
}

pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
}

impl SourceWatcher {
    /// Watch `roots` and invoke `on_change` with each debounced batch of
    /// changed PHP paths. The watcher stops when this handle is dropped.
    pub fn new<F>(roots: &[PathBuf], on_change: F) -> Result<Self, EngineError>
    where
        F: Fn(HashSet<PathBuf>) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            Config::default(),
        )?;

        for root in roots {
            if let Err(err) = watcher.watch(root, RecursiveMode::Recursive) {
                warn!(root = %root.display(), error = %err, "cannot watch source root");
            }
        }

        std::thread::Builder::new()
            .name("phplens-watch".into())
            .spawn(move || debounce_loop(rx, on_change))?;

        Ok(Self { _watcher: watcher })
    }
}

fn debounce_loop<F>(rx: mpsc::Receiver<Event>, on_change: F)
where
    F: Fn(HashSet<PathBuf>),
{
    let mut pending: HashSet<PathBuf> = HashSet::new();
    let mut last_change = Instant::now();

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                pending.extend(event.paths.iter().filter(|p| is_php_file(p)).cloned());
                last_change = Instant::now();
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !pending.is_empty() && last_change.elapsed() > DEBOUNCE {
                    on_change(std::mem::take(&mut pending));
                }
            }
        }
    }
}
