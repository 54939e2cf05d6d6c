//! Plugin directory watcher for hotclaw
//!
//! Watches one directory of plugin files and reports debounced, classified
//! changes: `Added`, `Changed`, or `Removed`. Raw filesystem notifications
//! arrive in bursts (editors write temp files, compilers touch the output
//! several times), so each path gets a quiet-period deadline and is only
//! classified once the deadline passes.
//!
//! Classification compares the filesystem against the watcher's known set:
//! a path that exists but was unknown is `Added`, known and existing is
//! `Changed`, known and missing is `Removed`, unknown and missing is noise.
//! Files already present at spawn are reported as `Added` before any live
//! notification, so startup and hot-add flow through one code path.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{HotclawError, Result};

/// A classified plugin file change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginFileEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Removed(PathBuf),
}

impl PluginFileEvent {
    /// The path this event concerns.
    pub fn path(&self) -> &Path {
        match self {
            PluginFileEvent::Added(path)
            | PluginFileEvent::Changed(path)
            | PluginFileEvent::Removed(path) => path,
        }
    }
}

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directory holding plugin files. Not scanned recursively.
    pub root: PathBuf,
    /// File extensions that count as plugin files.
    pub extensions: Vec<String>,
    /// Quiet period a path must hold before its change is classified.
    pub debounce: Duration,
    /// How often pending deadlines are checked.
    pub tick: Duration,
}

impl WatchConfig {
    /// Creates a config for `root` with the standard artifact extensions
    /// (`so`, `dylib`, `dll`), a 200ms debounce, and a 50ms tick.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["so".to_string(), "dylib".to_string(), "dll".to_string()],
            debounce: Duration::from_millis(200),
            tick: Duration::from_millis(50),
        }
    }

    /// Replaces the watched extensions.
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|ext| ext.to_string()).collect();
        self
    }

    /// Sets the debounce quiet period.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// A running plugin directory watch.
///
/// Dropping (or [`stop`](PluginWatcher::stop)ping) the watcher ends the
/// background task and releases the filesystem watch.
pub struct PluginWatcher {
    task: tokio::task::JoinHandle<()>,
}

impl PluginWatcher {
    /// Starts watching per `config`.
    ///
    /// Performs an initial scan first: every matching file already in the
    /// directory produces one `Added` event, queued before anything the
    /// live watch reports.
    ///
    /// # Errors
    ///
    /// - `HotclawError::Watch` if the root is missing or not a directory
    /// - `HotclawError::Watch` if the notify backend fails to start
    pub fn spawn(
        config: WatchConfig,
    ) -> Result<(PluginWatcher, mpsc::UnboundedReceiver<PluginFileEvent>)> {
        if !config.root.is_dir() {
            return Err(HotclawError::Watch(format!(
                "Watch root {} is not a directory",
                config.root.display()
            )));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (fs_tx, fs_rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = fs_tx.send(res);
        })
        .map_err(|e| HotclawError::Watch(format!("Watcher init failed: {}", e)))?;
        watcher
            .watch(&config.root, RecursiveMode::NonRecursive)
            .map_err(|e| {
                HotclawError::Watch(format!(
                    "Cannot watch {}: {}",
                    config.root.display(),
                    e
                ))
            })?;

        // Initial scan. Receivers see these before any live event.
        let mut known = HashSet::new();
        for entry in fs::read_dir(&config.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && matches_extension(&path, &config.extensions) {
                debug!(path = %path.display(), "Plugin file present at scan");
                let _ = event_tx.send(PluginFileEvent::Added(path.clone()));
                known.insert(path);
            }
        }

        info!(
            root = %config.root.display(),
            preexisting = known.len(),
            "Plugin watch started"
        );
        let task = tokio::spawn(run_watch_loop(config, watcher, fs_rx, event_tx, known));
        Ok((PluginWatcher { task }, event_rx))
    }

    /// Stops the watch.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for PluginWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The debounce loop: collect raw notifications into per-path deadlines,
/// classify and emit once a path stays quiet for the debounce period.
async fn run_watch_loop(
    config: WatchConfig,
    watcher: RecommendedWatcher,
    mut fs_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    event_tx: mpsc::UnboundedSender<PluginFileEvent>,
    mut known: HashSet<PathBuf>,
) {
    // The backend stops when this binding drops with the task.
    let _watcher = watcher;
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let mut tick = tokio::time::interval(config.tick);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            raw = fs_rx.recv() => match raw {
                Some(Ok(event)) => {
                    for path in event.paths {
                        if matches_extension(&path, &config.extensions) {
                            pending.insert(path, Instant::now() + config.debounce);
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "File watcher backend error");
                }
                None => break,
            },
            _ = tick.tick() => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    pending.remove(&path);
                    if let Some(event) = classify(&path, &mut known) {
                        debug!(event = ?event, "Plugin file change");
                        if event_tx.send(event).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Classifies a settled path against the known set, updating the set.
fn classify(path: &Path, known: &mut HashSet<PathBuf>) -> Option<PluginFileEvent> {
    let exists = path.is_file();
    let was_known = known.contains(path);
    match (exists, was_known) {
        (true, false) => {
            known.insert(path.to_path_buf());
            Some(PluginFileEvent::Added(path.to_path_buf()))
        }
        (true, true) => Some(PluginFileEvent::Changed(path.to_path_buf())),
        (false, true) => {
            known.remove(path);
            Some(PluginFileEvent::Removed(path.to_path_buf()))
        }
        (false, false) => None,
    }
}

/// Whether a path carries one of the watched extensions.
fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|watched| watched == ext))
        .unwrap_or(false)
}
