//! File system watching for the OS file system.
//!
//! [`FileWatcher`] turns raw `notify` events into batches of [`FileChange`]s,
//! debounced on a background thread, and hands each batch to a callback.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use anyhow::anyhow;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use notify::event::ModifyKind;
use notify::Config;
use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use tsls_source::FileChange;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct WatchConfig {
    pub enabled: bool,
    /// Directories watched recursively.
    pub roots: Vec<Utf8PathBuf>,
    /// Events are collected for this long before a batch is flushed.
    pub debounce_ms: u64,
    /// `*.ext` suffixes or file names; empty includes everything not excluded.
    pub include_patterns: Vec<String>,
    /// Path components that exclude everything below them.
    pub exclude_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            roots: Vec::new(),
            debounce_ms: 250,
            include_patterns: vec![
                "*.ts".to_string(),
                "tsls.toml".to_string(),
                ".tsls.toml".to_string(),
            ],
            exclude_patterns: vec![".git".to_string(), "node_modules".to_string()],
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn for_root(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            ..Self::default()
        }
    }

    fn includes(&self, path: &Utf8Path) -> bool {
        let excluded = path.components().any(|component| {
            self.exclude_patterns
                .iter()
                .any(|pattern| component.as_str() == pattern)
        });
        if excluded {
            return false;
        }

        if self.include_patterns.is_empty() {
            return true;
        }

        let Some(file_name) = path.file_name() else {
            return false;
        };
        self.include_patterns.iter().any(|pattern| {
            match pattern.strip_prefix('*') {
                Some(suffix) => file_name.ends_with(suffix),
                None => file_name == pattern,
            }
        })
    }
}

/// Watches the configured roots until dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    _handle: thread::JoinHandle<()>,
}

impl FileWatcher {
    /// Start watching. `on_change` runs on the watcher thread with each
    /// debounced batch.
    pub fn new<F>(config: WatchConfig, on_change: F) -> Result<Self>
    where
        F: Fn(Vec<FileChange>) + Send + 'static,
    {
        if !config.enabled {
            return Err(anyhow!("File watching is disabled"));
        }

        let (event_tx, event_rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => tracing::warn!("File watcher error: {err}"),
            },
            Config::default(),
        )?;

        for root in &config.roots {
            if root.is_dir() {
                watcher.watch(root.as_std_path(), RecursiveMode::Recursive)?;
                tracing::debug!("Watching {root}");
            }
        }

        let handle = thread::Builder::new()
            .name("tsls-watcher".to_string())
            .spawn(move || process_events(&event_rx, &config, &on_change))?;

        Ok(Self {
            _watcher: watcher,
            _handle: handle,
        })
    }
}

fn process_events<F>(event_rx: &mpsc::Receiver<Event>, config: &WatchConfig, on_change: &F)
where
    F: Fn(Vec<FileChange>),
{
    // Latest change per path wins within a batch.
    let mut pending: BTreeMap<Utf8PathBuf, FileChange> = BTreeMap::new();
    let mut last_flush = Instant::now();
    let debounce = Duration::from_millis(config.debounce_ms);

    loop {
        match event_rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                for change in convert_event(event, config) {
                    if let Some(path) = change.path() {
                        pending.insert(path.to_owned(), change);
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if !pending.is_empty() && last_flush.elapsed() >= debounce {
            let batch: Vec<FileChange> = std::mem::take(&mut pending).into_values().collect();
            tracing::trace!(count = batch.len(), "Flushing file changes");
            on_change(batch);
            last_flush = Instant::now();
        }
    }
}

fn convert_event(event: Event, config: &WatchConfig) -> Vec<FileChange> {
    event
        .paths
        .into_iter()
        .filter_map(|path| Utf8PathBuf::from_path_buf(path).ok())
        .filter(|path| config.includes(path))
        .filter_map(|path| match event.kind {
            EventKind::Create(_) => Some(FileChange::Added(path)),
            EventKind::Remove(_) => Some(FileChange::Removed(path)),
            // A rename reports both ends; whichever still exists was added.
            EventKind::Modify(ModifyKind::Name(_)) => {
                if path.exists() {
                    Some(FileChange::Added(path))
                } else {
                    Some(FileChange::Removed(path))
                }
            }
            EventKind::Modify(_) => Some(FileChange::Modified(path)),
            _ => None,
        })
        .collect()
}
