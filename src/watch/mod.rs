use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use crate::catalog::CollectOptions;

/// Events emitted by the file watcher
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// One or more non-ignored files changed, as project-relative paths
    FilesChanged(Vec<String>),
    /// The watcher reported an error (e.g. the OS watch limit was hit)
    Error(String),
}

/// A debounced file watcher over the project root
pub struct FileWatcher {
    _watcher: notify_debouncer_mini::Debouncer<RecommendedWatcher>,
}

impl FileWatcher {
    /// Start watching a directory. Changed file events are sent to the provided sender.
    /// Events are debounced by `debounce_ms` milliseconds; ignored paths never reach `tx`.
    pub fn new(
        root: &Path,
        debounce_ms: u64,
        opts: CollectOptions,
        tx: mpsc::Sender<WatchEvent>,
    ) -> Result<Self> {
        let root_buf = root.to_path_buf();
        let mut debouncer = new_debouncer(
            Duration::from_millis(debounce_ms),
            move |result: std::result::Result<Vec<DebouncedEvent>, notify::Error>| {
                let event = match result {
                    Ok(events) => {
                        let paths = relevant_paths(
                            &root_buf,
                            events
                                .iter()
                                .filter(|e| e.kind == DebouncedEventKind::Any)
                                .map(|e| e.path.clone()),
                            &opts,
                        );
                        if paths.is_empty() {
                            return;
                        }
                        WatchEvent::FilesChanged(paths)
                    }
                    Err(e) => {
                        log::warn!("File watcher error: {}", e);
                        WatchEvent::Error(e.to_string())
                    }
                };
                // The receiver is gone only when the event loop has exited
                let _ = tx.send(event);
            },
        )?;

        debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
        log::info!("Watching {}", root.display());

        Ok(FileWatcher {
            _watcher: debouncer,
        })
    }
}

/// Project-relative, non-ignored paths among the changed ones, deduplicated
fn relevant_paths<I>(root: &Path, changed: I, opts: &CollectOptions) -> Vec<String>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut out: Vec<String> = Vec::new();
    for path in changed {
        let Some(rel) = crate::catalog::relative_path(root, &path) else {
            continue;
        };
        if rel.is_empty() || rel.ends_with(".cf-tmp") || opts.is_ignored(&rel) {
            continue;
        }
        if !out.contains(&rel) {
            out.push(rel);
        }
    }
    out
}
