use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, Receiver, Sender};
use fsops::{VfsEvent, WatcherError};
use jod_thread::JoinHandle;

use crate::history::HistoryStacks;

/// How long a path registered with [`SuppressedPaths`] stays suppressed.
const SUPPRESSION_WINDOW: Duration = Duration::from_secs(2);

/// Paths the engine itself is about to remove. Removal events for these
/// paths, or anything below them, are the engine's own echo and must not
/// invalidate history.
#[derive(Debug)]
pub struct SuppressedPaths {
    entries: Mutex<Vec<(PathBuf, Instant)>>,
    window: Duration,
}

impl Default for SuppressedPaths {
    fn default() -> Self {
        Self::with_window(SUPPRESSION_WINDOW)
    }
}

impl SuppressedPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            window,
        }
    }

    pub fn suppress(&self, path: &Path) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push((path.to_path_buf(), Instant::now()));
    }

    pub fn is_suppressed(&self, path: &Path) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let window = self.window;
        entries.retain(|(_, since)| since.elapsed() < window);
        entries.iter().any(|(prefix, _)| path.starts_with(prefix))
    }
}

/// Keeps the history stacks consistent with changes made to the filesystem
/// by other processes.
///
/// Owns a thread that listens to filesystem events. Dropping the watcher
/// stops and joins that thread.
pub struct HistoryWatcher {
    /// Signaled on drop so that the job thread leaves its loop.
    shutdown_sender: Sender<()>,

    #[allow(unused)]
    job_thread: JoinHandle<()>,
}

impl HistoryWatcher {
    pub fn start(
        history: Arc<Mutex<HistoryStacks>>,
        suppressed: Arc<SuppressedPaths>,
        events: Receiver<VfsEvent>,
        errors: Option<Receiver<WatcherError>>,
    ) -> std::io::Result<Self> {
        let (shutdown_sender, shutdown_receiver) = crossbeam_channel::bounded(1);
        let errors = errors.unwrap_or_else(never);

        let job_thread = jod_thread::Builder::new()
            .name("HistoryWatcher thread".to_owned())
            .spawn(move || {
                log::trace!("HistoryWatcher thread started");

                loop {
                    select! {
                        recv(events) -> event => match event {
                            Ok(event) => handle_event(&history, &suppressed, event),
                            Err(_) => {
                                log::debug!("Filesystem event channel closed");
                                return;
                            }
                        },
                        recv(errors) -> error => {
                            if let Ok(error) = error {
                                log::warn!("History may be out of date: {}", error);
                            }
                        },
                        recv(shutdown_receiver) -> _ => {
                            log::trace!("HistoryWatcher shutdown signal received");
                            return;
                        },
                    }
                }
            })?;

        Ok(Self {
            shutdown_sender,
            job_thread,
        })
    }
}

impl Drop for HistoryWatcher {
    fn drop(&mut self) {
        let _ = self.shutdown_sender.send(());
    }
}

fn handle_event(history: &Mutex<HistoryStacks>, suppressed: &SuppressedPaths, event: VfsEvent) {
    let VfsEvent::Remove(path) = event else {
        log::trace!("Ignoring filesystem event {:?}", event);
        return;
    };

    if suppressed.is_suppressed(&path) {
        log::trace!("Ignoring our own removal of {}", path.display());
        return;
    }

    let removed = history
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .invalidate_for_path(&path);

    if removed > 0 {
        log::info!(
            "{} was removed externally, dropped {} history entries",
            path.display(),
            removed
        );
    }
}
