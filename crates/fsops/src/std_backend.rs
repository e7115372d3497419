use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use notify::RecursiveMode;
use notify_debouncer_full::{
    new_debouncer,
    notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use thiserror::Error;

use crate::{DirEntry, FsBackend, Metadata, ReadDir, VfsEvent};

/// Errors from the file watcher that mean some events may have been lost.
#[derive(Debug, Clone, Error)]
pub enum WatcherError {
    #[error("file watcher error: {error} (path: {path:?})")]
    Watcher {
        error: String,
        path: Option<PathBuf>,
    },

    #[error("file watcher requested a rescan; some file events were dropped")]
    RescanRequired,

    #[error("file watcher could not forward an event: {0}")]
    ChannelClosed(String),
}

/// `FsBackend` that uses `std::fs` (through `fs-err`) and the `notify` crate.
pub struct StdBackend {
    debouncer: Debouncer<notify::RecommendedWatcher, RecommendedCache>,
    watcher_receiver: Receiver<VfsEvent>,
    error_receiver: Receiver<WatcherError>,
    watches: HashSet<PathBuf>,
}

impl StdBackend {
    /// Creates a new StdBackend. Watcher errors are logged and forwarded to
    /// [`StdBackend::error_receiver`]; they never terminate the process.
    pub fn new() -> io::Result<StdBackend> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (error_tx, error_rx) = crossbeam_channel::unbounded();

        let debouncer = Self::create_debouncer(event_tx, error_tx)?;

        Ok(Self {
            debouncer,
            watcher_receiver: event_rx,
            error_receiver: error_rx,
            watches: HashSet::new(),
        })
    }

    #[cfg(test)]
    pub fn new_for_testing() -> StdBackend {
        Self::new().expect("could not start file watcher")
    }

    fn create_debouncer(
        event_tx: Sender<VfsEvent>,
        error_tx: Sender<WatcherError>,
    ) -> io::Result<Debouncer<notify::RecommendedWatcher, RecommendedCache>> {
        let report = move |err: WatcherError| {
            log::warn!("{}", err);
            let _ = error_tx.send(err);
        };

        new_debouncer(
            Duration::from_millis(50),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        for vfs_event in Self::convert_event(&event.event) {
                            if let Err(err) = event_tx.send(vfs_event) {
                                report(WatcherError::ChannelClosed(err.to_string()));
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        if error.paths.is_empty() {
                            report(WatcherError::RescanRequired);
                        } else {
                            report(WatcherError::Watcher {
                                error: format!("{:?}", error.kind),
                                path: error.paths.first().cloned(),
                            });
                        }
                    }
                }
            },
        )
        .map_err(|err| io::Error::other(format!("could not create file watcher: {err:?}")))
    }

    /// Convert a notify event to our VfsEvent(s). Renames surface as a
    /// removal of the old path and a creation of the new one.
    fn convert_event(event: &notify::Event) -> Vec<VfsEvent> {
        let paths = event.paths.iter().cloned();

        match &event.kind {
            EventKind::Create(
                CreateKind::File | CreateKind::Folder | CreateKind::Any | CreateKind::Other,
            ) => paths.map(VfsEvent::Create).collect(),

            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice()
            {
                [from, to, ..] => vec![VfsEvent::Remove(from.clone()), VfsEvent::Create(to.clone())],
                _ => Vec::new(),
            },
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.map(VfsEvent::Remove).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.map(VfsEvent::Create).collect()
            }

            EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => Vec::new(),
            EventKind::Modify(_) | EventKind::Other | EventKind::Any => {
                paths.map(VfsEvent::Write).collect()
            }

            EventKind::Remove(
                RemoveKind::File | RemoveKind::Folder | RemoveKind::Any | RemoveKind::Other,
            ) => paths.map(VfsEvent::Remove).collect(),
        }
    }

    /// Returns a receiver for errors raised on the watcher thread.
    pub fn error_receiver(&self) -> Receiver<WatcherError> {
        self.error_receiver.clone()
    }
}

impl FsBackend for StdBackend {
    fn read(&mut self, path: &Path) -> io::Result<Vec<u8>> {
        fs_err::read(path)
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs_err::write(path, data)
    }

    fn exists(&mut self, path: &Path) -> io::Result<bool> {
        // symlink_metadata so that a dangling link still counts as occupying
        // its path.
        match fs_err::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<ReadDir> {
        let entries: Result<Vec<_>, _> = fs_err::read_dir(path)?.collect();
        let mut entries = entries?;

        entries.sort_by_cached_key(|entry| entry.file_name());

        let inner = entries
            .into_iter()
            .map(|entry| Ok(DirEntry { path: entry.path() }));

        Ok(ReadDir {
            inner: Box::new(inner),
        })
    }

    fn create_dir(&mut self, path: &Path) -> io::Result<()> {
        fs_err::create_dir(path)
    }

    fn metadata(&mut self, path: &Path) -> io::Result<Metadata> {
        let inner = fs_err::metadata(path)?;

        Ok(Metadata {
            is_dir: inner.is_dir(),
            len: inner.len(),
        })
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        fs_err::rename(from, to)
    }

    fn copy_file(&mut self, from: &Path, to: &Path) -> io::Result<u64> {
        fs_err::copy(from, to)
    }

    fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        fs_err::remove_file(path)
    }

    fn remove_dir_all(&mut self, path: &Path) -> io::Result<()> {
        fs_err::remove_dir_all(path)
    }

    fn event_receiver(&self) -> Receiver<VfsEvent> {
        self.watcher_receiver.clone()
    }

    fn watch(&mut self, path: &Path) -> io::Result<()> {
        if path
            .ancestors()
            .any(|ancestor| self.watches.contains(ancestor))
        {
            return Ok(());
        }

        // Only record the watch once notify has accepted it.
        match self.debouncer.watch(path, RecursiveMode::Recursive) {
            Ok(()) => {
                log::debug!("Watching path: {}", path.display());
                self.watches.insert(path.to_path_buf());
                Ok(())
            }
            Err(err) => {
                log::warn!("Failed to watch path {}: {:?}", path.display(), err);
                Err(io::Error::other(format!("{:?}", err)))
            }
        }
    }
}
