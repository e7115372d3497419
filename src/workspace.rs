use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fsops::{FsError, StdBackend, Vfs};
use thiserror::Error;

use crate::boundary::CommandBoundary;
use crate::config::Config;
use crate::elevated::{
    ConsentProvider, ElevatedRunner, HelperProcessExecutor, LineInput, TerminalConsent,
};
use crate::engine::Engine;
use crate::history::HistoryStacks;
use crate::watcher::{HistoryWatcher, SuppressedPaths};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("could not start the filesystem backend: {0}")]
    Backend(#[source] io::Error),

    #[error("could not watch {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: FsError,
    },

    #[error("could not start the history watcher: {0}")]
    Watcher(#[source] io::Error),
}

/// A directory whose mutations are recorded and can be undone.
///
/// Owns the command boundary and, when watching is enabled, the thread that
/// keeps history consistent with outside changes.
pub struct Workspace {
    dir: PathBuf,
    boundary: CommandBoundary,

    #[allow(unused)]
    watcher: Option<HistoryWatcher>,
}

impl Workspace {
    /// Opens `dir`, asking for elevation consent on the terminal and reading
    /// the answers from `input`.
    pub fn open(dir: &Path, config: &Config, input: LineInput) -> Result<Self, WorkspaceError> {
        let consent: Arc<dyn ConsentProvider> = Arc::new(TerminalConsent::new(input));
        Self::open_with_consent(dir, config, Some(consent))
    }

    pub fn open_with_consent(
        dir: &Path,
        config: &Config,
        consent: Option<Arc<dyn ConsentProvider>>,
    ) -> Result<Self, WorkspaceError> {
        log::debug!("Opening workspace {}", dir.display());

        let backend = StdBackend::new().map_err(WorkspaceError::Backend)?;
        let watcher_errors = backend.error_receiver();
        let vfs = Arc::new(Vfs::new(backend));

        let history = Arc::new(Mutex::new(HistoryStacks::new(config.history_limit)));
        let suppressed = Arc::new(SuppressedPaths::new());

        let executor = HelperProcessExecutor::new(config.elevation.helper.clone());
        let mut runner = ElevatedRunner::new(Arc::new(executor))
            .with_elevation_enabled(config.elevation.enabled);
        if let Some(consent) = consent {
            runner = runner.with_consent(consent);
        }
        if let Some(root) = &config.root {
            runner = runner.with_root(root);
        }

        let engine = Engine::new(Arc::clone(&vfs), runner)
            .with_suppressed_paths(Arc::clone(&suppressed))
            .with_create_undo_policy(config.create_undo);
        let boundary = CommandBoundary::new(engine, Arc::clone(&history));

        let watcher = if config.watch {
            vfs.watch(dir).map_err(|source| WorkspaceError::Watch {
                path: dir.to_path_buf(),
                source,
            })?;

            let watcher = HistoryWatcher::start(
                history,
                suppressed,
                vfs.event_receiver(),
                Some(watcher_errors),
            )
            .map_err(WorkspaceError::Watcher)?;
            Some(watcher)
        } else {
            None
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            boundary,
            watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn boundary(&self) -> &CommandBoundary {
        &self.boundary
    }

    /// Resolves `path` against the workspace directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }
}
