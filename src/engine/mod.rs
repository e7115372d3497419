//! Applies recorded actions to the filesystem in either direction, and
//! performs new mutations that produce actions.

mod transfer;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fsops::{FsError, FsResultExt, Vfs};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{file_name, sibling, Action, Direction};
use crate::elevated::{
    ElevatedError, ElevatedRunner, Elevation, OperationDescriptor, OperationKind, ValidationError,
};
use crate::watcher::SuppressedPaths;

pub use self::transfer::move_path;

/// What undoing the creation of a directory does once that directory has
/// gained contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CreateUndoPolicy {
    /// Leave the directory alone and fail the undo.
    #[default]
    RefuseNonEmpty,
    /// Remove the directory and everything in it.
    ForceRecursive,
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0} no longer exists")]
    Missing(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} is no longer empty")]
    NotEmpty(String),

    #[error("original parent path not available")]
    OriginalParentUnavailable,

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Elevated(#[from] ElevatedError),

    /// A batch move stopped after moving `moved` of its items.
    #[error("Partial {direction} failed: {cause}")]
    Partial {
        direction: Direction,
        moved: usize,
        cause: Box<ExecError>,
    },

    /// A new batch move stopped after moving `moved` of `total` items.
    #[error("Moved {moved} of {total} items: {cause}")]
    PartialMove {
        moved: usize,
        total: usize,
        cause: Box<ExecError>,
    },
}

impl ExecError {
    /// Whether the privileged executor took part in the failure.
    pub fn was_elevated(&self) -> bool {
        match self {
            ExecError::Elevated(err) => err.was_elevated(),
            ExecError::Partial { cause, .. } | ExecError::PartialMove { cause, .. } => {
                cause.was_elevated()
            }
            _ => false,
        }
    }
}

/// An action that could not be applied, together with the action that must
/// go back onto the stack it came from. After a partial batch failure that
/// is the residual covering only the items that were not moved.
#[derive(Debug)]
pub struct ApplyFailure {
    pub error: ExecError,
    pub restore: Action,
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for ApplyFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A new user mutation, as opposed to the replay of a recorded one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Operation {
    CreateFile {
        path: PathBuf,
    },
    CreateFolder {
        path: PathBuf,
    },
    #[serde(rename_all = "camelCase")]
    Rename {
        path: PathBuf,
        new_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Move {
        sources: Vec<PathBuf>,
        dest_dir: PathBuf,
    },
}

/// The result of a successful [`Engine::perform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Performed {
    pub action: Action,
    pub elevated: bool,
}

/// A failed [`Engine::perform`]. `recorded` holds the action describing
/// whatever part of the operation did happen.
#[derive(Debug)]
pub struct PerformFailure {
    pub error: ExecError,
    pub recorded: Option<Action>,
}

impl From<ExecError> for PerformFailure {
    fn from(error: ExecError) -> Self {
        Self {
            error,
            recorded: None,
        }
    }
}

pub struct Engine {
    vfs: Arc<Vfs>,
    runner: ElevatedRunner,
    suppressed: Arc<SuppressedPaths>,
    create_undo: CreateUndoPolicy,
}

impl Engine {
    pub fn new(vfs: Arc<Vfs>, runner: ElevatedRunner) -> Self {
        Self {
            vfs,
            runner,
            suppressed: Arc::new(SuppressedPaths::new()),
            create_undo: CreateUndoPolicy::default(),
        }
    }

    pub fn with_suppressed_paths(mut self, suppressed: Arc<SuppressedPaths>) -> Self {
        self.suppressed = suppressed;
        self
    }

    pub fn with_create_undo_policy(mut self, policy: CreateUndoPolicy) -> Self {
        self.create_undo = policy;
        self
    }

    pub fn suppressed_paths(&self) -> &Arc<SuppressedPaths> {
        &self.suppressed
    }

    /// Undoes or redoes `action`. On success the action is handed back to be
    /// pushed onto the opposite stack.
    pub fn apply(&self, action: Action, direction: Direction) -> Result<Action, ApplyFailure> {
        log::debug!("Applying {} of {}", direction, action.describe());

        let result = match &action {
            Action::Create { path, is_directory } => {
                self.apply_create(path, *is_directory, direction)
            }
            Action::Rename {
                old_path, new_path, ..
            } => match direction {
                Direction::Undo => self.apply_rename(new_path, old_path),
                Direction::Redo => self.apply_rename(old_path, new_path),
            },
            Action::Move { .. } => return self.apply_move(action, direction),
        };

        match result {
            Ok(()) => Ok(action),
            Err(error) => {
                log::debug!("{} of {} failed: {}", direction, action.describe(), error);
                Err(ApplyFailure {
                    error,
                    restore: action,
                })
            }
        }
    }

    fn apply_create(
        &self,
        path: &Path,
        is_directory: bool,
        direction: Direction,
    ) -> Result<(), ExecError> {
        match direction {
            Direction::Undo => {
                let Some(meta) = self.vfs.metadata(path).with_not_found()? else {
                    return Err(ExecError::Missing(file_name(path)));
                };

                if meta.is_dir()
                    && self.create_undo == CreateUndoPolicy::RefuseNonEmpty
                    && !self.vfs.is_empty_dir(path)?
                {
                    return Err(ExecError::NotEmpty(file_name(path)));
                }

                self.delete(path)?;
            }
            Direction::Redo => {
                if self.vfs.exists(path)? {
                    return Err(ExecError::AlreadyExists(file_name(path)));
                }

                if is_directory {
                    self.create_folder(path)?;
                } else {
                    self.create_file(path)?;
                }
            }
        }

        Ok(())
    }

    fn apply_rename(&self, from: &Path, to: &Path) -> Result<(), ExecError> {
        self.check_transfer(from, to)?;
        self.rename_to(from, to)?;
        Ok(())
    }

    fn apply_move(&self, action: Action, direction: Direction) -> Result<Action, ApplyFailure> {
        let pairs = match move_pairs(&action, direction) {
            Ok(pairs) => pairs,
            Err(error) => {
                return Err(ApplyFailure {
                    error,
                    restore: action,
                })
            }
        };

        if let Some((from, to)) = pairs.first() {
            if let Err(error) = self.check_transfer(from, to) {
                return Err(ApplyFailure {
                    error,
                    restore: action,
                });
            }
        }

        for (index, (from, to)) in pairs.iter().enumerate() {
            let result = self
                .check_transfer(from, to)
                .and_then(|()| self.move_item(from, to).map_err(ExecError::from));

            if let Err(cause) = result {
                log::debug!(
                    "{} of {} stopped after {} items: {}",
                    direction,
                    action.describe(),
                    index,
                    cause
                );

                let restore = if index == 0 {
                    action
                } else {
                    residual(&action, index)
                };

                return Err(ApplyFailure {
                    error: ExecError::Partial {
                        direction,
                        moved: index,
                        cause: Box::new(cause),
                    },
                    restore,
                });
            }
        }

        Ok(action)
    }

    /// The source of a transfer must exist and its destination must not.
    fn check_transfer(&self, from: &Path, to: &Path) -> Result<(), ExecError> {
        if !self.vfs.exists(from)? {
            return Err(ExecError::Missing(file_name(from)));
        }
        if self.vfs.exists(to)? {
            return Err(ExecError::AlreadyExists(file_name(to)));
        }
        Ok(())
    }

    /// Performs a new mutation. Its action is returned for recording.
    pub fn perform(&self, operation: Operation) -> Result<Performed, PerformFailure> {
        log::debug!("Performing {:?}", operation);

        match operation {
            Operation::CreateFile { path } => {
                let descriptor = OperationDescriptor::create_file(&path);
                descriptor.validate(self.runner.root()).map_err(ElevatedError::from)?;
                if self.vfs.exists(&path).map_err(ExecError::from)? {
                    return Err(ExecError::AlreadyExists(file_name(&path)).into());
                }

                let elevation = self.create_file(&path)?;
                Ok(Performed {
                    action: Action::Create {
                        path,
                        is_directory: false,
                    },
                    elevated: elevation.was_elevated(),
                })
            }
            Operation::CreateFolder { path } => {
                let descriptor = OperationDescriptor::create_folder(&path);
                descriptor.validate(self.runner.root()).map_err(ElevatedError::from)?;
                if self.vfs.exists(&path).map_err(ExecError::from)? {
                    return Err(ExecError::AlreadyExists(file_name(&path)).into());
                }

                let elevation = self.create_folder(&path)?;
                Ok(Performed {
                    action: Action::Create {
                        path,
                        is_directory: true,
                    },
                    elevated: elevation.was_elevated(),
                })
            }
            Operation::Rename { path, new_name } => {
                let descriptor = OperationDescriptor::rename(&path, new_name.as_str());
                descriptor.validate(self.runner.root()).map_err(ElevatedError::from)?;

                let new_path = sibling(&path, &new_name);
                self.check_transfer(&path, &new_path)?;

                let elevation = self.rename_to(&path, &new_path)?;
                Ok(Performed {
                    action: Action::rename(&path, &new_name),
                    elevated: elevation.was_elevated(),
                })
            }
            Operation::Move { sources, dest_dir } => self.perform_move(sources, dest_dir),
        }
    }

    fn perform_move(
        &self,
        sources: Vec<PathBuf>,
        dest_dir: PathBuf,
    ) -> Result<Performed, PerformFailure> {
        if sources.is_empty() {
            return Err(ElevatedError::from(ValidationError::SourceRequired).into());
        }

        let total = sources.len();
        let mut moved = Vec::with_capacity(total);
        let mut originals = Vec::with_capacity(total);
        let mut elevated = false;

        for source in sources {
            let result = source
                .file_name()
                .map(|name| dest_dir.join(name))
                .ok_or_else(|| ExecError::from(ElevatedError::from(ValidationError::InvalidSource)))
                .and_then(|target| {
                    let descriptor = OperationDescriptor::move_item(&source, &target);
                    descriptor
                        .validate(self.runner.root())
                        .map_err(ElevatedError::from)?;
                    self.check_transfer(&source, &target)?;
                    let elevation = self.move_item(&source, &target)?;
                    Ok((target, elevation.was_elevated()))
                });

            match result {
                Ok((target, item_elevated)) => {
                    elevated |= item_elevated;
                    moved.push(target);
                    originals.push(source);
                }
                Err(cause) if moved.is_empty() => return Err(cause.into()),
                Err(cause) => {
                    let error = ExecError::PartialMove {
                        moved: moved.len(),
                        total,
                        cause: Box::new(cause),
                    };
                    return Err(PerformFailure {
                        error,
                        recorded: Some(move_action(moved, originals, &dest_dir)),
                    });
                }
            }
        }

        Ok(Performed {
            action: move_action(moved, originals, &dest_dir),
            elevated,
        })
    }

    /// Runs an arbitrary descriptor through the elevated wrapper without
    /// recording anything.
    pub fn execute(
        &self,
        descriptor: &OperationDescriptor,
    ) -> Result<Elevation<()>, ElevatedError> {
        self.runner.run(descriptor, || {
            let source = descriptor.source_path.as_deref();
            let target = descriptor.target_path();

            match descriptor.kind {
                OperationKind::Copy => {
                    let (source, target) = (required(source)?, required(target.as_deref())?);
                    if self.vfs.metadata(source)?.is_dir() {
                        self.vfs.copy_dir_all(source, target)
                    } else {
                        self.vfs.copy_file(source, target).map(|_| ())
                    }
                }
                OperationKind::Move | OperationKind::Rename => {
                    let (source, target) = (required(source)?, required(target.as_deref())?);
                    self.suppressed.suppress(source);
                    move_path(&self.vfs, source, target)
                }
                OperationKind::Delete => {
                    let source = required(source)?;
                    self.suppressed.suppress(source);
                    self.vfs.remove_path(source)
                }
                OperationKind::CreateFolder => self.vfs.create_dir(required(target.as_deref())?),
                OperationKind::CreateFile => self.vfs.write(required(target.as_deref())?, b""),
            }
        })
    }

    fn delete(&self, path: &Path) -> Result<Elevation<()>, ElevatedError> {
        self.runner.run(&OperationDescriptor::delete(path), || {
            self.suppressed.suppress(path);
            self.vfs.remove_path(path)
        })
    }

    fn create_file(&self, path: &Path) -> Result<Elevation<()>, ElevatedError> {
        self.runner
            .run(&OperationDescriptor::create_file(path), || self.vfs.write(path, b""))
    }

    fn create_folder(&self, path: &Path) -> Result<Elevation<()>, ElevatedError> {
        self.runner
            .run(&OperationDescriptor::create_folder(path), || {
                self.vfs.create_dir(path)
            })
    }

    fn rename_to(&self, from: &Path, to: &Path) -> Result<Elevation<()>, ElevatedError> {
        let descriptor = OperationDescriptor::rename(from, file_name(to));
        self.runner.run(&descriptor, || {
            self.suppressed.suppress(from);
            move_path(&self.vfs, from, to)
        })
    }

    fn move_item(&self, from: &Path, to: &Path) -> Result<Elevation<()>, ElevatedError> {
        self.runner
            .run(&OperationDescriptor::move_item(from, to), || {
                self.suppressed.suppress(from);
                move_path(&self.vfs, from, to)
            })
    }
}

impl From<ElevatedError> for PerformFailure {
    fn from(error: ElevatedError) -> Self {
        ExecError::from(error).into()
    }
}

fn required(path: Option<&Path>) -> Result<&Path, FsError> {
    path.ok_or_else(|| {
        FsError::new(io::Error::new(
            io::ErrorKind::InvalidInput,
            "operation is missing a path",
        ))
    })
}

/// The (from, to) pairs a move action resolves to in `direction`.
fn move_pairs(action: &Action, direction: Direction) -> Result<Vec<(PathBuf, PathBuf)>, ExecError> {
    let Action::Move {
        source_paths,
        original_paths,
        original_parent,
        ..
    } = action
    else {
        return Ok(Vec::new());
    };

    source_paths
        .iter()
        .enumerate()
        .map(|(index, source)| {
            let original = original_paths
                .as_ref()
                .and_then(|originals| originals.get(index))
                .cloned()
                .or_else(|| {
                    let parent = original_parent.as_ref()?;
                    Some(parent.join(source.file_name()?))
                })
                .ok_or(ExecError::OriginalParentUnavailable)?;

            Ok(match direction {
                Direction::Undo => (source.clone(), original),
                Direction::Redo => (original, source.clone()),
            })
        })
        .collect()
}

/// The part of a move action covering the items from `index` on.
fn residual(action: &Action, index: usize) -> Action {
    let Action::Move {
        source_paths,
        original_paths,
        original_parent,
        dest_path,
    } = action
    else {
        return action.clone();
    };

    Action::Move {
        source_paths: source_paths.get(index..).unwrap_or_default().to_vec(),
        original_paths: original_paths
            .as_ref()
            .map(|originals| originals.get(index..).unwrap_or_default().to_vec()),
        original_parent: original_parent.clone(),
        dest_path: dest_path.clone(),
    }
}

fn move_action(moved: Vec<PathBuf>, originals: Vec<PathBuf>, dest_dir: &Path) -> Action {
    let first_parent = originals.first().and_then(|path| path.parent());
    let original_parent = first_parent
        .filter(|parent| originals.iter().all(|path| path.parent() == Some(*parent)))
        .map(Path::to_path_buf);

    Action::Move {
        source_paths: moved,
        original_paths: Some(originals),
        original_parent,
        dest_path: dest_dir.to_path_buf(),
    }
}
