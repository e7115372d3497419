//! The trust gate in front of the history engine.
//!
//! Every entry point takes the caller's [`SessionId`] and checks it against
//! the one generated for this boundary before it touches the history stacks
//! or the filesystem. Untrusted callers get an inert negative answer.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::action::Direction;
use crate::elevated::{ElevatedError, OperationDescriptor};
use crate::engine::{Engine, Operation};
use crate::history::HistoryStacks;
use crate::session_id::SessionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub elevated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    fn ok(elevated: bool) -> Self {
        Self {
            success: true,
            elevated,
            error: None,
        }
    }

    fn failed(elevated: bool, error: impl Into<String>) -> Self {
        Self {
            success: false,
            elevated,
            error: Some(error.into()),
        }
    }
}

impl From<ElevatedError> for OperationResult {
    fn from(err: ElevatedError) -> Self {
        OperationResult::failed(err.was_elevated(), err.to_string())
    }
}

pub struct CommandBoundary {
    session_id: SessionId,
    history: Arc<Mutex<HistoryStacks>>,
    engine: Engine,
}

impl CommandBoundary {
    pub fn new(engine: Engine, history: Arc<Mutex<HistoryStacks>>) -> Self {
        Self {
            session_id: SessionId::new(),
            history,
            engine,
        }
    }

    /// The token a caller must present. Hand it only to the trusted caller.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The shared stacks, for the filesystem watcher.
    pub fn history(&self) -> Arc<Mutex<HistoryStacks>> {
        Arc::clone(&self.history)
    }

    fn trusts(&self, caller: SessionId, entry_point: &str) -> bool {
        if caller == self.session_id {
            true
        } else {
            log::warn!("Rejected {} from an untrusted caller", entry_point);
            false
        }
    }

    /// The lock is never held across filesystem I/O; callers take it once to
    /// pop and again to push.
    fn lock(&self) -> MutexGuard<'_, HistoryStacks> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn undo(&self, caller: SessionId) -> CommandResult {
        if !self.trusts(caller, "undo") {
            return CommandResult::failed("cannot undo");
        }

        let Some(action) = self.lock().pop_undo() else {
            return CommandResult::failed("Nothing to undo");
        };

        match self.engine.apply(action, Direction::Undo) {
            Ok(action) => {
                log::info!("Undid {}", action.describe());
                self.lock().push_redo(action);
                CommandResult::ok()
            }
            Err(failure) => {
                log::warn!("Undo failed: {}", failure);
                self.lock().restore_undo(failure.restore);
                CommandResult::failed(failure.error.to_string())
            }
        }
    }

    pub fn redo(&self, caller: SessionId) -> CommandResult {
        if !self.trusts(caller, "redo") {
            return CommandResult::failed("cannot redo");
        }

        let Some(action) = self.lock().pop_redo() else {
            return CommandResult::failed("Nothing to redo");
        };

        match self.engine.apply(action, Direction::Redo) {
            Ok(action) => {
                log::info!("Redid {}", action.describe());
                self.lock().restore_undo(action);
                CommandResult::ok()
            }
            Err(failure) => {
                log::warn!("Redo failed: {}", failure);
                self.lock().push_redo(failure.restore);
                CommandResult::failed(failure.error.to_string())
            }
        }
    }

    pub fn get_state(&self, caller: SessionId) -> HistoryState {
        if !self.trusts(caller, "get_state") {
            return HistoryState {
                can_undo: false,
                can_redo: false,
            };
        }

        let history = self.lock();
        HistoryState {
            can_undo: history.can_undo(),
            can_redo: history.can_redo(),
        }
    }

    /// Runs a single descriptor, asking for elevation if needed. Nothing is
    /// recorded in history.
    pub fn execute_elevated(
        &self,
        caller: SessionId,
        descriptor: &OperationDescriptor,
    ) -> OperationResult {
        if !self.trusts(caller, "execute_elevated") {
            return OperationResult::failed(false, "untrusted caller");
        }

        match self.engine.execute(descriptor) {
            Ok(elevation) => OperationResult::ok(elevation.was_elevated()),
            Err(err) => {
                log::warn!("{} failed: {}", descriptor.describe(), err);
                err.into()
            }
        }
    }

    /// Performs a new mutation and records it in history. A partially
    /// successful batch records the part that happened.
    pub fn perform(&self, caller: SessionId, operation: Operation) -> OperationResult {
        if !self.trusts(caller, "perform") {
            return OperationResult::failed(false, "untrusted caller");
        }

        match self.engine.perform(operation) {
            Ok(performed) => {
                log::info!("Performed {}", performed.action.describe());
                self.lock().push_undo(performed.action);
                OperationResult::ok(performed.elevated)
            }
            Err(failure) => {
                log::warn!("Operation failed: {}", failure.error);
                if let Some(action) = failure.recorded {
                    self.lock().push_undo(action);
                }
                OperationResult::failed(failure.error.was_elevated(), failure.error.to_string())
            }
        }
    }

    /// Drops history made stale by an outside change to `path`. Returns the
    /// number of entries removed.
    pub fn invalidate(&self, caller: SessionId, path: &Path) -> usize {
        if !self.trusts(caller, "invalidate") {
            return 0;
        }

        self.lock().invalidate_for_path(path)
    }

    pub fn reset(&self, caller: SessionId) -> CommandResult {
        if !self.trusts(caller, "reset") {
            return CommandResult::failed("untrusted caller");
        }

        self.lock().clear_all();
        log::debug!("History cleared");
        CommandResult::ok()
    }
}
