pub mod action;
pub mod boundary;
pub mod cli;
pub mod config;
pub mod elevated;
pub mod engine;
pub mod history;
pub mod logging;
mod session_id;
pub mod watcher;
pub mod workspace;

pub use action::{Action, Direction};
pub use boundary::{CommandBoundary, CommandResult, HistoryState, OperationResult};
pub use engine::{Engine, ExecError, Operation};
pub use history::HistoryStacks;
pub use session_id::SessionId;
pub use workspace::Workspace;
