//! The recorded, reversible description of one filesystem mutation.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which way an [`Action`] is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Undo,
    Redo,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Undo => "undo",
            Direction::Redo => "redo",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation that has been performed and can be reversed.
///
/// An action always describes the mutation in its forward direction. Whether
/// it is undone or redone depends on the stack it is taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    /// An item was created at `path`.
    #[serde(rename_all = "camelCase")]
    Create { path: PathBuf, is_directory: bool },

    /// The item at `old_path` was renamed to `new_path`.
    #[serde(rename_all = "camelCase")]
    Rename {
        old_path: PathBuf,
        old_name: String,
        new_path: PathBuf,
        new_name: String,
    },

    /// Items were moved into `dest_path`. `source_paths` are their current,
    /// post-move locations. Where they came from is described either
    /// per item by `original_paths` or collectively by `original_parent`.
    #[serde(rename_all = "camelCase")]
    Move {
        source_paths: Vec<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_paths: Option<Vec<PathBuf>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_parent: Option<PathBuf>,
        dest_path: PathBuf,
    },
}

impl Action {
    /// Builds the action recorded for renaming `old_path` to `new_name`
    /// within the same parent directory.
    pub fn rename(old_path: &Path, new_name: &str) -> Action {
        Action::Rename {
            old_path: old_path.to_path_buf(),
            old_name: file_name(old_path),
            new_path: sibling(old_path, new_name),
            new_name: new_name.to_owned(),
        }
    }

    /// A short human readable summary, used in log lines and prompts.
    pub fn describe(&self) -> String {
        match self {
            Action::Create { path, is_directory } => {
                let noun = if *is_directory { "folder" } else { "file" };
                format!("create {} {}", noun, path.display())
            }
            Action::Rename {
                old_name, new_name, ..
            } => format!("rename {} to {}", old_name, new_name),
            Action::Move {
                source_paths,
                dest_path,
                ..
            } => {
                let noun = if source_paths.len() == 1 {
                    "item"
                } else {
                    "items"
                };
                format!(
                    "move {} {} into {}",
                    source_paths.len(),
                    noun,
                    dest_path.display()
                )
            }
        }
    }
}

/// The path called `name` next to `path`.
pub fn sibling(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Final component of `path` as a display string, falling back to the whole
/// path for roots.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
