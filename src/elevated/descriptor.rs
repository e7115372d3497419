//! Typed descriptions of single filesystem mutations, and the structural and
//! path-safety checks run on them before anything is attempted.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    Rename,
    CreateFolder,
    CreateFile,
}

/// One mutation, as handed to the elevated execution wrapper and, when
/// permission is denied, to the privileged executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
}

impl OperationDescriptor {
    fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            source_path: None,
            dest_path: None,
            new_name: None,
        }
    }

    pub fn copy(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source_path: Some(source.into()),
            dest_path: Some(dest.into()),
            ..Self::new(OperationKind::Copy)
        }
    }

    pub fn move_item(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source_path: Some(source.into()),
            dest_path: Some(dest.into()),
            ..Self::new(OperationKind::Move)
        }
    }

    pub fn delete(source: impl Into<PathBuf>) -> Self {
        Self {
            source_path: Some(source.into()),
            ..Self::new(OperationKind::Delete)
        }
    }

    pub fn rename(source: impl Into<PathBuf>, new_name: impl Into<String>) -> Self {
        Self {
            source_path: Some(source.into()),
            new_name: Some(new_name.into()),
            ..Self::new(OperationKind::Rename)
        }
    }

    pub fn create_folder(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest_path: Some(dest.into()),
            ..Self::new(OperationKind::CreateFolder)
        }
    }

    pub fn create_file(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest_path: Some(dest.into()),
            ..Self::new(OperationKind::CreateFile)
        }
    }

    /// Where the item ends up. For renames this is the source's sibling
    /// called `new_name`.
    pub fn target_path(&self) -> Option<PathBuf> {
        match self.kind {
            OperationKind::Rename => {
                let source = self.source_path.as_deref()?;
                let name = self.new_name.as_deref()?;
                Some(match source.parent() {
                    Some(parent) => parent.join(name),
                    None => PathBuf::from(name),
                })
            }
            _ => self.dest_path.clone(),
        }
    }

    /// Human readable description, used when asking the user for consent.
    pub fn describe(&self) -> String {
        let source = display_opt(self.source_path.as_deref());
        let dest = display_opt(self.dest_path.as_deref());

        match self.kind {
            OperationKind::Copy => format!("Copy {source} to {dest}"),
            OperationKind::Move => format!("Move {source} to {dest}"),
            OperationKind::Delete => format!("Delete {source}"),
            OperationKind::Rename => format!(
                "Rename {source} to {}",
                self.new_name.as_deref().unwrap_or("?")
            ),
            OperationKind::CreateFolder => format!("Create folder {dest}"),
            OperationKind::CreateFile => format!("Create file {dest}"),
        }
    }

    /// Checks the descriptor's shape, then the safety of every path it
    /// carries. When `root` is given, paths must stay inside it.
    pub fn validate(&self, root: Option<&Path>) -> Result<(), ValidationError> {
        let source = non_empty(self.source_path.as_deref());
        let dest = non_empty(self.dest_path.as_deref());
        let name = self.new_name.as_deref().filter(|name| !name.is_empty());

        match self.kind {
            OperationKind::Copy | OperationKind::Move => {
                source.ok_or(ValidationError::SourceRequired)?;
                dest.ok_or(ValidationError::DestinationRequired)?;
            }
            OperationKind::Delete => {
                source.ok_or(ValidationError::SourceRequired)?;
            }
            OperationKind::Rename => {
                source.ok_or(ValidationError::SourceRequired)?;
                name.ok_or(ValidationError::NameRequired)?;
            }
            OperationKind::CreateFolder | OperationKind::CreateFile => {
                dest.ok_or(ValidationError::DestinationRequired)?;
            }
        }

        if let Some(source) = source {
            if !is_safe_path(source, root) {
                return Err(ValidationError::InvalidSource);
            }
        }
        if let Some(dest) = dest {
            if !is_safe_path(dest, root) {
                return Err(ValidationError::InvalidDestination);
            }
        }
        if let Some(name) = name {
            if !is_safe_name(name) {
                return Err(ValidationError::InvalidName);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("source path is required")]
    SourceRequired,

    #[error("destination path is required")]
    DestinationRequired,

    #[error("new name is required")]
    NameRequired,

    #[error("Invalid source path")]
    InvalidSource,

    #[error("Invalid destination path")]
    InvalidDestination,

    #[error("Invalid name")]
    InvalidName,
}

fn display_opt(path: Option<&Path>) -> String {
    path.map(|path| path.display().to_string())
        .unwrap_or_else(|| "?".to_owned())
}

fn non_empty(path: Option<&Path>) -> Option<&Path> {
    path.filter(|path| !path.as_os_str().is_empty())
}

fn has_nul(path: &Path) -> bool {
    path.as_os_str().as_encoded_bytes().contains(&0)
}

/// A path is safe when it holds no NUL bytes and no `..` components, and,
/// with a root configured, when an absolute path lies inside that root.
/// Relative paths are resolved against the root by the caller.
pub fn is_safe_path(path: &Path, root: Option<&Path>) -> bool {
    if has_nul(path) {
        return false;
    }
    if path
        .components()
        .any(|component| component == Component::ParentDir)
    {
        return false;
    }

    match root {
        Some(root) if path.is_absolute() => path.starts_with(root),
        _ => true,
    }
}

/// A name is a single path component that is not `.` or `..`.
pub fn is_safe_name(name: &str) -> bool {
    !(name == "." || name == ".." || name.contains(['/', '\\', '\0']))
}
