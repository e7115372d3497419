//! Bounded undo and redo stacks, and path-keyed invalidation of their
//! entries.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::action::Action;

/// Default number of entries each stack holds before evicting the oldest.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// The undo and redo history of one session.
///
/// Index 0 of each stack is the oldest entry; the back is the next entry to
/// be popped. Entries are plain data.
#[derive(Debug, Clone)]
pub struct HistoryStacks {
    undo: VecDeque<Action>,
    redo: VecDeque<Action>,
    limit: usize,
}

impl Default for HistoryStacks {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryStacks {
    /// Creates empty stacks holding at most `limit` entries each. A limit of
    /// zero is treated as one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            undo: VecDeque::with_capacity(limit.min(256)),
            redo: VecDeque::with_capacity(limit.min(256)),
            limit,
        }
    }

    /// Records a new mutation. Redo history is only meaningful relative to the
    /// undo history it was derived from, so it is discarded.
    pub fn push_undo(&mut self, action: Action) {
        if !self.redo.is_empty() {
            log::trace!("Discarding {} redo entries", self.redo.len());
            self.redo.clear();
        }
        Self::push_bounded(&mut self.undo, action, self.limit);
    }

    /// Puts an action back onto the undo stack without touching redo. Used
    /// when a redo succeeds and when an undo fails.
    pub fn restore_undo(&mut self, action: Action) {
        Self::push_bounded(&mut self.undo, action, self.limit);
    }

    pub fn push_redo(&mut self, action: Action) {
        Self::push_bounded(&mut self.redo, action, self.limit);
    }

    fn push_bounded(stack: &mut VecDeque<Action>, action: Action, limit: usize) {
        stack.push_back(action);
        while stack.len() > limit {
            if let Some(evicted) = stack.pop_front() {
                log::trace!("History full, evicting: {}", evicted.describe());
            }
        }
    }

    pub fn pop_undo(&mut self) -> Option<Action> {
        self.undo.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<Action> {
        self.redo.pop_back()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Undo entries, oldest first.
    pub fn undo_entries(&self) -> impl DoubleEndedIterator<Item = &Action> {
        self.undo.iter()
    }

    /// Redo entries, oldest first.
    pub fn redo_entries(&self) -> impl DoubleEndedIterator<Item = &Action> {
        self.redo.iter()
    }

    pub fn clear_all(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Removes every entry, from both stacks, that no longer describes reality
    /// now that `path` was changed behind our back. Returns how many entries
    /// were removed.
    ///
    /// Removing an entry can make other entries stale: a rename that
    /// produced the source of a removed rename, or a move into a directory
    /// whose rename was removed. Passes are repeated until one removes
    /// nothing. Every pass that continues removes at least one entry, so there
    /// are at most `len + 1` passes.
    pub fn invalidate_for_path(&mut self, path: &Path) -> usize {
        let mut stale = StalePaths::new(path);
        let mut total = 0;

        loop {
            let removed =
                stale.remove_matching(&mut self.undo) + stale.remove_matching(&mut self.redo);
            if removed == 0 {
                break;
            }
            total += removed;
        }

        if total > 0 {
            log::debug!(
                "Invalidated {} history entries after {} changed",
                total,
                path.display()
            );
        }

        total
    }
}

/// Paths whose recorded state can no longer be trusted, grown as entries are
/// invalidated.
struct StalePaths {
    /// Paths where an entry expects an item to exist.
    gone: HashSet<PathBuf>,
    /// Directories produced by removed renames.
    renamed_dirs: HashSet<PathBuf>,
}

impl StalePaths {
    fn new(path: &Path) -> Self {
        Self {
            gone: HashSet::from([path.to_path_buf()]),
            renamed_dirs: HashSet::new(),
        }
    }

    fn matches(&self, action: &Action) -> bool {
        match action {
            Action::Create { path, .. } => self.gone.contains(path),
            Action::Rename { new_path, .. } => self.gone.contains(new_path),
            Action::Move {
                source_paths,
                dest_path,
                ..
            } => {
                source_paths.iter().any(|source| self.gone.contains(source))
                    || self.renamed_dirs.contains(dest_path)
            }
        }
    }

    fn record_removal(&mut self, action: &Action) {
        match action {
            Action::Create { .. } => {}
            Action::Rename {
                old_path, new_path, ..
            } => {
                self.gone.insert(old_path.clone());
                self.renamed_dirs.insert(new_path.clone());
            }
            Action::Move {
                source_paths,
                original_paths,
                original_parent,
                ..
            } => match (original_paths, original_parent) {
                (Some(originals), _) => self.gone.extend(originals.iter().cloned()),
                (None, Some(parent)) => self.gone.extend(
                    source_paths
                        .iter()
                        .filter_map(|source| source.file_name())
                        .map(|name| parent.join(name)),
                ),
                (None, None) => {}
            },
        }
    }

    fn remove_matching(&mut self, stack: &mut VecDeque<Action>) -> usize {
        let mut removed = Vec::new();
        stack.retain(|action| {
            if self.matches(action) {
                removed.push(action.clone());
                false
            } else {
                true
            }
        });

        for action in &removed {
            log::trace!("Invalidated history entry: {}", action.describe());
            self.record_removal(action);
        }

        removed.len()
    }
}
