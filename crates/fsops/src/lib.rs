/*!
Filesystem primitives with a configurable backend, classified errors and file
watching.

fsops is the only place in the workspace that touches the real filesystem.
Its primary consumer is the retrace history engine, which depends on the
error contract documented on [`FsErrorKind`] rather than on raw OS codes.

## Backends
* `StdBackend`, which uses `std::fs` (through `fs-err`) and the `notify` crate
* `InMemoryFs`, an in-memory filesystem with fault injection and simulated
  volume boundaries, useful for testing
*/

mod error;
mod in_memory_fs;
mod std_backend;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub use error::{FsError, FsErrorKind, FsResultExt};
pub use in_memory_fs::{FaultOp, FsCall, InMemoryFs};
pub use std_backend::{StdBackend, WatcherError};

mod sealed {
    use super::*;

    /// Sealing trait for FsBackend.
    pub trait Sealed {}

    impl Sealed for StdBackend {}
    impl Sealed for InMemoryFs {}
}

/// Backend that can be used to create a `Vfs`.
///
/// This trait is sealed and cannot not be implemented outside this crate.
pub trait FsBackend: sealed::Sealed + Send + 'static {
    fn read(&mut self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn exists(&mut self, path: &Path) -> io::Result<bool>;
    fn read_dir(&mut self, path: &Path) -> io::Result<ReadDir>;
    fn create_dir(&mut self, path: &Path) -> io::Result<()>;
    fn metadata(&mut self, path: &Path) -> io::Result<Metadata>;
    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()>;
    fn copy_file(&mut self, from: &Path, to: &Path) -> io::Result<u64>;
    fn remove_file(&mut self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&mut self, path: &Path) -> io::Result<()>;

    fn event_receiver(&self) -> crossbeam_channel::Receiver<VfsEvent>;
    fn watch(&mut self, path: &Path) -> io::Result<()>;
}

/// Vfs equivalent to [`std::fs::DirEntry`][std::fs::DirEntry].
///
/// [std::fs::DirEntry]: https://doc.rust-lang.org/stable/std/fs/struct.DirEntry.html
pub struct DirEntry {
    pub(crate) path: PathBuf,
}

impl DirEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Vfs equivalent to [`std::fs::ReadDir`][std::fs::ReadDir].
///
/// [std::fs::ReadDir]: https://doc.rust-lang.org/stable/std/fs/struct.ReadDir.html
pub struct ReadDir {
    pub(crate) inner: Box<dyn Iterator<Item = io::Result<DirEntry>>>,
}

impl Iterator for ReadDir {
    type Item = io::Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Vfs equivalent to [`std::fs::Metadata`][std::fs::Metadata].
///
/// [std::fs::Metadata]: https://doc.rust-lang.org/stable/std/fs/struct.Metadata.html
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    pub(crate) is_dir: bool,
    pub(crate) len: u64,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn len(&self) -> u64 {
        self.len
    }
}

/// Represents an event that a filesystem can raise that might need to be
/// handled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VfsEvent {
    Create(PathBuf),
    Write(PathBuf),
    Remove(PathBuf),
}

/// Contains implementation details of the Vfs, wrapped by `Vfs` and `VfsLock`,
/// the public interfaces to this type.
struct VfsInner {
    backend: Box<dyn FsBackend>,
}

impl VfsInner {
    fn copy_dir_all(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        self.backend.create_dir(to)?;

        let children: Vec<PathBuf> = self
            .backend
            .read_dir(from)?
            .map(|entry| entry.map(|entry| entry.path))
            .collect::<io::Result<_>>()?;

        for child in children {
            let Some(name) = child.file_name() else {
                continue;
            };
            let target = to.join(name);

            if self.backend.metadata(&child)?.is_dir() {
                self.copy_dir_all(&child, &target)?;
            } else {
                self.backend.copy_file(&child, &target)?;
            }
        }

        Ok(())
    }

    fn remove_path(&mut self, path: &Path) -> io::Result<()> {
        if self.backend.metadata(path)?.is_dir() {
            self.backend.remove_dir_all(path)
        } else {
            self.backend.remove_file(path)
        }
    }

    fn is_empty_dir(&mut self, path: &Path) -> io::Result<bool> {
        Ok(self.backend.read_dir(path)?.next().is_none())
    }

    fn tree_size(&mut self, path: &Path) -> io::Result<usize> {
        if !self.backend.metadata(path)?.is_dir() {
            return Ok(1);
        }

        let children: Vec<PathBuf> = self
            .backend
            .read_dir(path)?
            .map(|entry| entry.map(|entry| entry.path))
            .collect::<io::Result<_>>()?;

        let mut size = 1;
        for child in children {
            size += self.tree_size(&child)?;
        }
        Ok(size)
    }
}

/// A virtual filesystem with a configurable backend.
///
/// All operations on the Vfs take a lock on an internal backend. For performing
/// large batches of operations, it might be more performant to call `lock()`
/// and use [`VfsLock`](struct.VfsLock.html) instead.
pub struct Vfs {
    inner: Mutex<VfsInner>,
}

macro_rules! forward {
    ($(#[$attr:meta])* $name:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        $(#[$attr])*
        #[inline]
        pub fn $name(&self, $($arg: $ty),*) -> Result<$ret, FsError> {
            self.lock_inner().backend.$name($($arg),*).map_err(FsError::new)
        }
    };
}

impl Vfs {
    /// Creates a new `Vfs` with the given backend.
    pub fn new<B: FsBackend>(backend: B) -> Self {
        Self {
            inner: Mutex::new(VfsInner {
                backend: Box::new(backend),
            }),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, VfsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Manually lock the Vfs, useful for large batches of operations.
    pub fn lock(&self) -> VfsLock<'_> {
        VfsLock {
            inner: self.lock_inner(),
        }
    }

    forward! {
        /// Read a file. Roughly equivalent to [`std::fs::read`].
        read(path: &Path) -> Vec<u8>
    }

    forward! {
        /// Return whether the given path exists.
        exists(path: &Path) -> bool
    }

    forward! {
        /// Query metadata about the given path, following symlinks.
        metadata(path: &Path) -> Metadata
    }

    forward! {
        /// Creates a directory. Fails if the parent does not exist.
        create_dir(path: &Path) -> ()
    }

    forward! {
        /// Same-volume rename. Roughly equivalent to [`std::fs::rename`].
        rename(from: &Path, to: &Path) -> ()
    }

    forward! {
        /// Copy the bytes of a regular file. Returns the number of bytes copied.
        copy_file(from: &Path, to: &Path) -> u64
    }

    forward! {
        /// Remove a regular file.
        remove_file(path: &Path) -> ()
    }

    forward! {
        /// Remove a directory and all of its descendants.
        remove_dir_all(path: &Path) -> ()
    }

    forward! {
        /// Start watching `path` recursively for changes.
        watch(path: &Path) -> ()
    }

    /// Write a file. Roughly equivalent to [`std::fs::write`].
    #[inline]
    pub fn write<P: AsRef<Path>, C: AsRef<[u8]>>(&self, path: P, contents: C) -> Result<(), FsError> {
        self.lock_inner()
            .backend
            .write(path.as_ref(), contents.as_ref())
            .map_err(FsError::new)
    }

    /// List the children of a directory, sorted by path.
    pub fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, FsError> {
        let dir = self.lock_inner().backend.read_dir(path)?;
        let mut children = dir
            .map(|entry| entry.map(|entry| entry.path))
            .collect::<io::Result<Vec<_>>>()?;
        children.sort();
        Ok(children)
    }

    /// Recursively copy the directory `from` to the not yet existing `to`.
    pub fn copy_dir_all(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.lock_inner()
            .copy_dir_all(from, to)
            .map_err(FsError::new)
    }

    /// Remove `path`, recursively if it is a directory.
    pub fn remove_path(&self, path: &Path) -> Result<(), FsError> {
        self.lock_inner().remove_path(path).map_err(FsError::new)
    }

    /// Returns whether the directory at `path` has no children.
    pub fn is_empty_dir(&self, path: &Path) -> Result<bool, FsError> {
        self.lock_inner().is_empty_dir(path).map_err(FsError::new)
    }

    /// Retrieve a handle to the event receiver for this `Vfs`.
    #[inline]
    pub fn event_receiver(&self) -> crossbeam_channel::Receiver<VfsEvent> {
        self.lock_inner().backend.event_receiver()
    }
}

/// A locked handle to a [`Vfs`](struct.Vfs.html), created by `Vfs::lock`.
///
/// Holds the backend lock for its whole lifetime, so a sequence of calls
/// through one `VfsLock` is not interleaved with calls from other threads.
pub struct VfsLock<'a> {
    inner: MutexGuard<'a, VfsInner>,
}

impl VfsLock<'_> {
    #[inline]
    pub fn exists<P: AsRef<Path>>(&mut self, path: P) -> Result<bool, FsError> {
        self.inner.backend.exists(path.as_ref()).map_err(FsError::new)
    }

    #[inline]
    pub fn metadata<P: AsRef<Path>>(&mut self, path: P) -> Result<Metadata, FsError> {
        self.inner
            .backend
            .metadata(path.as_ref())
            .map_err(FsError::new)
    }

    #[inline]
    pub fn rename<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, from: P, to: Q) -> Result<(), FsError> {
        self.inner
            .backend
            .rename(from.as_ref(), to.as_ref())
            .map_err(FsError::new)
    }

    #[inline]
    pub fn copy_dir_all<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        from: P,
        to: Q,
    ) -> Result<(), FsError> {
        self.inner
            .copy_dir_all(from.as_ref(), to.as_ref())
            .map_err(FsError::new)
    }

    #[inline]
    pub fn copy_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        from: P,
        to: Q,
    ) -> Result<u64, FsError> {
        self.inner
            .backend
            .copy_file(from.as_ref(), to.as_ref())
            .map_err(FsError::new)
    }

    #[inline]
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), FsError> {
        self.inner
            .backend
            .remove_file(path.as_ref())
            .map_err(FsError::new)
    }

    #[inline]
    pub fn remove_dir_all<P: AsRef<Path>>(&mut self, path: P) -> Result<(), FsError> {
        self.inner
            .backend
            .remove_dir_all(path.as_ref())
            .map_err(FsError::new)
    }

    /// Number of entries at and below `path`, counting `path` itself.
    pub fn tree_size<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, FsError> {
        self.inner.tree_size(path.as_ref()).map_err(FsError::new)
    }
}
