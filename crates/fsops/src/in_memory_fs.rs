use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender};

use crate::{DirEntry, FsBackend, Metadata, ReadDir, VfsEvent};

/// The backend operation a fault injected with
/// [`InMemoryFs::inject_fault`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    Rename,
    CopyFile,
    RemoveFile,
    RemoveDirAll,
    CreateDir,
    Write,
}

impl fmt::Display for FaultOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A mutating call observed by an [`InMemoryFs`], in the order it was made.
///
/// Calls rejected by an injected fault or by a volume boundary are recorded
/// too, so tests can assert on attempted sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsCall {
    Rename(PathBuf, PathBuf),
    CopyFile(PathBuf, PathBuf),
    CreateDir(PathBuf),
    Write(PathBuf),
    RemoveFile(PathBuf),
    RemoveDirAll(PathBuf),
}

/// In-memory filesystem that can be used as a VFS backend.
///
/// Cloning an `InMemoryFs` yields another handle to the same filesystem, so a
/// test can keep one handle for setup and inspection while a `Vfs` owns the
/// other.
#[derive(Clone)]
pub struct InMemoryFs {
    inner: Arc<Mutex<InMemoryFsInner>>,
}

impl InMemoryFs {
    /// Create a new empty `InMemoryFs`, containing only the root directory.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut entries = HashMap::new();
        entries.insert(
            PathBuf::from("/"),
            Entry::Dir {
                children: BTreeSet::new(),
            },
        );

        Self {
            inner: Arc::new(Mutex::new(InMemoryFsInner {
                entries,
                volumes: Vec::new(),
                faults: Vec::new(),
                calls: Vec::new(),
                sender,
                receiver,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryFsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a file, and any missing parent directories, without recording
    /// a call or raising an event.
    pub fn load_file<P: AsRef<Path>, C: AsRef<[u8]>>(&self, path: P, contents: C) -> io::Result<()> {
        let path = path.as_ref();
        let mut inner = self.lock();
        if let Some(parent) = path.parent() {
            inner.create_dir_all(parent)?;
        }
        inner.insert(path, Entry::File {
            contents: contents.as_ref().to_vec(),
        })
    }

    /// Create a directory and any missing parents, without recording a call
    /// or raising an event.
    pub fn load_dir<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.lock().create_dir_all(path.as_ref())
    }

    /// Mark `root` as the mount point of a separate volume. Renames whose
    /// source and destination live on different volumes fail with
    /// `io::ErrorKind::CrossesDevices`.
    pub fn add_volume<P: Into<PathBuf>>(&self, root: P) {
        self.lock().volumes.push(root.into());
    }

    /// Make the next `op` touching `path` fail with `kind`. Each injected
    /// fault fires once.
    pub fn inject_fault<P: Into<PathBuf>>(&self, op: FaultOp, path: P, kind: io::ErrorKind) {
        self.lock().faults.push(Fault {
            op,
            path: path.into(),
            kind,
        });
    }

    /// The mutating calls made so far.
    pub fn calls(&self) -> Vec<FsCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn is_file<P: AsRef<Path>>(&self, path: P) -> bool {
        matches!(
            self.lock().entries.get(path.as_ref()),
            Some(Entry::File { .. })
        )
    }

    pub fn is_dir<P: AsRef<Path>>(&self, path: P) -> bool {
        matches!(
            self.lock().entries.get(path.as_ref()),
            Some(Entry::Dir { .. })
        )
    }

    /// Contents of the file at `path`, if there is one.
    pub fn contents<P: AsRef<Path>>(&self, path: P) -> Option<Vec<u8>> {
        match self.lock().entries.get(path.as_ref()) {
            Some(Entry::File { contents }) => Some(contents.clone()),
            _ => None,
        }
    }

    /// Remove `path` as an outside process would: no call is recorded but a
    /// `Remove` event is raised.
    pub fn remove_externally<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let mut inner = self.lock();
        inner.remove_subtree(path)?;
        inner.emit(VfsEvent::Remove(path.to_path_buf()));
        Ok(())
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

struct Fault {
    op: FaultOp,
    path: PathBuf,
    kind: io::ErrorKind,
}

#[derive(Debug, Clone)]
enum Entry {
    File { contents: Vec<u8> },
    Dir { children: BTreeSet<PathBuf> },
}

struct InMemoryFsInner {
    entries: HashMap<PathBuf, Entry>,
    volumes: Vec<PathBuf>,
    faults: Vec<Fault>,
    calls: Vec<FsCall>,
    sender: Sender<VfsEvent>,
    receiver: Receiver<VfsEvent>,
}

impl InMemoryFsInner {
    fn emit(&self, event: VfsEvent) {
        // The receiver half lives in `self`, so sending cannot fail.
        let _ = self.sender.send(event);
    }

    fn check_fault(&mut self, op: FaultOp, path: &Path) -> io::Result<()> {
        let position = self
            .faults
            .iter()
            .position(|fault| fault.op == op && fault.path == path);

        match position {
            Some(index) => {
                let fault = self.faults.remove(index);
                Err(io::Error::new(
                    fault.kind,
                    format!("injected {} failure at {}", op, path.display()),
                ))
            }
            None => Ok(()),
        }
    }

    fn volume_of(&self, path: &Path) -> Option<&Path> {
        self.volumes
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(PathBuf::as_path)
    }

    fn require_parent_dir(&self, path: &Path) -> io::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };

        match self.entries.get(parent) {
            Some(Entry::Dir { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("parent of {} is not a directory", path.display()),
            )),
            None => Err(not_found(parent)),
        }
    }

    fn insert(&mut self, path: &Path, entry: Entry) -> io::Result<()> {
        self.require_parent_dir(path)?;

        if let Some(parent) = path.parent() {
            if let Some(Entry::Dir { children }) = self.entries.get_mut(parent) {
                children.insert(path.to_path_buf());
            }
        }
        self.entries.insert(path.to_path_buf(), entry);
        Ok(())
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        match self.entries.get(path) {
            Some(Entry::Dir { .. }) => return Ok(()),
            Some(Entry::File { .. }) => return Err(already_exists(path)),
            None => {}
        }

        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }
        self.insert(
            path,
            Entry::Dir {
                children: BTreeSet::new(),
            },
        )
    }

    /// Detach `path` and every descendant, returning the removed entries
    /// keyed by their old paths.
    fn remove_subtree(&mut self, path: &Path) -> io::Result<Vec<(PathBuf, Entry)>> {
        if !self.entries.contains_key(path) {
            return Err(not_found(path));
        }

        if let Some(parent) = path.parent() {
            if let Some(Entry::Dir { children }) = self.entries.get_mut(parent) {
                children.remove(path);
            }
        }

        let mut removed = Vec::new();
        let mut pending = vec![path.to_path_buf()];
        while let Some(current) = pending.pop() {
            if let Some(entry) = self.entries.remove(&current) {
                if let Entry::Dir { children } = &entry {
                    pending.extend(children.iter().cloned());
                }
                removed.push((current, entry));
            }
        }

        Ok(removed)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

fn already_exists(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("already exists: {}", path.display()),
    )
}

fn rebase(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
        Ok(rest) => to.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

impl FsBackend for InMemoryFs {
    fn read(&mut self, path: &Path) -> io::Result<Vec<u8>> {
        match self.lock().entries.get(path) {
            Some(Entry::File { contents }) => Ok(contents.clone()),
            Some(Entry::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("cannot read a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        inner.calls.push(FsCall::Write(path.to_path_buf()));
        inner.check_fault(FaultOp::Write, path)?;

        if let Some(Entry::Dir { .. }) = inner.entries.get(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("cannot write to a directory: {}", path.display()),
            ));
        }

        let created = !inner.entries.contains_key(path);
        inner.insert(
            path,
            Entry::File {
                contents: data.to_vec(),
            },
        )?;
        inner.emit(if created {
            VfsEvent::Create(path.to_path_buf())
        } else {
            VfsEvent::Write(path.to_path_buf())
        });
        Ok(())
    }

    fn exists(&mut self, path: &Path) -> io::Result<bool> {
        Ok(self.lock().entries.contains_key(path))
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<ReadDir> {
        match self.lock().entries.get(path) {
            Some(Entry::Dir { children }) => {
                let iter = children
                    .clone()
                    .into_iter()
                    .map(|path| Ok(DirEntry { path }));
                Ok(ReadDir {
                    inner: Box::new(iter),
                })
            }
            Some(Entry::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn create_dir(&mut self, path: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        inner.calls.push(FsCall::CreateDir(path.to_path_buf()));
        inner.check_fault(FaultOp::CreateDir, path)?;

        if inner.entries.contains_key(path) {
            return Err(already_exists(path));
        }
        inner.insert(
            path,
            Entry::Dir {
                children: BTreeSet::new(),
            },
        )?;
        inner.emit(VfsEvent::Create(path.to_path_buf()));
        Ok(())
    }

    fn metadata(&mut self, path: &Path) -> io::Result<Metadata> {
        match self.lock().entries.get(path) {
            Some(Entry::File { contents }) => Ok(Metadata {
                is_dir: false,
                len: contents.len() as u64,
            }),
            Some(Entry::Dir { .. }) => Ok(Metadata {
                is_dir: true,
                len: 0,
            }),
            None => Err(not_found(path)),
        }
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        inner
            .calls
            .push(FsCall::Rename(from.to_path_buf(), to.to_path_buf()));
        inner.check_fault(FaultOp::Rename, from)?;

        if inner.volume_of(from) != inner.volume_of(to) {
            return Err(io::Error::new(
                io::ErrorKind::CrossesDevices,
                format!(
                    "cannot rename {} to {} across volumes",
                    from.display(),
                    to.display()
                ),
            ));
        }
        if !inner.entries.contains_key(from) {
            return Err(not_found(from));
        }
        if inner.entries.contains_key(to) {
            return Err(already_exists(to));
        }
        if to.starts_with(from) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot move {} into itself", from.display()),
            ));
        }
        inner.require_parent_dir(to)?;

        let removed = inner.remove_subtree(from)?;
        for (old_path, entry) in removed {
            let new_path = rebase(&old_path, from, to);
            let entry = match entry {
                Entry::Dir { children } => Entry::Dir {
                    children: children
                        .iter()
                        .map(|child| rebase(child, from, to))
                        .collect(),
                },
                file => file,
            };
            inner.entries.insert(new_path, entry);
        }
        if let Some(parent) = to.parent() {
            if let Some(Entry::Dir { children }) = inner.entries.get_mut(parent) {
                children.insert(to.to_path_buf());
            }
        }

        inner.emit(VfsEvent::Remove(from.to_path_buf()));
        inner.emit(VfsEvent::Create(to.to_path_buf()));
        Ok(())
    }

    fn copy_file(&mut self, from: &Path, to: &Path) -> io::Result<u64> {
        let mut inner = self.lock();
        inner
            .calls
            .push(FsCall::CopyFile(from.to_path_buf(), to.to_path_buf()));
        inner.check_fault(FaultOp::CopyFile, from)?;

        let contents = match inner.entries.get(from) {
            Some(Entry::File { contents }) => contents.clone(),
            Some(Entry::Dir { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("cannot copy a directory as a file: {}", from.display()),
                ))
            }
            None => return Err(not_found(from)),
        };
        if let Some(Entry::Dir { .. }) = inner.entries.get(to) {
            return Err(already_exists(to));
        }

        let len = contents.len() as u64;
        inner.insert(to, Entry::File { contents })?;
        inner.emit(VfsEvent::Create(to.to_path_buf()));
        Ok(len)
    }

    fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        inner.calls.push(FsCall::RemoveFile(path.to_path_buf()));
        inner.check_fault(FaultOp::RemoveFile, path)?;

        match inner.entries.get(path) {
            Some(Entry::File { .. }) => {}
            Some(Entry::Dir { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("is a directory: {}", path.display()),
                ))
            }
            None => return Err(not_found(path)),
        }
        inner.remove_subtree(path)?;
        inner.emit(VfsEvent::Remove(path.to_path_buf()));
        Ok(())
    }

    fn remove_dir_all(&mut self, path: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        inner.calls.push(FsCall::RemoveDirAll(path.to_path_buf()));
        inner.check_fault(FaultOp::RemoveDirAll, path)?;

        match inner.entries.get(path) {
            Some(Entry::Dir { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {}", path.display()),
                ))
            }
            None => return Err(not_found(path)),
        }
        inner.remove_subtree(path)?;
        inner.emit(VfsEvent::Remove(path.to_path_buf()));
        Ok(())
    }

    fn event_receiver(&self) -> Receiver<VfsEvent> {
        self.lock().receiver.clone()
    }

    fn watch(&mut self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rename_moves_whole_subtree() {
        let mut fs = InMemoryFs::new();
        fs.load_file("/a/b/c.txt", "deep").unwrap();

        fs.rename(Path::new("/a"), Path::new("/z")).unwrap();

        assert!(!fs.is_dir("/a"));
        assert!(fs.is_dir("/z/b"));
        assert_eq!(fs.contents("/z/b/c.txt").unwrap(), b"deep");

        let children: Vec<_> = fs
            .read_dir(Path::new("/z"))
            .unwrap()
            .map(|entry| entry.unwrap().path)
            .collect();
        assert_eq!(children, vec![PathBuf::from("/z/b")]);
    }

    #[test]
    fn rename_refuses_existing_destination() {
        let mut fs = InMemoryFs::new();
        fs.load_file("/one", "1").unwrap();
        fs.load_file("/two", "2").unwrap();

        let err = fs.rename(Path::new("/one"), Path::new("/two")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs.contents("/two").unwrap(), b"2");
    }

    #[test]
    fn rename_across_volumes_is_rejected() {
        let mut fs = InMemoryFs::new();
        fs.add_volume("/mnt/usb");
        fs.load_file("/home/file.txt", "x").unwrap();
        fs.load_dir("/mnt/usb").unwrap();

        let err = fs
            .rename(Path::new("/home/file.txt"), Path::new("/mnt/usb/file.txt"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::CrossesDevices);
        assert!(fs.is_file("/home/file.txt"));
    }

    #[test]
    fn injected_faults_fire_once() {
        let mut fs = InMemoryFs::new();
        fs.load_file("/f", "x").unwrap();
        fs.inject_fault(FaultOp::RemoveFile, "/f", io::ErrorKind::PermissionDenied);

        let err = fs.remove_file(Path::new("/f")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(fs.is_file("/f"));

        fs.remove_file(Path::new("/f")).unwrap();
        assert!(!fs.is_file("/f"));
        assert_eq!(
            fs.calls(),
            vec![
                FsCall::RemoveFile(PathBuf::from("/f")),
                FsCall::RemoveFile(PathBuf::from("/f"))
            ]
        );
    }

    #[test]
    fn mutations_raise_events() {
        let mut fs = InMemoryFs::new();
        let events = fs.event_receiver();

        fs.write(Path::new("/new.txt"), b"hi").unwrap();
        fs.rename(Path::new("/new.txt"), Path::new("/renamed.txt"))
            .unwrap();
        fs.remove_externally("/renamed.txt").unwrap();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                VfsEvent::Create(PathBuf::from("/new.txt")),
                VfsEvent::Remove(PathBuf::from("/new.txt")),
                VfsEvent::Create(PathBuf::from("/renamed.txt")),
                VfsEvent::Remove(PathBuf::from("/renamed.txt")),
            ]
        );
    }

    #[test]
    fn write_requires_parent() {
        let mut fs = InMemoryFs::new();
        let err = fs.write(Path::new("/missing/file"), b"").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
