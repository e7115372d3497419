use std::path::Path;

use fsops::{FsError, FsErrorKind, Vfs, VfsLock};

/// Moves `from` to `to`.
///
/// Tries a plain rename first. Only when the backend reports that the two
/// paths are on different volumes does it fall back to copying and then
/// removing the source, recursively for directories. The backend lock is
/// held for the whole sequence.
///
/// If the fallback fails while the source is still complete, the copy it
/// made at `to` is removed again before the error is returned, so `to` is
/// left as it was found.
pub fn move_path(vfs: &Vfs, from: &Path, to: &Path) -> Result<(), FsError> {
    let mut fs = vfs.lock();

    match fs.rename(from, to) {
        Err(err) if err.kind() == FsErrorKind::CrossDevice => {
            log::debug!(
                "{} and {} are on different volumes, copying instead",
                from.display(),
                to.display()
            );

            let is_dir = fs.metadata(from)?.is_dir();
            let existed = fs.exists(to)?;
            let source_size = fs.tree_size(from)?;

            let result = if is_dir {
                fs.copy_dir_all(from, to)
                    .and_then(|()| fs.remove_dir_all(from))
            } else {
                fs.copy_file(from, to).and_then(|_| fs.remove_file(from))
            };

            if let Err(err) = result {
                if !existed {
                    discard_copy(&mut fs, from, to, source_size);
                }
                return Err(err);
            }

            Ok(())
        }
        result => result,
    }
}

/// Removes whatever a failed fallback left at `to`, unless the source lost
/// entries on the way. Then the copy is the only complete one and stays.
fn discard_copy(fs: &mut VfsLock<'_>, from: &Path, to: &Path, source_size: usize) {
    match fs.tree_size(from) {
        Ok(size) if size == source_size => {}
        _ => {
            log::warn!(
                "{} was partially removed, keeping the copy at {}",
                from.display(),
                to.display()
            );
            return;
        }
    }

    let removed = match fs.metadata(to) {
        Ok(meta) if meta.is_dir() => fs.remove_dir_all(to),
        Ok(_) => fs.remove_file(to),
        Err(err) if err.kind() == FsErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    };

    if let Err(err) = removed {
        log::warn!("Could not remove the copy at {}: {}", to.display(), err);
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::path::PathBuf;

    use fsops::{FaultOp, FsCall, InMemoryFs};
    use pretty_assertions::assert_eq;

    use super::*;

    fn path(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn same_volume_is_a_single_rename() {
        let imfs = InMemoryFs::new();
        imfs.load_file("/a/file.txt", "hello").unwrap();
        imfs.load_dir("/b").unwrap();
        let vfs = Vfs::new(imfs.clone());

        move_path(&vfs, Path::new("/a/file.txt"), Path::new("/b/file.txt")).unwrap();

        assert_eq!(
            imfs.calls(),
            vec![FsCall::Rename(path("/a/file.txt"), path("/b/file.txt"))]
        );
        assert_eq!(imfs.contents("/b/file.txt"), Some(b"hello".to_vec()));
    }

    #[test]
    fn cross_volume_directory_is_copied_then_removed() {
        let imfs = InMemoryFs::new();
        imfs.add_volume("/mnt");
        imfs.load_file("/home/dir/one.txt", "1").unwrap();
        imfs.load_file("/home/dir/sub/two.txt", "2").unwrap();
        imfs.load_dir("/mnt").unwrap();
        let vfs = Vfs::new(imfs.clone());

        move_path(&vfs, Path::new("/home/dir"), Path::new("/mnt/dir")).unwrap();

        assert_eq!(
            imfs.calls(),
            vec![
                FsCall::Rename(path("/home/dir"), path("/mnt/dir")),
                FsCall::CreateDir(path("/mnt/dir")),
                FsCall::CopyFile(path("/home/dir/one.txt"), path("/mnt/dir/one.txt")),
                FsCall::CreateDir(path("/mnt/dir/sub")),
                FsCall::CopyFile(path("/home/dir/sub/two.txt"), path("/mnt/dir/sub/two.txt")),
                FsCall::RemoveDirAll(path("/home/dir")),
            ]
        );
        assert!(!imfs.is_dir("/home/dir"));
        assert_eq!(imfs.contents("/mnt/dir/sub/two.txt"), Some(b"2".to_vec()));
    }

    #[test]
    fn cross_volume_file_is_copied_then_removed() {
        let imfs = InMemoryFs::new();
        imfs.add_volume("/mnt");
        imfs.load_file("/home/a.txt", "a").unwrap();
        imfs.load_dir("/mnt").unwrap();
        let vfs = Vfs::new(imfs.clone());

        move_path(&vfs, Path::new("/home/a.txt"), Path::new("/mnt/a.txt")).unwrap();

        assert_eq!(
            imfs.calls(),
            vec![
                FsCall::Rename(path("/home/a.txt"), path("/mnt/a.txt")),
                FsCall::CopyFile(path("/home/a.txt"), path("/mnt/a.txt")),
                FsCall::RemoveFile(path("/home/a.txt")),
            ]
        );
        assert!(!imfs.is_file("/home/a.txt"));
    }

    #[test]
    fn other_rename_errors_do_not_fall_back() {
        let imfs = InMemoryFs::new();
        imfs.load_file("/a.txt", "a").unwrap();
        imfs.inject_fault(FaultOp::Rename, "/a.txt", io::ErrorKind::PermissionDenied);
        let vfs = Vfs::new(imfs.clone());

        let err = move_path(&vfs, Path::new("/a.txt"), Path::new("/b.txt")).unwrap_err();

        assert_eq!(err.kind(), FsErrorKind::PermissionDenied);
        assert_eq!(
            imfs.calls(),
            vec![FsCall::Rename(path("/a.txt"), path("/b.txt"))]
        );
        assert!(imfs.is_file("/a.txt"));
    }

    #[test]
    fn failed_source_removal_discards_the_copy() {
        let imfs = InMemoryFs::new();
        imfs.add_volume("/mnt");
        imfs.load_file("/home/dir/one.txt", "1").unwrap();
        imfs.load_dir("/mnt").unwrap();
        imfs.inject_fault(
            FaultOp::RemoveDirAll,
            "/home/dir",
            io::ErrorKind::PermissionDenied,
        );
        let vfs = Vfs::new(imfs.clone());

        let err = move_path(&vfs, Path::new("/home/dir"), Path::new("/mnt/dir")).unwrap_err();

        assert_eq!(err.kind(), FsErrorKind::PermissionDenied);
        assert!(!imfs.is_dir("/mnt/dir"));
        assert_eq!(imfs.contents("/home/dir/one.txt"), Some(b"1".to_vec()));
        assert_eq!(
            imfs.calls().last(),
            Some(&FsCall::RemoveDirAll(path("/mnt/dir")))
        );
    }

    #[test]
    fn failed_copy_leaves_no_partial_target() {
        let imfs = InMemoryFs::new();
        imfs.add_volume("/mnt");
        imfs.load_file("/home/dir/a.txt", "a").unwrap();
        imfs.load_file("/home/dir/b.txt", "b").unwrap();
        imfs.load_dir("/mnt").unwrap();
        imfs.inject_fault(
            FaultOp::CopyFile,
            "/home/dir/b.txt",
            io::ErrorKind::StorageFull,
        );
        let vfs = Vfs::new(imfs.clone());

        move_path(&vfs, Path::new("/home/dir"), Path::new("/mnt/dir")).unwrap_err();

        assert!(!imfs.is_dir("/mnt/dir"));
        assert!(imfs.is_file("/home/dir/a.txt"));
        assert!(imfs.is_file("/home/dir/b.txt"));
    }

    #[test]
    fn failed_file_removal_keeps_an_existing_target() {
        let imfs = InMemoryFs::new();
        imfs.add_volume("/mnt");
        imfs.load_file("/home/a.txt", "new").unwrap();
        imfs.load_file("/mnt/a.txt", "old").unwrap();
        imfs.inject_fault(FaultOp::RemoveFile, "/home/a.txt", io::ErrorKind::PermissionDenied);
        let vfs = Vfs::new(imfs.clone());
        imfs.clear_calls();

        move_path(&vfs, Path::new("/home/a.txt"), Path::new("/mnt/a.txt")).unwrap_err();

        assert!(imfs.is_file("/mnt/a.txt"));
        assert_eq!(
            imfs.calls(),
            vec![
                FsCall::Rename(path("/home/a.txt"), path("/mnt/a.txt")),
                FsCall::CopyFile(path("/home/a.txt"), path("/mnt/a.txt")),
                FsCall::RemoveFile(path("/home/a.txt")),
            ]
        );
    }
}
