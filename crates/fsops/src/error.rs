use std::{fmt, io};

use thiserror::Error;

/// The small set of failure classes the rest of the system cares about.
///
/// Backend errors are classified exactly once, when they leave a backend.
/// Everything downstream matches on this enum instead of raw OS codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    /// A rename was attempted across two volumes.
    CrossDevice,
    Other,
}

impl FsErrorKind {
    pub fn classify(err: &io::Error) -> FsErrorKind {
        match err.kind() {
            io::ErrorKind::NotFound => FsErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => FsErrorKind::AlreadyExists,
            io::ErrorKind::PermissionDenied => FsErrorKind::PermissionDenied,
            io::ErrorKind::CrossesDevices => FsErrorKind::CrossDevice,
            _ => err
                .raw_os_error()
                .map(Self::from_raw_os_error)
                .unwrap_or(FsErrorKind::Other),
        }
    }

    #[cfg(unix)]
    fn from_raw_os_error(code: i32) -> FsErrorKind {
        // EPERM, ENOENT, EACCES, EEXIST, EXDEV
        match code {
            1 | 13 => FsErrorKind::PermissionDenied,
            2 => FsErrorKind::NotFound,
            17 => FsErrorKind::AlreadyExists,
            18 => FsErrorKind::CrossDevice,
            _ => FsErrorKind::Other,
        }
    }

    #[cfg(windows)]
    fn from_raw_os_error(code: i32) -> FsErrorKind {
        // ERROR_FILE_NOT_FOUND, ERROR_PATH_NOT_FOUND, ERROR_ACCESS_DENIED,
        // ERROR_NOT_SAME_DEVICE, ERROR_FILE_EXISTS, ERROR_ALREADY_EXISTS
        match code {
            2 | 3 => FsErrorKind::NotFound,
            5 => FsErrorKind::PermissionDenied,
            17 => FsErrorKind::CrossDevice,
            80 | 183 => FsErrorKind::AlreadyExists,
            _ => FsErrorKind::Other,
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn from_raw_os_error(_code: i32) -> FsErrorKind {
        FsErrorKind::Other
    }
}

impl fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FsErrorKind::NotFound => "not found",
            FsErrorKind::AlreadyExists => "already exists",
            FsErrorKind::PermissionDenied => "permission denied",
            FsErrorKind::CrossDevice => "cross-device link",
            FsErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// An I/O error returned by a backend, tagged with its [`FsErrorKind`].
#[derive(Debug, Error)]
#[error("{source}")]
pub struct FsError {
    kind: FsErrorKind,
    #[source]
    source: io::Error,
}

impl FsError {
    pub fn new(source: io::Error) -> Self {
        Self {
            kind: FsErrorKind::classify(&source),
            source,
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        self.kind
    }

    pub fn is_permission_denied(&self) -> bool {
        self.kind == FsErrorKind::PermissionDenied
    }

    pub fn io_error(&self) -> &io::Error {
        &self.source
    }
}

impl From<io::Error> for FsError {
    fn from(source: io::Error) -> Self {
        Self::new(source)
    }
}

/// Trait that transforms `Result<T, FsError>` into `Result<Option<T>, FsError>`.
///
/// `Ok(None)` takes the place of errors whose kind is `NotFound`.
pub trait FsResultExt<T> {
    fn with_not_found(self) -> Result<Option<T>, FsError>;
}

impl<T> FsResultExt<T> for Result<T, FsError> {
    fn with_not_found(self) -> Result<Option<T>, FsError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(err) if err.kind() == FsErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}
