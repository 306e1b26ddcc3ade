/// Errors reported by a backend client.
///
/// Whatever the backend says is carried through untouched: the adapter never
/// retries or reinterprets these, it only turns them into an errno.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The backend failed with a native error code.
    #[error("{path}: backend error code {code}")]
    Errno { code: i32, path: String },

    /// Path does not exist.
    #[error("Path not found: {0}")]
    NotFound(String),

    /// The handle is unknown or was opened without the needed access mode.
    #[error("Bad handle: {0}")]
    BadHandle(u64),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other backend-specific error.
    #[error("Backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Native error code from the backend.
    pub fn errno(code: i32, path: impl Into<String>) -> Self {
        BackendError::Errno {
            code,
            path: path.into(),
        }
    }

    /// The POSIX error number this failure maps to.
    pub fn code(&self) -> i32 {
        match self {
            BackendError::Errno { code, .. } => *code,
            BackendError::NotFound(_) => libc::ENOENT,
            BackendError::BadHandle(_) => libc::EBADF,
            BackendError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            BackendError::Other(_) => libc::EIO,
        }
    }
}

/// Errors returned by the VFS adapter.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FsError {
    /// Mutating operation on a read-only mount.
    #[error("Access denied: mount is read-only")]
    AccessDenied,

    /// Root plus relative path does not fit the namespace path limit.
    #[error("Path too long: {len} bytes (max {max})")]
    PathTooLong { len: usize, max: usize },

    /// Caller's buffer cannot hold the value.
    #[error("Buffer too small: need {needed} bytes, have {capacity}")]
    Range { needed: usize, capacity: usize },

    /// Failure reported by the backend client.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl FsError {
    /// The positive errno handed to the kernel.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::AccessDenied => libc::EACCES,
            FsError::PathTooLong { .. } => libc::ENAMETOOLONG,
            FsError::Range { .. } => libc::ERANGE,
            FsError::Backend(e) => e.code(),
        }
    }

    /// The errno in the negative-return convention of C filesystem hooks.
    pub fn to_negative_errno(&self) -> i32 {
        -self.errno()
    }
}

pub type FsResult<T> = Result<T, FsError>;
