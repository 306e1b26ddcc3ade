//! Bridge between synchronous FUSE callbacks and the async adapter.

use std::future::Future;
use std::sync::OnceLock;

use castor_core::FsError;
use tokio::runtime::{Builder, Runtime};

/// Global tokio runtime for FUSE callbacks.
///
/// Stores the result of runtime creation so that initialization errors are
/// propagated without panicking.
static RUNTIME: OnceLock<Result<Runtime, String>> = OnceLock::new();

/// Initialize the async runtime for FUSE operations.
pub fn init_runtime() -> Result<&'static Runtime, FuseError> {
    let result = RUNTIME.get_or_init(|| {
        Builder::new_multi_thread()
            .worker_threads(4)
            .thread_name("castorfs-worker")
            .enable_all()
            .build()
            .map_err(|e| e.to_string())
    });
    match result {
        Ok(rt) => Ok(rt),
        Err(e) => Err(FuseError::Runtime(format!(
            "Failed to create FUSE async runtime: {}",
            e
        ))),
    }
}

/// Get the FUSE async runtime, returning an error if not initialized.
pub fn runtime() -> Result<&'static Runtime, FuseError> {
    match RUNTIME.get() {
        Some(Ok(rt)) => Ok(rt),
        Some(Err(e)) => Err(FuseError::Runtime(format!(
            "FUSE runtime failed to initialize: {}",
            e
        ))),
        None => Err(FuseError::Runtime(
            "FUSE runtime not initialized - call init_runtime first".to_string(),
        )),
    }
}

/// Run an async adapter call to completion from a FUSE callback.
pub fn block_on<F, T>(future: F) -> Result<T, FuseError>
where
    F: Future<Output = T>,
{
    let rt = runtime()?;
    Ok(rt.block_on(future))
}

pub type FuseResult<T> = Result<T, FuseError>;

/// Errors surfaced to the kernel from FUSE callbacks.
#[derive(Debug, thiserror::Error)]
pub enum FuseError {
    /// Adapter or backend failure, carrying its errno.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Inode not known to the inode table.
    #[error("unknown inode {0}")]
    UnknownInode(u64),

    /// Name or offset the adapter cannot take.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Mount failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The async runtime is missing or broken.
    #[error("{0}")]
    Runtime(String),
}

#[cfg(unix)]
impl FuseError {
    /// Convert to a libc errno.
    pub fn to_errno(&self) -> i32 {
        match self {
            FuseError::Fs(e) => e.errno(),
            FuseError::UnknownInode(_) => libc::ENOENT,
            FuseError::InvalidArg(_) => libc::EINVAL,
            FuseError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            FuseError::Runtime(_) => libc::EIO,
        }
    }
}
