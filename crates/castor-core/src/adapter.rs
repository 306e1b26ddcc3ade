use std::sync::Arc;

use castor_config::{BackendConfig, MountConfig};
use tracing::{debug, instrument, warn};

use crate::error::{BackendError, FsResult};
use crate::fs::FsBackend;
use crate::gate::{Mutation, ReadOnlyGate};
use crate::memory::MemoryBackend;
use crate::path::PathResolver;
use crate::traits::{Backend, DirEntry, FileHandle, FileStat};
use crate::xattr::{self, AttributeCatalog, XattrReply};

/// Mode used when `open` has to create the file.
const OPEN_MODE: u32 = 0o644;

/// Build the backend client named by the configuration.
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn Backend>, BackendError> {
    let backend: Arc<dyn Backend> = match config {
        BackendConfig::Memory => Arc::new(MemoryBackend::new()),
        BackendConfig::Fs(fs) => Arc::new(FsBackend::new(&fs.dir)?),
    };
    Ok(backend)
}

/// Path-based filesystem operations over a backend client.
///
/// Every call resolves the caller's path under the configured root, applies
/// the read-only gate when it mutates, and makes the backend calls for that
/// operation. Nothing is cached between calls. Open file handles are owned by
/// the backend; the caller keeps the token between `open`/`create` and
/// `release`.
pub struct CastorFs {
    config: Arc<MountConfig>,
    backend: Arc<dyn Backend>,
    resolver: PathResolver,
    gate: ReadOnlyGate,
    catalog: Arc<AttributeCatalog>,
}

impl CastorFs {
    pub fn new(config: Arc<MountConfig>, backend: Arc<dyn Backend>) -> Self {
        let resolver = PathResolver::new(&config);
        let gate = ReadOnlyGate::new(&config);
        let catalog = Arc::new(AttributeCatalog::new());
        debug!(
            root = resolver.root(),
            read_only = gate.is_read_only(),
            catalog_len = catalog.len(),
            "adapter ready"
        );

        CastorFs {
            config,
            backend,
            resolver,
            gate,
            catalog,
        }
    }

    /// Adapter over the backend named in `config.backend`.
    pub fn from_config(config: Arc<MountConfig>) -> Result<Self, BackendError> {
        let backend = build_backend(&config.backend)?;
        Ok(Self::new(config, backend))
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn catalog(&self) -> &AttributeCatalog {
        &self.catalog
    }

    #[instrument(skip(self))]
    pub async fn getattr(&self, path: &str) -> FsResult<FileStat> {
        let full = self.resolver.resolve(path)?;
        debug!(full = %full, "resolved path");
        Ok(self.backend.stat(&full).await?)
    }

    /// Permission checks are left to the backend on the actual call.
    pub async fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        debug!(path, mask, "access");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        self.gate.guard(Mutation::Chown)?;
        let full = self.resolver.resolve(path)?;
        Ok(self.backend.chown(&full, uid, gid).await?)
    }

    /// Feed every entry of a directory to `sink` until it returns `true`.
    ///
    /// The directory handle is closed on every path out, including errors.
    #[instrument(skip(self, sink))]
    pub async fn readdir<F>(&self, path: &str, mut sink: F) -> FsResult<()>
    where
        F: FnMut(&DirEntry) -> bool + Send,
    {
        let full = self.resolver.resolve(path)?;
        let dir = self.backend.open_dir(&full).await?;

        let result = loop {
            match self.backend.read_dir(dir).await {
                Ok(Some(entry)) => {
                    if sink(&entry) {
                        debug!(full = %full, "entry sink full");
                        break Ok(());
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = self.backend.close_dir(dir).await {
            warn!(full = %full, error = %e, "closedir failed");
        }
        Ok(result?)
    }

    #[instrument(skip(self))]
    pub async fn create(&self, path: &str, mode: u32) -> FsResult<FileHandle> {
        self.gate.guard(Mutation::Create)?;
        let full = self.resolver.resolve(path)?;
        let flags = libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC;
        Ok(self.backend.open(&full, flags, mode).await?)
    }

    #[instrument(skip(self))]
    pub async fn open(&self, path: &str, flags: i32) -> FsResult<FileHandle> {
        let full = self.resolver.resolve(path)?;
        Ok(self.backend.open(&full, flags, OPEN_MODE).await?)
    }

    /// Read up to `size` bytes at `offset`. Short only at end of file.
    pub async fn read(&self, fh: FileHandle, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        self.backend.seek(fh, offset).await?;
        let data = self.backend.read(fh, size).await?;
        debug!(fh = fh.0, offset, size, read = data.len(), "read");
        Ok(data)
    }

    pub async fn write(&self, fh: FileHandle, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.gate.guard(Mutation::Write)?;
        self.backend.seek(fh, offset).await?;
        let written = self.backend.write(fh, data).await?;
        debug!(fh = fh.0, offset, written, "write");
        Ok(written)
    }

    /// Close the handle. Close failures are logged, never returned.
    pub async fn release(&self, fh: FileHandle) -> FsResult<()> {
        if let Err(e) = self.backend.close(fh).await {
            warn!(fh = fh.0, error = %e, "close failed");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        self.gate.guard(Mutation::Unlink)?;
        let full = self.resolver.resolve(path)?;
        Ok(self.backend.unlink(&full).await?)
    }

    #[instrument(skip(self))]
    pub async fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        self.gate.guard(Mutation::Mkdir)?;
        let full = self.resolver.resolve(path)?;
        Ok(self.backend.mkdir(&full, mode).await?)
    }

    /// Not subject to the read-only gate.
    #[instrument(skip(self))]
    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        let full = self.resolver.resolve(path)?;
        Ok(self.backend.rmdir(&full).await?)
    }

    /// Recreates the file empty, whatever `size` asks for.
    #[instrument(skip(self))]
    pub async fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        self.gate.guard(Mutation::Truncate)?;
        if size != 0 {
            debug!(path, size, "only truncation to zero is supported");
        }
        let full = self.resolver.resolve(path)?;
        let flags = libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC;
        let fh = self.backend.open(&full, flags, OPEN_MODE).await?;
        Ok(self.backend.close(fh).await?)
    }

    /// Accepted and ignored.
    pub async fn utimens(&self, path: &str) -> FsResult<()> {
        debug!(path, "utimens ignored");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn listxattr(&self, path: &str, capacity: usize) -> FsResult<XattrReply> {
        let full = self.resolver.resolve(path)?;
        xattr::list(self.backend.as_ref(), &self.catalog, &full, capacity).await
    }

    #[instrument(skip(self))]
    pub async fn getxattr(&self, path: &str, name: &str, capacity: usize) -> FsResult<XattrReply> {
        let full = self.resolver.resolve(path)?;
        xattr::get(self.backend.as_ref(), &full, name, capacity).await
    }

    /// Accepted and ignored.
    pub async fn removexattr(&self, path: &str, name: &str) -> FsResult<()> {
        debug!(path, name, "removexattr ignored");
        Ok(())
    }
}
