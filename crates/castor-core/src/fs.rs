use std::collections::{HashMap, VecDeque};
use std::io::SeekFrom;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::error::BackendError;
use crate::traits::{Backend, DirEntry, DirHandle, FileHandle, FileStat, MigrationStatus, SegmentRecord};

/// Local directory served as the namespace.
///
/// Namespace path `/castor/x` lives at `<root>/castor/x`. Files are always
/// online and have no tape segments.
pub struct FsBackend {
    root: PathBuf,
    files: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<File>>>>,
    dirs: Mutex<HashMap<u64, VecDeque<DirEntry>>>,
    next_handle: AtomicU64,
}

impl FsBackend {
    /// Create a backend rooted at the given directory, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, BackendError> {
        let root = root.as_ref();
        if !root.exists() {
            std::fs::create_dir_all(root)?;
        }
        let root = root.canonicalize()?;

        Ok(FsBackend {
            root,
            files: Mutex::new(HashMap::new()),
            dirs: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Map a namespace path into the root, refusing to climb out of it.
    fn resolve_path(&self, path: &str) -> Result<PathBuf, BackendError> {
        let rel = Path::new(path.trim_start_matches('/'));
        for component in rel.components() {
            match component {
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(BackendError::errno(libc::EACCES, path));
                }
                _ => {}
            }
        }
        let full_path = self.root.join(rel);

        // Symlinks inside the root must still land under it.
        let mut ancestor = full_path.as_path();
        while !ancestor.exists() {
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }
        if !ancestor.canonicalize()?.starts_with(&self.root) {
            return Err(BackendError::errno(libc::EACCES, path));
        }

        Ok(full_path)
    }

    fn alloc_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    fn file(&self, fh: FileHandle) -> Result<Arc<tokio::sync::Mutex<File>>, BackendError> {
        self.files
            .lock()
            .get(&fh.0)
            .cloned()
            .ok_or(BackendError::BadHandle(fh.0))
    }
}

fn timestamp(secs: i64, nsecs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, nsecs.clamp(0, 999_999_999) as u32).unwrap_or_default()
}

#[async_trait]
impl Backend for FsBackend {
    #[instrument(skip(self), fields(backend = "fs"))]
    async fn stat(&self, path: &str) -> Result<FileStat, BackendError> {
        let full_path = self.resolve_path(path)?;
        let meta = fs::symlink_metadata(&full_path).await?;

        Ok(FileStat {
            mode: meta.mode(),
            size: meta.size(),
            uid: meta.uid(),
            gid: meta.gid(),
            nlink: meta.nlink() as u32,
            atime: timestamp(meta.atime(), meta.atime_nsec()),
            mtime: timestamp(meta.mtime(), meta.mtime_nsec()),
            ctime: timestamp(meta.ctime(), meta.ctime_nsec()),
            status: if meta.is_file() {
                MigrationStatus::Online
            } else {
                MigrationStatus::Unknown
            },
        })
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn open_dir(&self, path: &str) -> Result<DirHandle, BackendError> {
        let full_path = self.resolve_path(path)?;
        let mut read_dir = fs::read_dir(&full_path).await?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(path, "skipping non UTF-8 entry");
                continue;
            };
            let meta = entry.metadata().await?;
            entries.push(DirEntry {
                name,
                mode: meta.mode(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let handle = self.alloc_handle();
        self.dirs.lock().insert(handle, entries.into());
        Ok(DirHandle(handle))
    }

    async fn read_dir(&self, dir: DirHandle) -> Result<Option<DirEntry>, BackendError> {
        let mut dirs = self.dirs.lock();
        let entries = dirs.get_mut(&dir.0).ok_or(BackendError::BadHandle(dir.0))?;
        Ok(entries.pop_front())
    }

    async fn close_dir(&self, dir: DirHandle) -> Result<(), BackendError> {
        self.dirs
            .lock()
            .remove(&dir.0)
            .map(|_| ())
            .ok_or(BackendError::BadHandle(dir.0))
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn open(&self, path: &str, flags: i32, mode: u32) -> Result<FileHandle, BackendError> {
        let full_path = self.resolve_path(path)?;
        let access = flags & libc::O_ACCMODE;
        let handled =
            libc::O_ACCMODE | libc::O_CREAT | libc::O_TRUNC | libc::O_EXCL | libc::O_APPEND;

        let mut options = fs::OpenOptions::new();
        options
            .read(access == libc::O_RDONLY || access == libc::O_RDWR)
            .write(access == libc::O_WRONLY || access == libc::O_RDWR)
            .append(flags & libc::O_APPEND != 0)
            .truncate(flags & libc::O_TRUNC != 0)
            .mode(mode)
            .custom_flags(flags & !handled);
        if flags & libc::O_CREAT != 0 {
            if flags & libc::O_EXCL != 0 {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }

        let file = options.open(&full_path).await?;
        let handle = self.alloc_handle();
        self.files
            .lock()
            .insert(handle, Arc::new(tokio::sync::Mutex::new(file)));
        Ok(FileHandle(handle))
    }

    async fn seek(&self, fh: FileHandle, offset: u64) -> Result<u64, BackendError> {
        let file = self.file(fh)?;
        let mut file = file.lock().await;
        Ok(file.seek(SeekFrom::Start(offset)).await?)
    }

    async fn read(&self, fh: FileHandle, size: usize) -> Result<Vec<u8>, BackendError> {
        let file = self.file(fh)?;
        let mut file = file.lock().await;

        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    async fn write(&self, fh: FileHandle, data: &[u8]) -> Result<usize, BackendError> {
        let file = self.file(fh)?;
        let mut file = file.lock().await;
        file.write_all(data).await?;
        Ok(data.len())
    }

    async fn close(&self, fh: FileHandle) -> Result<(), BackendError> {
        let file = self
            .files
            .lock()
            .remove(&fh.0)
            .ok_or(BackendError::BadHandle(fh.0))?;
        let mut file = file.lock().await;
        file.flush().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn unlink(&self, path: &str) -> Result<(), BackendError> {
        let full_path = self.resolve_path(path)?;
        fs::remove_file(&full_path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), BackendError> {
        let full_path = self.resolve_path(path)?;
        fs::DirBuilder::new().mode(mode).create(&full_path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn rmdir(&self, path: &str) -> Result<(), BackendError> {
        let full_path = self.resolve_path(path)?;
        fs::remove_dir(&full_path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<(), BackendError> {
        let full_path = self.resolve_path(path)?;
        tokio::task::spawn_blocking(move || std::os::unix::fs::chown(full_path, uid, gid))
            .await
            .map_err(|e| BackendError::Other(e.to_string()))??;
        Ok(())
    }

    async fn segments(&self, path: &str) -> Result<Vec<SegmentRecord>, BackendError> {
        let full_path = self.resolve_path(path)?;
        fs::symlink_metadata(&full_path).await?;
        Ok(Vec::new())
    }
}
