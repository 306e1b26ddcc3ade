use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BackendError;

/// File type bits of `st_mode`, widened to `u32` on every unix.
pub const S_IFMT: u32 = libc::S_IFMT as u32;
pub const S_IFDIR: u32 = libc::S_IFDIR as u32;
pub const S_IFREG: u32 = libc::S_IFREG as u32;
pub const S_IFLNK: u32 = libc::S_IFLNK as u32;

/// Where the file content currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationStatus {
    /// Content is on disk in the stager.
    Online,
    /// Content has been migrated to tape.
    Migrated,
    /// Anything else the name server reports.
    #[default]
    Unknown,
}

impl MigrationStatus {
    /// Map the name server's one-byte status marker.
    pub fn from_marker(marker: u8) -> Self {
        match marker {
            b'm' => MigrationStatus::Migrated,
            b'o' => MigrationStatus::Online,
            _ => MigrationStatus::Unknown,
        }
    }

    /// Value exposed through the status xattr.
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Migrated => "migrated",
            MigrationStatus::Online => "online",
            MigrationStatus::Unknown => "unknown",
        }
    }
}

/// Status record for one catalogue entry. Fetched fresh on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// File type and permission bits, as in `st_mode`.
    pub mode: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub atime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
    pub status: MigrationStatus,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Permission bits without the file type.
    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}

/// Checksum metadata of one physical segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Checksum algorithm, e.g. `adler32`.
    pub checksum_name: String,
    pub checksum: u64,
}

impl SegmentRecord {
    pub fn new(checksum_name: impl Into<String>, checksum: u64) -> Self {
        SegmentRecord {
            checksum_name: checksum_name.into(),
            checksum,
        }
    }
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    /// `st_mode` of the entry, type bits included.
    pub mode: u32,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }
}

/// Opaque handle of an open file, owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub u64);

/// Opaque handle of an open directory stream, owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirHandle(pub u64);

/// Backend client: the name server plus the remote I/O service.
///
/// All paths are absolute namespace paths. Implementations must be safe to
/// call from many operations at once.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Status record of one entry.
    async fn stat(&self, path: &str) -> Result<FileStat, BackendError>;

    /// Open a directory stream.
    async fn open_dir(&self, path: &str) -> Result<DirHandle, BackendError>;

    /// Next entry of a directory stream, `None` at the end.
    async fn read_dir(&self, dir: DirHandle) -> Result<Option<DirEntry>, BackendError>;

    /// Close a directory stream.
    async fn close_dir(&self, dir: DirHandle) -> Result<(), BackendError>;

    /// Open a file with `open(2)` flags.
    async fn open(&self, path: &str, flags: i32, mode: u32) -> Result<FileHandle, BackendError>;

    /// Set the absolute position of an open file.
    async fn seek(&self, fh: FileHandle, offset: u64) -> Result<u64, BackendError>;

    /// Read up to `size` bytes from the current position.
    async fn read(&self, fh: FileHandle, size: usize) -> Result<Vec<u8>, BackendError>;

    /// Write at the current position, returning the bytes written.
    async fn write(&self, fh: FileHandle, data: &[u8]) -> Result<usize, BackendError>;

    /// Close an open file.
    async fn close(&self, fh: FileHandle) -> Result<(), BackendError>;

    async fn unlink(&self, path: &str) -> Result<(), BackendError>;

    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), BackendError>;

    async fn rmdir(&self, path: &str) -> Result<(), BackendError>;

    /// Change owner. `None` leaves that id unchanged.
    async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<(), BackendError>;

    /// Segment checksum records, in segment order.
    async fn segments(&self, path: &str) -> Result<Vec<SegmentRecord>, BackendError>;
}
