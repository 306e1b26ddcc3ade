use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::BackendError;
use crate::traits::{
    Backend, DirEntry, DirHandle, FileHandle, FileStat, MigrationStatus, SegmentRecord, S_IFDIR,
    S_IFREG,
};

#[derive(Debug, Clone)]
enum NodeKind {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    perm: u32,
    uid: u32,
    gid: u32,
    atime: DateTime<Utc>,
    mtime: DateTime<Utc>,
    ctime: DateTime<Utc>,
    status: MigrationStatus,
    segments: Vec<SegmentRecord>,
}

impl Node {
    fn dir(perm: u32) -> Self {
        Self::with_kind(NodeKind::Dir, perm, MigrationStatus::Unknown)
    }

    fn file(content: Vec<u8>, perm: u32) -> Self {
        Self::with_kind(NodeKind::File(content), perm, MigrationStatus::Online)
    }

    fn with_kind(kind: NodeKind, perm: u32, status: MigrationStatus) -> Self {
        let now = Utc::now();
        Node {
            kind,
            perm: perm & 0o7777,
            uid: 0,
            gid: 0,
            atime: now,
            mtime: now,
            ctime: now,
            status,
            segments: Vec::new(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    fn mode(&self) -> u32 {
        match self.kind {
            NodeKind::Dir => S_IFDIR | self.perm,
            NodeKind::File(_) => S_IFREG | self.perm,
        }
    }

    fn touch(&mut self) {
        let now = Utc::now();
        self.mtime = now;
        self.ctime = now;
    }
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    pos: u64,
    readable: bool,
    writable: bool,
    append: bool,
}

/// Largest file the in-memory catalogue will hold. Writes reaching past it
/// fail with `EFBIG`.
pub const MAX_FILE_SIZE: u64 = 1 << 32;

/// In-memory name server and I/O service.
///
/// Used by tests and for trying the mount without a real catalogue. Every
/// [`Backend`] call is counted; the seeding helpers are not.
pub struct MemoryBackend {
    nodes: RwLock<BTreeMap<String, Node>>,
    files: Mutex<HashMap<u64, OpenFile>>,
    dirs: Mutex<HashMap<u64, VecDeque<DirEntry>>>,
    next_handle: AtomicU64,
    calls: AtomicUsize,
}

impl MemoryBackend {
    /// Create a catalogue holding only `/`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::dir(0o755));
        MemoryBackend {
            nodes: RwLock::new(nodes),
            files: Mutex::new(HashMap::new()),
            dirs: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a directory and any missing parents.
    pub fn add_dir(&self, path: &str) {
        let path = normalize_path(path);
        let mut nodes = self.nodes.write();
        for ancestor in ancestors(&path) {
            nodes.entry(ancestor).or_insert_with(|| Node::dir(0o755));
        }
        nodes.entry(path).or_insert_with(|| Node::dir(0o755));
    }

    /// Create or replace a file, creating missing parent directories.
    pub fn add_file(&self, path: &str, content: &[u8]) {
        let path = normalize_path(path);
        let mut nodes = self.nodes.write();
        for ancestor in ancestors(&path) {
            nodes.entry(ancestor).or_insert_with(|| Node::dir(0o755));
        }
        nodes.insert(path, Node::file(content.to_vec(), 0o644));
    }

    pub fn set_status(&self, path: &str, status: MigrationStatus) {
        if let Some(node) = self.nodes.write().get_mut(&normalize_path(path)) {
            node.status = status;
        }
    }

    pub fn set_segments(&self, path: &str, segments: Vec<SegmentRecord>) {
        if let Some(node) = self.nodes.write().get_mut(&normalize_path(path)) {
            node.segments = segments;
        }
    }

    /// Current content of a file.
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        match &self.nodes.read().get(&normalize_path(path))?.kind {
            NodeKind::File(content) => Some(content.clone()),
            NodeKind::Dir => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.read().contains_key(&normalize_path(path))
    }

    /// Owner of an entry as `(uid, gid)`.
    pub fn owner(&self, path: &str) -> Option<(u32, u32)> {
        self.nodes
            .read()
            .get(&normalize_path(path))
            .map(|node| (node.uid, node.gid))
    }

    /// Number of [`Backend`] calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of file handles not yet closed.
    pub fn open_file_count(&self) -> usize {
        self.files.lock().len()
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn alloc_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    fn stat_node(node: &Node) -> FileStat {
        let (size, nlink) = match &node.kind {
            NodeKind::Dir => (0, 2),
            NodeKind::File(content) => (content.len() as u64, 1),
        };
        FileStat {
            mode: node.mode(),
            size,
            uid: node.uid,
            gid: node.gid,
            nlink,
            atime: node.atime,
            mtime: node.mtime,
            ctime: node.ctime,
            status: node.status,
        }
    }

    fn parent_must_be_dir(nodes: &BTreeMap<String, Node>, path: &str) -> Result<(), BackendError> {
        let parent = parent_path(path);
        match nodes.get(&parent) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(BackendError::errno(libc::ENOTDIR, path)),
            None => Err(BackendError::NotFound(path.to_string())),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn stat(&self, path: &str) -> Result<FileStat, BackendError> {
        self.count();
        let nodes = self.nodes.read();
        nodes
            .get(&normalize_path(path))
            .map(Self::stat_node)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    async fn open_dir(&self, path: &str) -> Result<DirHandle, BackendError> {
        self.count();
        let normalized = normalize_path(path);
        let nodes = self.nodes.read();

        match nodes.get(&normalized) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(BackendError::errno(libc::ENOTDIR, path)),
            None => return Err(BackendError::NotFound(path.to_string())),
        }

        let prefix = if normalized == "/" {
            "/".to_string()
        } else {
            format!("{}/", normalized)
        };

        let entries: VecDeque<DirEntry> = nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, node)| {
                let name = &key[prefix.len()..];
                if name.is_empty() || name.contains('/') {
                    return None;
                }
                Some(DirEntry {
                    name: name.to_string(),
                    mode: node.mode(),
                })
            })
            .collect();

        let handle = self.alloc_handle();
        self.dirs.lock().insert(handle, entries);
        Ok(DirHandle(handle))
    }

    async fn read_dir(&self, dir: DirHandle) -> Result<Option<DirEntry>, BackendError> {
        self.count();
        let mut dirs = self.dirs.lock();
        let entries = dirs.get_mut(&dir.0).ok_or(BackendError::BadHandle(dir.0))?;
        Ok(entries.pop_front())
    }

    async fn close_dir(&self, dir: DirHandle) -> Result<(), BackendError> {
        self.count();
        self.dirs
            .lock()
            .remove(&dir.0)
            .map(|_| ())
            .ok_or(BackendError::BadHandle(dir.0))
    }

    async fn open(&self, path: &str, flags: i32, mode: u32) -> Result<FileHandle, BackendError> {
        self.count();
        let normalized = normalize_path(path);
        let access = flags & libc::O_ACCMODE;
        let readable = access == libc::O_RDONLY || access == libc::O_RDWR;
        let writable = access == libc::O_WRONLY || access == libc::O_RDWR;

        let mut nodes = self.nodes.write();
        match nodes.get_mut(&normalized) {
            Some(node) => {
                if flags & libc::O_CREAT != 0 && flags & libc::O_EXCL != 0 {
                    return Err(BackendError::errno(libc::EEXIST, path));
                }
                match &mut node.kind {
                    NodeKind::Dir if writable => {
                        return Err(BackendError::errno(libc::EISDIR, path));
                    }
                    NodeKind::Dir => {}
                    NodeKind::File(content) => {
                        if writable && flags & libc::O_TRUNC != 0 {
                            content.clear();
                            node.segments.clear();
                            node.touch();
                        }
                    }
                }
            }
            None => {
                if flags & libc::O_CREAT == 0 {
                    return Err(BackendError::NotFound(path.to_string()));
                }
                Self::parent_must_be_dir(&nodes, &normalized)?;
                nodes.insert(normalized.clone(), Node::file(Vec::new(), mode));
            }
        }
        drop(nodes);

        let handle = self.alloc_handle();
        self.files.lock().insert(
            handle,
            OpenFile {
                path: normalized,
                pos: 0,
                readable,
                writable,
                append: flags & libc::O_APPEND != 0,
            },
        );
        Ok(FileHandle(handle))
    }

    async fn seek(&self, fh: FileHandle, offset: u64) -> Result<u64, BackendError> {
        self.count();
        let mut files = self.files.lock();
        let file = files.get_mut(&fh.0).ok_or(BackendError::BadHandle(fh.0))?;
        file.pos = offset;
        Ok(offset)
    }

    async fn read(&self, fh: FileHandle, size: usize) -> Result<Vec<u8>, BackendError> {
        self.count();
        let mut files = self.files.lock();
        let file = files.get_mut(&fh.0).ok_or(BackendError::BadHandle(fh.0))?;
        if !file.readable {
            return Err(BackendError::BadHandle(fh.0));
        }

        let nodes = self.nodes.read();
        let content = match nodes.get(&file.path).map(|node| &node.kind) {
            Some(NodeKind::File(content)) => content,
            Some(NodeKind::Dir) => return Err(BackendError::errno(libc::EISDIR, &file.path)),
            None => return Err(BackendError::NotFound(file.path.clone())),
        };

        let start = match usize::try_from(file.pos) {
            Ok(start) if file.pos <= MAX_FILE_SIZE => start,
            _ => return Ok(Vec::new()),
        };
        if start >= content.len() {
            return Ok(Vec::new());
        }
        let end = start.saturating_add(size).min(content.len());
        file.pos = end as u64;
        Ok(content[start..end].to_vec())
    }

    async fn write(&self, fh: FileHandle, data: &[u8]) -> Result<usize, BackendError> {
        self.count();
        let mut files = self.files.lock();
        let file = files.get_mut(&fh.0).ok_or(BackendError::BadHandle(fh.0))?;
        if !file.writable {
            return Err(BackendError::BadHandle(fh.0));
        }

        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&file.path)
            .ok_or_else(|| BackendError::NotFound(file.path.clone()))?;
        let NodeKind::File(content) = &mut node.kind else {
            return Err(BackendError::errno(libc::EISDIR, &file.path));
        };

        let too_big = || BackendError::errno(libc::EFBIG, &file.path);
        let start = if file.append {
            content.len()
        } else {
            usize::try_from(file.pos).map_err(|_| too_big())?
        };
        let end = start
            .checked_add(data.len())
            .filter(|&end| end as u64 <= MAX_FILE_SIZE)
            .ok_or_else(too_big)?;
        if end > content.len() {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        node.touch();
        file.pos = end as u64;
        Ok(data.len())
    }

    async fn close(&self, fh: FileHandle) -> Result<(), BackendError> {
        self.count();
        self.files
            .lock()
            .remove(&fh.0)
            .map(|_| ())
            .ok_or(BackendError::BadHandle(fh.0))
    }

    async fn unlink(&self, path: &str) -> Result<(), BackendError> {
        self.count();
        let normalized = normalize_path(path);
        let mut nodes = self.nodes.write();
        match nodes.get(&normalized) {
            Some(node) if node.is_dir() => Err(BackendError::errno(libc::EISDIR, path)),
            Some(_) => {
                nodes.remove(&normalized);
                Ok(())
            }
            None => Err(BackendError::NotFound(path.to_string())),
        }
    }

    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), BackendError> {
        self.count();
        let normalized = normalize_path(path);
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&normalized) {
            return Err(BackendError::errno(libc::EEXIST, path));
        }
        Self::parent_must_be_dir(&nodes, &normalized)?;
        nodes.insert(normalized, Node::dir(mode));
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> Result<(), BackendError> {
        self.count();
        let normalized = normalize_path(path);
        if normalized == "/" {
            return Err(BackendError::errno(libc::EBUSY, path));
        }

        let mut nodes = self.nodes.write();
        match nodes.get(&normalized) {
            Some(node) if !node.is_dir() => return Err(BackendError::errno(libc::ENOTDIR, path)),
            Some(_) => {}
            None => return Err(BackendError::NotFound(path.to_string())),
        }

        let prefix = format!("{}/", normalized);
        if nodes.range(prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&prefix)) {
            return Err(BackendError::errno(libc::ENOTEMPTY, path));
        }
        nodes.remove(&normalized);
        Ok(())
    }

    async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<(), BackendError> {
        self.count();
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&normalize_path(path))
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        if let Some(uid) = uid {
            node.uid = uid;
        }
        if let Some(gid) = gid {
            node.gid = gid;
        }
        node.ctime = Utc::now();
        Ok(())
    }

    async fn segments(&self, path: &str) -> Result<Vec<SegmentRecord>, BackendError> {
        self.count();
        let nodes = self.nodes.read();
        nodes
            .get(&normalize_path(path))
            .map(|node| node.segments.clone())
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }
}

/// Normalize a path to a leading slash and no trailing slash.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

fn parent_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

/// Proper ancestors of a normalized path, outermost first.
fn ancestors(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = parent_path(path);
    while current != "/" {
        let next = parent_path(&current);
        result.push(current);
        current = next;
    }
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a/b/"), "/a/b");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("/a/b/c"), vec!["/a", "/a/b"]);
        assert!(ancestors("/a").is_empty());
    }

    #[test]
    fn test_add_file_creates_parents() {
        let backend = MemoryBackend::new();
        backend.add_file("/castor/a/b.txt", b"data");
        assert!(backend.exists("/castor"));
        assert!(backend.exists("/castor/a"));
        assert_eq!(backend.content("/castor/a/b.txt").unwrap(), b"data");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stat_file_and_dir() {
        let backend = MemoryBackend::new();
        backend.add_file("/castor/f", b"12345");

        let stat = backend.stat("/castor/f").await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(!stat.is_dir());
        assert_eq!(stat.status, MigrationStatus::Online);

        let stat = backend.stat("/castor").await.unwrap();
        assert!(stat.is_dir());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_directory_stream() {
        let backend = MemoryBackend::new();
        backend.add_file("/castor/b", b"");
        backend.add_file("/castor/a", b"");
        backend.add_dir("/castor/sub");
        backend.add_file("/castor/sub/deep", b"");

        let dir = backend.open_dir("/castor").await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = backend.read_dir(dir).await.unwrap() {
            names.push(entry.name);
        }
        backend.close_dir(dir).await.unwrap();

        assert_eq!(names, vec!["a", "b", "sub"]);
        assert!(matches!(
            backend.read_dir(dir).await,
            Err(BackendError::BadHandle(_))
        ));
    }

    #[tokio::test]
    async fn test_read_only_handle_rejects_write() {
        let backend = MemoryBackend::new();
        backend.add_file("/f", b"abc");
        let fh = backend.open("/f", libc::O_RDONLY, 0).await.unwrap();
        assert!(matches!(
            backend.write(fh, b"x").await,
            Err(BackendError::BadHandle(_))
        ));
        backend.close(fh).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_past_end_zero_fills() {
        let backend = MemoryBackend::new();
        let fh = backend
            .open("/f", libc::O_WRONLY | libc::O_CREAT, 0o644)
            .await
            .unwrap();
        backend.seek(fh, 3).await.unwrap();
        backend.write(fh, b"xy").await.unwrap();
        backend.close(fh).await.unwrap();
        assert_eq!(backend.content("/f").unwrap(), b"\0\0\0xy");
    }

    #[tokio::test]
    async fn test_write_past_max_size_is_efbig() {
        let backend = MemoryBackend::new();
        backend.add_file("/f", b"abc");
        let fh = backend.open("/f", libc::O_RDWR, 0).await.unwrap();

        backend.seek(fh, isize::MAX as u64 - 1).await.unwrap();
        let err = backend.write(fh, b"xy").await.unwrap_err();
        assert_eq!(err.code(), libc::EFBIG);

        backend.seek(fh, MAX_FILE_SIZE).await.unwrap();
        let err = backend.write(fh, b"x").await.unwrap_err();
        assert_eq!(err.code(), libc::EFBIG);

        backend.seek(fh, u64::MAX).await.unwrap();
        assert!(backend.read(fh, 16).await.unwrap().is_empty());

        backend.close(fh).await.unwrap();
        assert_eq!(backend.content("/f").unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_rmdir_not_empty() {
        let backend = MemoryBackend::new();
        backend.add_file("/d/f", b"");
        let err = backend.rmdir("/d").await.unwrap_err();
        assert_eq!(err.code(), libc::ENOTEMPTY);
    }

    #[tokio::test]
    async fn test_rmdir_sibling_prefix_is_not_child() {
        let backend = MemoryBackend::new();
        backend.add_dir("/d");
        backend.add_file("/d2/f", b"");
        backend.rmdir("/d").await.unwrap();
        assert!(!backend.exists("/d"));
    }

    #[tokio::test]
    async fn test_truncate_drops_segments() {
        let backend = MemoryBackend::new();
        backend.add_file("/f", b"data");
        backend.set_segments("/f", vec![SegmentRecord::new("adler32", 1)]);
        let fh = backend
            .open("/f", libc::O_WRONLY | libc::O_TRUNC, 0)
            .await
            .unwrap();
        backend.close(fh).await.unwrap();
        assert!(backend.segments("/f").await.unwrap().is_empty());
        assert_eq!(backend.content("/f").unwrap(), b"");
    }
}
