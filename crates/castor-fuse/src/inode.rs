//! Inode management for the FUSE binding.
//!
//! The adapter is path based while the kernel speaks inodes. The table keeps
//! a stable number per mount-relative path; attributes are not cached here
//! and always come from a fresh backend stat.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use castor_core::{FileStat, S_IFDIR, S_IFLNK, S_IFMT};
use parking_lot::RwLock;

/// Reserved inode for the mount root.
pub const ROOT_INO: u64 = 1;

/// Inode attributes matching FUSE requirements.
#[derive(Debug, Clone)]
pub struct InodeAttr {
    pub ino: u64,
    pub size: u64,
    /// Number of 512-byte blocks.
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub kind: InodeKind,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

/// Type of inode (file, directory, or symlink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
    Symlink,
}

impl InodeKind {
    /// Kind from the type bits of an `st_mode`. Unknown types read as files.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => InodeKind::Directory,
            S_IFLNK => InodeKind::Symlink,
            _ => InodeKind::File,
        }
    }
}

impl InodeAttr {
    /// Attributes of `ino` from a backend status record.
    pub fn from_stat(ino: u64, stat: &FileStat) -> Self {
        InodeAttr {
            ino,
            size: stat.size,
            blocks: stat.size.div_ceil(512),
            atime: SystemTime::from(stat.atime),
            mtime: SystemTime::from(stat.mtime),
            ctime: SystemTime::from(stat.ctime),
            kind: InodeKind::from_mode(stat.mode),
            perm: stat.perm(),
            nlink: stat.nlink,
            uid: stat.uid,
            gid: stat.gid,
        }
    }

    /// Default TTL for attributes.
    pub fn ttl() -> Duration {
        Duration::from_secs(1)
    }
}

/// Path-to-inode and inode-to-path mappings.
pub struct InodeTable {
    path_to_ino: RwLock<HashMap<String, u64>>,
    ino_to_path: RwLock<HashMap<u64, String>>,
    next_ino: RwLock<u64>,
}

impl InodeTable {
    /// Create a new inode table with the root directory mapped.
    pub fn new() -> Self {
        let table = InodeTable {
            path_to_ino: RwLock::new(HashMap::new()),
            ino_to_path: RwLock::new(HashMap::new()),
            next_ino: RwLock::new(ROOT_INO + 1),
        };
        table.path_to_ino.write().insert("/".to_string(), ROOT_INO);
        table.ino_to_path.write().insert(ROOT_INO, "/".to_string());
        table
    }

    /// Get or allocate the inode of a path.
    pub fn get_or_create(&self, path: &str) -> u64 {
        let normalized = Self::normalize_path(path);

        if let Some(&ino) = self.path_to_ino.read().get(&normalized) {
            return ino;
        }

        let mut path_to_ino = self.path_to_ino.write();
        // Another thread may have won the race between the two locks.
        if let Some(&ino) = path_to_ino.get(&normalized) {
            return ino;
        }

        let ino = {
            let mut next = self.next_ino.write();
            let ino = *next;
            *next += 1;
            ino
        };
        path_to_ino.insert(normalized.clone(), ino);
        self.ino_to_path.write().insert(ino, normalized);
        ino
    }

    pub fn get_ino(&self, path: &str) -> Option<u64> {
        let normalized = Self::normalize_path(path);
        self.path_to_ino.read().get(&normalized).copied()
    }

    pub fn get_path(&self, ino: u64) -> Option<String> {
        self.ino_to_path.read().get(&ino).cloned()
    }

    /// Forget a path. The root is never removed.
    pub fn remove_path(&self, path: &str) {
        let normalized = Self::normalize_path(path);
        if normalized == "/" {
            return;
        }

        let mut path_to_ino = self.path_to_ino.write();
        if let Some(ino) = path_to_ino.remove(&normalized) {
            self.ino_to_path.write().remove(&ino);
        }
    }

    /// Child path from parent inode and name.
    pub fn resolve_child(&self, parent_ino: u64, name: &str) -> Option<String> {
        let parent_path = self.get_path(parent_ino)?;
        Some(join_path(&parent_path, name))
    }

    /// Inode of the directory holding `ino`. The root is its own parent.
    pub fn parent_of(&self, ino: u64) -> Option<u64> {
        let path = self.get_path(ino)?;
        let parent = match path.rsplit_once('/') {
            Some(("", _)) | None => "/",
            Some((parent, _)) => parent,
        };
        Some(self.get_or_create(parent))
    }

    fn normalize_path(path: &str) -> String {
        let mut normalized = path.to_string();

        if !normalized.starts_with('/') {
            normalized = format!("/{}", normalized);
        }

        if normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }

        normalized
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castor_core::{MigrationStatus, S_IFREG};
    use chrono::Utc;
    use std::sync::Arc;
    use std::thread;

    fn stat(mode: u32, size: u64) -> FileStat {
        let now = Utc::now();
        FileStat {
            mode,
            size,
            uid: 10,
            gid: 20,
            nlink: 1,
            atime: now,
            mtime: now,
            ctime: now,
            status: MigrationStatus::Online,
        }
    }

    #[test]
    fn test_attr_from_stat() {
        let attr = InodeAttr::from_stat(42, &stat(S_IFREG | 0o640, 1024));
        assert_eq!(attr.ino, 42);
        assert_eq!(attr.kind, InodeKind::File);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.size, 1024);
        assert_eq!(attr.blocks, 2);
        assert_eq!((attr.uid, attr.gid), (10, 20));
    }

    #[test]
    fn test_block_calculation() {
        assert_eq!(InodeAttr::from_stat(1, &stat(S_IFREG, 0)).blocks, 0);
        assert_eq!(InodeAttr::from_stat(1, &stat(S_IFREG, 1)).blocks, 1);
        assert_eq!(InodeAttr::from_stat(1, &stat(S_IFREG, 513)).blocks, 2);
    }

    #[test]
    fn test_kind_from_mode() {
        assert_eq!(InodeKind::from_mode(S_IFDIR | 0o755), InodeKind::Directory);
        assert_eq!(InodeKind::from_mode(S_IFLNK | 0o777), InodeKind::Symlink);
        assert_eq!(InodeKind::from_mode(S_IFREG | 0o644), InodeKind::File);
    }

    #[test]
    fn test_root_is_preallocated() {
        let table = InodeTable::new();
        assert_eq!(table.get_ino("/"), Some(ROOT_INO));
        assert_eq!(table.get_path(ROOT_INO).as_deref(), Some("/"));
        assert_eq!(table.parent_of(ROOT_INO), Some(ROOT_INO));
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let table = InodeTable::new();
        let a = table.get_or_create("/a/b.txt");
        assert_eq!(table.get_or_create("a/b.txt"), a);
        assert_eq!(table.get_or_create("/a/b.txt/"), a);
        assert_ne!(table.get_or_create("/a"), a);
    }

    #[test]
    fn test_resolve_child_and_parent() {
        let table = InodeTable::new();
        assert_eq!(table.resolve_child(ROOT_INO, "a").as_deref(), Some("/a"));

        let a = table.get_or_create("/a");
        assert_eq!(table.resolve_child(a, "b").as_deref(), Some("/a/b"));

        let b = table.get_or_create("/a/b");
        assert_eq!(table.parent_of(b), Some(a));
        assert_eq!(table.resolve_child(999, "x"), None);
    }

    #[test]
    fn test_remove_path() {
        let table = InodeTable::new();
        let ino = table.get_or_create("/gone");
        table.remove_path("/gone");
        assert_eq!(table.get_ino("/gone"), None);
        assert_eq!(table.get_path(ino), None);

        table.remove_path("/");
        assert_eq!(table.get_ino("/"), Some(ROOT_INO));
    }

    #[test]
    fn test_concurrent_allocation_is_consistent() {
        let table = Arc::new(InodeTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || table.get_or_create("/shared"))
            })
            .collect();

        let inos: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(inos.iter().all(|&ino| ino == inos[0]));
    }
}
