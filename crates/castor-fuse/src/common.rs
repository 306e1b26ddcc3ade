//! Platform-neutral FUSE operations over the adapter.

use std::sync::Arc;

use castor_core::{CastorFs, FileHandle, XattrReply};
use tracing::debug;

use crate::async_bridge::{block_on, FuseError, FuseResult};
use crate::inode::{join_path, InodeAttr, InodeKind, InodeTable, ROOT_INO};

/// Inode-addressed operations, each one adapter call or a short sequence.
pub struct CastorFuse {
    fs: Arc<CastorFs>,
    inodes: InodeTable,
}

impl CastorFuse {
    pub fn new(fs: Arc<CastorFs>) -> Self {
        CastorFuse {
            fs,
            inodes: InodeTable::new(),
        }
    }

    pub fn adapter(&self) -> &CastorFs {
        &self.fs
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    fn path_of(&self, ino: u64) -> FuseResult<String> {
        self.inodes.get_path(ino).ok_or(FuseError::UnknownInode(ino))
    }

    fn child_of(&self, parent: u64, name: &str) -> FuseResult<String> {
        if name.is_empty() || name.contains('/') {
            return Err(FuseError::InvalidArg(name.to_string()));
        }
        self.inodes
            .resolve_child(parent, name)
            .ok_or(FuseError::UnknownInode(parent))
    }

    fn stat_path(&self, path: &str) -> FuseResult<InodeAttr> {
        match block_on(self.fs.getattr(path))? {
            Ok(stat) => {
                let ino = self.inodes.get_or_create(path);
                Ok(InodeAttr::from_stat(ino, &stat))
            }
            Err(e) => {
                if e.errno() == libc::ENOENT {
                    self.inodes.remove_path(path);
                }
                Err(e.into())
            }
        }
    }

    pub fn do_lookup(&self, parent: u64, name: &str) -> FuseResult<InodeAttr> {
        let path = self.child_of(parent, name)?;
        self.stat_path(&path)
    }

    pub fn do_getattr(&self, ino: u64) -> FuseResult<InodeAttr> {
        let path = self.path_of(ino)?;
        self.stat_path(&path)
    }

    /// Ownership goes to `chown`, size to `truncate`, timestamps to
    /// `utimens`. Mode changes are not supported and ignored.
    pub fn do_setattr(
        &self,
        ino: u64,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        times: bool,
    ) -> FuseResult<InodeAttr> {
        let path = self.path_of(ino)?;
        debug!(path = %path, ?uid, ?gid, ?size, times, "setattr");

        if uid.is_some() || gid.is_some() {
            block_on(self.fs.chown(&path, uid, gid))??;
        }
        if let Some(size) = size {
            block_on(self.fs.truncate(&path, size))??;
        }
        if times {
            block_on(self.fs.utimens(&path))??;
        }
        self.stat_path(&path)
    }

    /// List a directory starting after `offset`.
    ///
    /// `add` receives `(ino, next_offset, kind, name)` and returns `true` when
    /// the reply buffer is full, which ends the listing.
    pub fn do_readdir<F>(&self, ino: u64, offset: i64, mut add: F) -> FuseResult<()>
    where
        F: FnMut(u64, i64, InodeKind, &str) -> bool + Send,
    {
        let path = self.path_of(ino)?;
        let parent = self.inodes.parent_of(ino).unwrap_or(ROOT_INO);

        if offset < 1 && add(ino, 1, InodeKind::Directory, ".") {
            return Ok(());
        }
        if offset < 2 && add(parent, 2, InodeKind::Directory, "..") {
            return Ok(());
        }

        let inodes = &self.inodes;
        let mut next: i64 = 2;
        block_on(self.fs.readdir(&path, |entry| {
            next += 1;
            if next <= offset {
                return false;
            }
            let child = inodes.get_or_create(&join_path(&path, &entry.name));
            add(child, next, InodeKind::from_mode(entry.mode), &entry.name)
        }))??;
        Ok(())
    }

    pub fn do_open(&self, ino: u64, flags: i32) -> FuseResult<u64> {
        let path = self.path_of(ino)?;
        let fh = block_on(self.fs.open(&path, flags))??;
        Ok(fh.0)
    }

    pub fn do_create(&self, parent: u64, name: &str, mode: u32) -> FuseResult<(InodeAttr, u64)> {
        let path = self.child_of(parent, name)?;
        let fh = block_on(self.fs.create(&path, mode))??;
        match self.stat_path(&path) {
            Ok(attr) => Ok((attr, fh.0)),
            Err(e) => {
                self.do_release(fh.0);
                Err(e)
            }
        }
    }

    pub fn do_read(&self, fh: u64, offset: i64, size: u32) -> FuseResult<Vec<u8>> {
        let offset = u64::try_from(offset)
            .map_err(|_| FuseError::InvalidArg(format!("offset {}", offset)))?;
        Ok(block_on(self.fs.read(FileHandle(fh), offset, size as usize))??)
    }

    pub fn do_write(&self, fh: u64, offset: i64, data: &[u8]) -> FuseResult<u32> {
        let offset = u64::try_from(offset)
            .map_err(|_| FuseError::InvalidArg(format!("offset {}", offset)))?;
        let written = block_on(self.fs.write(FileHandle(fh), offset, data))??;
        u32::try_from(written).map_err(|_| FuseError::InvalidArg(format!("wrote {}", written)))
    }

    /// Always succeeds; close failures are only logged by the adapter.
    pub fn do_release(&self, fh: u64) {
        if let Err(e) = block_on(self.fs.release(FileHandle(fh))) {
            debug!(fh, error = %e, "release not run");
        }
    }

    pub fn do_unlink(&self, parent: u64, name: &str) -> FuseResult<()> {
        let path = self.child_of(parent, name)?;
        block_on(self.fs.unlink(&path))??;
        self.inodes.remove_path(&path);
        Ok(())
    }

    pub fn do_mkdir(&self, parent: u64, name: &str, mode: u32) -> FuseResult<InodeAttr> {
        let path = self.child_of(parent, name)?;
        block_on(self.fs.mkdir(&path, mode))??;
        self.stat_path(&path)
    }

    pub fn do_rmdir(&self, parent: u64, name: &str) -> FuseResult<()> {
        let path = self.child_of(parent, name)?;
        block_on(self.fs.rmdir(&path))??;
        self.inodes.remove_path(&path);
        Ok(())
    }

    pub fn do_access(&self, ino: u64, mask: i32) -> FuseResult<()> {
        let path = self.path_of(ino)?;
        Ok(block_on(self.fs.access(&path, mask))??)
    }

    pub fn do_getxattr(&self, ino: u64, name: &str, size: u32) -> FuseResult<XattrReply> {
        let path = self.path_of(ino)?;
        Ok(block_on(self.fs.getxattr(&path, name, size as usize))??)
    }

    pub fn do_listxattr(&self, ino: u64, size: u32) -> FuseResult<XattrReply> {
        let path = self.path_of(ino)?;
        Ok(block_on(self.fs.listxattr(&path, size as usize))??)
    }

    pub fn do_removexattr(&self, ino: u64, name: &str) -> FuseResult<()> {
        let path = self.path_of(ino)?;
        Ok(block_on(self.fs.removexattr(&path, name))??)
    }
}

/// Convert an `InodeAttr` to the `fuser` attribute record.
#[cfg(unix)]
pub fn inode_attr_to_file_attr(attr: &InodeAttr) -> fuser::FileAttr {
    use fuser::{FileAttr, FileType};

    let kind = match attr.kind {
        InodeKind::File => FileType::RegularFile,
        InodeKind::Directory => FileType::Directory,
        InodeKind::Symlink => FileType::Symlink,
    };

    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind,
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}
