//! Unix FUSE implementation using the `fuser` crate.

use std::ffi::OsStr;
use std::time::SystemTime;

use castor_core::XattrReply;
use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use tracing::{debug, error};

use crate::common::{inode_attr_to_file_attr, CastorFuse};
use crate::inode::{InodeAttr, InodeKind};

/// `fuser::Filesystem` wrapper around [`CastorFuse`].
pub struct UnixFuse(pub CastorFuse);

fn file_type(kind: InodeKind) -> FileType {
    match kind {
        InodeKind::File => FileType::RegularFile,
        InodeKind::Directory => FileType::Directory,
        InodeKind::Symlink => FileType::Symlink,
    }
}

fn reply_xattr(result: XattrReply, reply: ReplyXattr) {
    match result {
        XattrReply::Size(size) => reply.size(size as u32),
        XattrReply::Data(data) => reply.data(&data),
    }
}

impl Filesystem for UnixFuse {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        debug!("lookup: parent={}, name={}", parent, name);

        match self.0.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&InodeAttr::ttl(), &inode_attr_to_file_attr(&attr), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!("getattr: ino={}", ino);

        match self.0.do_getattr(ino) {
            Ok(attr) => reply.attr(&InodeAttr::ttl(), &inode_attr_to_file_attr(&attr)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr: ino={}, size={:?}", ino, size);

        let times = atime.is_some() || mtime.is_some();
        match self.0.do_setattr(ino, uid, gid, size, times) {
            Ok(attr) => reply.attr(&InodeAttr::ttl(), &inode_attr_to_file_attr(&attr)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino={}, offset={}", ino, offset);

        let result = self.0.do_readdir(ino, offset, |entry_ino, next, kind, name| {
            reply.add(entry_ino, next, file_type(kind), name)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!("readdir failed: {}", e);
                reply.error(e.to_errno());
            }
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open: ino={}, flags={:#o}", ino, flags);

        match self.0.do_open(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        debug!("create: parent={}, name={}", parent, name);

        match self.0.do_create(parent, name, mode & !umask) {
            Ok((attr, fh)) => {
                reply.created(&InodeAttr::ttl(), &inode_attr_to_file_attr(&attr), 0, fh, 0)
            }
            Err(e) => {
                error!("create failed: {}", e);
                reply.error(e.to_errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino={}, offset={}, size={}", ino, offset, size);

        match self.0.do_read(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                error!("read failed: {}", e);
                reply.error(e.to_errno());
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write: ino={}, offset={}, size={}", ino, offset, data.len());

        match self.0.do_write(fh, offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => {
                error!("write failed: {}", e);
                reply.error(e.to_errno());
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release: ino={}, fh={}", ino, fh);
        self.0.do_release(fh);
        reply.ok();
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        debug!("unlink: parent={}, name={}", parent, name);

        match self.0.do_unlink(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        debug!("mkdir: parent={}, name={}", parent, name);

        match self.0.do_mkdir(parent, name, mode & !umask) {
            Ok(attr) => reply.entry(&InodeAttr::ttl(), &inode_attr_to_file_attr(&attr), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        debug!("rmdir: parent={}, name={}", parent, name);

        match self.0.do_rmdir(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        match self.0.do_access(ino, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        debug!("getxattr: ino={}, name={}, size={}", ino, name, size);

        match self.0.do_getxattr(ino, name, size) {
            Ok(result) => reply_xattr(result, reply),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        debug!("listxattr: ino={}, size={}", ino, size);

        match self.0.do_listxattr(ino, size) {
            Ok(result) => reply_xattr(result, reply),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };

        match self.0.do_removexattr(ino, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(
            1_000_000, 500_000, 500_000, 1_000_000, 500_000, 4096, 255, 4096,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castor_core::{FileStat, MigrationStatus, S_IFDIR, S_IFLNK, S_IFREG};
    use chrono::Utc;

    fn attr(mode: u32, size: u64) -> InodeAttr {
        let now = Utc::now();
        let stat = FileStat {
            mode,
            size,
            uid: 1,
            gid: 2,
            nlink: 1,
            atime: now,
            mtime: now,
            ctime: now,
            status: MigrationStatus::Online,
        };
        InodeAttr::from_stat(42, &stat)
    }

    #[test]
    fn test_file_attr_conversion() {
        let file_attr = inode_attr_to_file_attr(&attr(S_IFREG | 0o644, 1024));
        assert_eq!(file_attr.ino, 42);
        assert_eq!(file_attr.size, 1024);
        assert_eq!(file_attr.blocks, 2);
        assert_eq!(file_attr.perm, 0o644);
        assert_eq!((file_attr.uid, file_attr.gid), (1, 2));
        assert_eq!(file_attr.kind, FileType::RegularFile);
        assert_eq!(file_attr.blksize, 4096);
    }

    #[test]
    fn test_file_attr_kind_mapping() {
        assert_eq!(inode_attr_to_file_attr(&attr(S_IFDIR | 0o755, 0)).kind, FileType::Directory);
        assert_eq!(inode_attr_to_file_attr(&attr(S_IFLNK | 0o777, 5)).kind, FileType::Symlink);
        assert_eq!(file_type(InodeKind::File), FileType::RegularFile);
    }
}
