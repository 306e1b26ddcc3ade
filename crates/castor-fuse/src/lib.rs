//! Kernel binding for castorfs.
//!
//! Serves a [`CastorFs`] adapter through FUSE. Callbacks arrive on the
//! `fuser` session thread, are mapped from inodes to mount-relative paths
//! and run on a shared tokio runtime.

mod async_bridge;
mod common;
mod inode;
#[cfg(unix)]
mod unix_fuse;

use std::path::Path;
#[cfg(unix)]
use std::sync::Arc;

pub use async_bridge::{block_on, init_runtime, FuseError, FuseResult};
use castor_config::MountConfig;
use castor_core::CastorFs;
pub use common::CastorFuse;
pub use inode::{InodeAttr, InodeKind, InodeTable, ROOT_INO};
#[cfg(unix)]
use tracing::info;

/// Kernel mount options for a configuration.
#[cfg(unix)]
pub fn mount_options(config: &MountConfig) -> Vec<fuser::MountOption> {
    use fuser::MountOption;

    let mut options = vec![MountOption::FSName("castorfs".to_string())];
    options.push(if config.read_only {
        MountOption::RO
    } else {
        MountOption::RW
    });
    if config.allow_other {
        options.push(MountOption::AllowOther);
        options.push(MountOption::AutoUnmount);
    }
    options.extend(
        config
            .fuse_passthrough
            .iter()
            .map(|opt| MountOption::CUSTOM(opt.clone())),
    );
    options
}

/// Mount the adapter and serve requests until the filesystem is unmounted.
#[cfg(unix)]
pub fn mount(fs: CastorFs, mountpoint: &Path) -> FuseResult<()> {
    init_runtime()?;
    let options = mount_options(fs.config());

    info!("Mounting castorfs at {:?} (root {})", mountpoint, fs.config().root);
    let core = CastorFuse::new(Arc::new(fs));
    fuser::mount2(unix_fuse::UnixFuse(core), mountpoint, &options)?;
    info!("castorfs unmounted");

    Ok(())
}

#[cfg(not(unix))]
pub fn mount(_fs: CastorFs, _mountpoint: &Path) -> FuseResult<()> {
    Err(FuseError::Runtime(
        "FUSE mounting is only supported on Unix".to_string(),
    ))
}
