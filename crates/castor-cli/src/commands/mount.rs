//! Mount command for the castorfs FUSE filesystem.

use std::path::PathBuf;
use std::sync::Arc;

use castor_config::MountConfig;
use castor_core::CastorFs;
use tracing::{debug, info};

use super::account;

/// Mount arguments.
pub struct MountArgs {
    /// Mount point path.
    pub mountpoint: PathBuf,
}

/// Run the mount command. Blocks until the filesystem is unmounted.
pub fn run(config: MountConfig, args: MountArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.mountpoint.exists() {
        std::fs::create_dir_all(&args.mountpoint)?;
    }

    // The backend client reads its stager settings from the environment.
    for (key, value) in config.stage_environment() {
        debug!(key, value = %value, "exporting");
        std::env::set_var(key, value);
    }

    account::drop_privileges(config.effective_uid(), config.effective_gid())?;

    info!(
        root = %config.root,
        read_only = config.read_only,
        backend = ?config.backend,
        "starting castorfs"
    );
    let fs = CastorFs::from_config(Arc::new(config))?;
    castor_fuse::mount(fs, &args.mountpoint)?;

    Ok(())
}
