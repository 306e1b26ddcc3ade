//! Switching to the configured account before serving.

use std::io;

use tracing::info;

/// Switch group then user. `None` keeps the current id.
///
/// The group goes first since changing it needs the privileges the user
/// switch gives up.
pub fn drop_privileges(uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    if let Some(gid) = gid {
        // SAFETY: setgid has no memory-safety preconditions.
        if unsafe { libc::setgid(gid) } != 0 {
            return Err(io::Error::last_os_error());
        }
        info!(gid, "switched group");
    }

    if let Some(uid) = uid {
        // SAFETY: setuid has no memory-safety preconditions.
        if unsafe { libc::setuid(uid) } != 0 {
            return Err(io::Error::last_os_error());
        }
        info!(uid, "switched user");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_to_switch() {
        drop_privileges(None, None).unwrap();
    }
}
