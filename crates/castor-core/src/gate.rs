//! Read-only policy for mutating operations.

use castor_config::MountConfig;
use tracing::debug;

use crate::error::{FsError, FsResult};

/// Operations that change backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Write,
    Unlink,
    Mkdir,
    Truncate,
    Chown,
}

/// Rejects mutations on read-only mounts before any backend call.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlyGate {
    read_only: bool,
}

impl ReadOnlyGate {
    pub fn new(config: &MountConfig) -> Self {
        ReadOnlyGate {
            read_only: config.read_only,
        }
    }

    pub fn guard(&self, op: Mutation) -> FsResult<()> {
        if self.read_only {
            debug!(?op, "denied on read-only mount");
            return Err(FsError::AccessDenied);
        }
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Mutation; 6] = [
        Mutation::Create,
        Mutation::Write,
        Mutation::Unlink,
        Mutation::Mkdir,
        Mutation::Truncate,
        Mutation::Chown,
    ];

    #[test]
    fn test_read_write_mount_allows_everything() {
        let gate = ReadOnlyGate::new(&MountConfig::default());
        for op in ALL {
            assert!(gate.guard(op).is_ok(), "{:?} should be allowed", op);
        }
    }

    #[test]
    fn test_read_only_mount_denies_everything() {
        let config = MountConfig {
            read_only: true,
            ..Default::default()
        };
        let gate = ReadOnlyGate::new(&config);
        assert!(gate.is_read_only());
        for op in ALL {
            assert!(matches!(gate.guard(op), Err(FsError::AccessDenied)));
        }
    }
}
