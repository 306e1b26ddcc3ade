use serde::{Deserialize, Serialize};

/// Default namespace root on the name server.
pub const DEFAULT_ROOT: &str = "/castor";

/// Longest absolute namespace path the adapter will hand to the backend.
pub const MAX_PATH_LEN: usize = 1023;

/// Mount configuration.
///
/// Built once from the command line and/or a config file before the
/// filesystem is attached, then shared read-only (usually as
/// `Arc<MountConfig>`) with every component of the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Namespace root that every relative path is appended to.
    pub root: String,
    /// Fixed uid to switch to before serving. `None` or `0` keeps the current uid.
    pub uid: Option<u32>,
    /// Fixed gid to switch to before serving. `None` or `0` keeps the current gid.
    pub gid: Option<u32>,
    /// Reject every mutating operation with `EACCES`.
    pub read_only: bool,
    /// Verbose per-operation logging.
    pub debug: bool,
    /// Let other users access the mount (also enables auto-unmount).
    pub allow_other: bool,
    /// Stager identity exported to the backend client.
    pub stage: StageIdentity,
    /// Which backend client serves the namespace.
    pub backend: BackendConfig,
    /// Options handed to the kernel mount untouched.
    #[serde(skip)]
    pub fuse_passthrough: Vec<String>,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            root: DEFAULT_ROOT.to_string(),
            uid: None,
            gid: None,
            read_only: false,
            debug: false,
            allow_other: false,
            stage: StageIdentity::default(),
            backend: BackendConfig::default(),
            fuse_passthrough: Vec::new(),
        }
    }
}

/// Stager identity used by the remote I/O service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageIdentity {
    pub user: Option<String>,
    pub host: Option<String>,
    pub svcclass: Option<String>,
}

/// Backend client selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process catalogue, empty at startup.
    #[default]
    Memory,
    /// Local directory standing in for the name server.
    Fs(FsBackendConfig),
}

/// Local directory backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsBackendConfig {
    /// Directory that holds the namespace tree.
    pub dir: String,
}

impl MountConfig {
    /// The uid to switch to, if any. Zero means "stay as is".
    pub fn effective_uid(&self) -> Option<u32> {
        self.uid.filter(|&uid| uid != 0)
    }

    /// The gid to switch to, if any. Zero means "stay as is".
    pub fn effective_gid(&self) -> Option<u32> {
        self.gid.filter(|&gid| gid != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MountConfig::default();
        assert_eq!(config.root, "/castor");
        assert!(!config.read_only);
        assert!(!config.debug);
        assert_eq!(config.backend, BackendConfig::Memory);
        assert!(config.fuse_passthrough.is_empty());
    }

    #[test]
    fn test_zero_ids_mean_no_switch() {
        let config = MountConfig {
            uid: Some(0),
            gid: Some(0),
            ..Default::default()
        };
        assert_eq!(config.effective_uid(), None);
        assert_eq!(config.effective_gid(), None);

        let config = MountConfig {
            uid: Some(1001),
            gid: Some(100),
            ..Default::default()
        };
        assert_eq!(config.effective_uid(), Some(1001));
        assert_eq!(config.effective_gid(), Some(100));
    }

    #[test]
    fn test_backend_config_yaml_tag() {
        let backend: BackendConfig = serde_yaml::from_str("type: fs\ndir: /srv/ns\n").unwrap();
        assert_eq!(
            backend,
            BackendConfig::Fs(FsBackendConfig {
                dir: "/srv/ns".to_string()
            })
        );

        let backend: BackendConfig = serde_yaml::from_str("type: memory\n").unwrap();
        assert_eq!(backend, BackendConfig::Memory);
    }
}
