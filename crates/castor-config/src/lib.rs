mod defaults;
mod env;
mod options;
pub mod types;
mod validation;

use std::path::Path;

pub use env::{interpolate_env, RFIO_USE_CASTOR_V2, STAGE_HOST, STAGE_SVCCLASS, STAGE_USER};
pub use types::*;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing environment variables: {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("Unknown mount option: {0}")]
    UnknownOption(String),

    #[error("Invalid value '{value}' for mount option '{option}'")]
    InvalidOptionValue { option: String, value: String },

    #[error("Invalid namespace root '{0}': {1}")]
    InvalidRoot(String, String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MountConfig {
    /// Parse a mount configuration from a YAML string.
    /// Environment variables in the format `${VAR_NAME}` will be interpolated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = env::interpolate_env(yaml)?;
        let config: MountConfig = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load a mount configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = MountConfig::from_yaml("read_only: true\n").unwrap();
        assert!(config.read_only);
        assert_eq!(config.root, DEFAULT_ROOT);
        assert_eq!(config.backend, BackendConfig::Memory);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
root: /castor/cern.ch/user/a/alice
uid: 1001
gid: 1002
read_only: false
debug: true
stage:
  user: alice
  host: stager01
  svcclass: default
backend:
  type: fs
  dir: /srv/namespace
"#;

        let config = MountConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.root, "/castor/cern.ch/user/a/alice");
        assert_eq!(config.uid, Some(1001));
        assert_eq!(config.gid, Some(1002));
        assert!(config.debug);
        assert_eq!(config.stage.host.as_deref(), Some("stager01"));
        match &config.backend {
            BackendConfig::Fs(fs) => assert_eq!(fs.dir, "/srv/namespace"),
            other => panic!("Expected Fs backend, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_with_env_vars() {
        std::env::set_var("CASTORFS_TEST_SVCCLASS", "t1transfer");

        let yaml = r#"
stage:
  svcclass: ${CASTORFS_TEST_SVCCLASS}
"#;

        let config = MountConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.stage.svcclass.as_deref(), Some("t1transfer"));
    }

    #[test]
    fn test_options_override_file() {
        let mut config = MountConfig::from_yaml("root: /castor/a\n").unwrap();
        config.apply_mount_options(["castor_root=/castor/b"]).unwrap();
        assert_eq!(config.root, "/castor/b");
    }

    #[test]
    fn test_invalid_yaml() {
        let err = MountConfig::from_yaml("uid: [not, a, number]\n").unwrap_err();
        assert!(matches!(err, ConfigError::YamlError(_)));
    }
}
