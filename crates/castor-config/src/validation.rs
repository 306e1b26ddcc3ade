use crate::types::{BackendConfig, MountConfig, MAX_PATH_LEN};
use crate::ConfigError;

impl MountConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if !self.root.starts_with('/') {
            errors.push(ConfigError::InvalidRoot(
                self.root.clone(),
                "root must be an absolute namespace path".to_string(),
            ));
        }

        if self.root.split('/').any(|component| component == "..") {
            errors.push(ConfigError::InvalidRoot(
                self.root.clone(),
                "root must not contain '..'".to_string(),
            ));
        }

        if self.root.len() > MAX_PATH_LEN {
            errors.push(ConfigError::InvalidRoot(
                self.root.clone(),
                format!("root is longer than {} bytes", MAX_PATH_LEN),
            ));
        }

        let stage_fields = [
            ("castor_user", &self.stage.user),
            ("castor_stage_host", &self.stage.host),
            ("castor_stage_svcclass", &self.stage.svcclass),
        ];
        for (name, value) in stage_fields {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                errors.push(ConfigError::InvalidConfig(format!("{} must not be empty", name)));
            }
        }

        if let BackendConfig::Fs(fs) = &self.backend {
            if fs.dir.is_empty() {
                errors.push(ConfigError::InvalidConfig(
                    "fs backend requires a non-empty 'dir'".to_string(),
                ));
            }
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FsBackendConfig, StageIdentity};

    #[test]
    fn test_default_is_valid() {
        assert!(MountConfig::default().validate().is_empty());
    }

    #[test]
    fn test_relative_root() {
        let config = MountConfig {
            root: "castor".to_string(),
            ..Default::default()
        };
        let errors = config.validate();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidRoot(root, _) if root == "castor")));
    }

    #[test]
    fn test_parent_dir_in_root() {
        let config = MountConfig {
            root: "/castor/../etc".to_string(),
            ..Default::default()
        };
        assert!(config.validate_or_err().is_err());
    }

    #[test]
    fn test_root_too_long() {
        let config = MountConfig {
            root: format!("/{}", "a".repeat(MAX_PATH_LEN)),
            ..Default::default()
        };
        assert!(config
            .validate()
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidRoot(_, _))));
    }

    #[test]
    fn test_empty_stage_fields() {
        let config = MountConfig {
            stage: StageIdentity {
                user: Some(String::new()),
                host: Some("  ".to_string()),
                svcclass: None,
            },
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 2);
    }

    #[test]
    fn test_fs_backend_needs_dir() {
        let config = MountConfig {
            backend: BackendConfig::Fs(FsBackendConfig { dir: String::new() }),
            ..Default::default()
        };
        assert!(config
            .validate()
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_reports_every_error() {
        let config = MountConfig {
            root: "relative/../x".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 2);
    }
}
