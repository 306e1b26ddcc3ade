//! `-o key[=value],...` mount option parsing.

use crate::types::MountConfig;
use crate::ConfigError;

impl MountConfig {
    /// Build a configuration from mount option lists, starting from defaults.
    ///
    /// Each item may itself be a comma-separated list, as passed to `-o`.
    pub fn from_mount_options<I, S>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = MountConfig::default();
        config.apply_mount_options(options)?;
        Ok(config)
    }

    /// Apply mount option lists on top of the current values.
    pub fn apply_mount_options<I, S>(&mut self, options: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for list in options {
            for option in list.as_ref().split(',') {
                let option = option.trim();
                if option.is_empty() {
                    continue;
                }
                self.apply_option(option)?;
            }
        }
        Ok(())
    }

    fn apply_option(&mut self, option: &str) -> Result<(), ConfigError> {
        let (key, value) = match option.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (option, None),
        };

        match (key, value) {
            ("castor_root", Some(v)) => self.root = v.to_string(),
            ("castor_uid", Some(v)) => self.uid = Some(parse_id(key, v)?),
            ("castor_gid", Some(v)) => self.gid = Some(parse_id(key, v)?),
            ("castor_user", Some(v)) => self.stage.user = Some(v.to_string()),
            ("castor_stage_host", Some(v)) => self.stage.host = Some(v.to_string()),
            ("castor_stage_svcclass", Some(v)) => self.stage.svcclass = Some(v.to_string()),
            ("castor_readonly", None) => self.read_only = true,
            ("debug", None) => self.debug = true,
            ("allow_other", None) => self.allow_other = true,
            (k, _) if k.starts_with("castor_") => {
                return Err(ConfigError::UnknownOption(option.to_string()));
            }
            _ => self.fuse_passthrough.push(option.to_string()),
        }
        Ok(())
    }
}

fn parse_id(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidOptionValue {
        option: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_castor_options() {
        let config = MountConfig::from_mount_options([
            "castor_root=/castor/cern.ch/user/a,castor_uid=1001,castor_gid=1002",
            "castor_user=alice,castor_stage_host=stager01,castor_stage_svcclass=default",
            "castor_readonly",
        ])
        .unwrap();

        assert_eq!(config.root, "/castor/cern.ch/user/a");
        assert_eq!(config.uid, Some(1001));
        assert_eq!(config.gid, Some(1002));
        assert_eq!(config.stage.user.as_deref(), Some("alice"));
        assert_eq!(config.stage.host.as_deref(), Some("stager01"));
        assert_eq!(config.stage.svcclass.as_deref(), Some("default"));
        assert!(config.read_only);
        assert!(config.fuse_passthrough.is_empty());
    }

    #[test]
    fn test_unrecognized_options_pass_through() {
        let config = MountConfig::from_mount_options(["ro,noatime,castor_readonly"]).unwrap();
        assert!(config.read_only);
        assert_eq!(config.fuse_passthrough, vec!["ro", "noatime"]);
    }

    #[test]
    fn test_unknown_castor_option_is_error() {
        let err = MountConfig::from_mount_options(["castor_bogus=1"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption(o) if o == "castor_bogus=1"));
    }

    #[test]
    fn test_castor_flag_with_value_is_error() {
        let err = MountConfig::from_mount_options(["castor_readonly=yes"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption(_)));
    }

    #[test]
    fn test_bad_uid() {
        let err = MountConfig::from_mount_options(["castor_uid=alice"]).unwrap_err();
        match err {
            ConfigError::InvalidOptionValue { option, value } => {
                assert_eq!(option, "castor_uid");
                assert_eq!(value, "alice");
            }
            other => panic!("Expected InvalidOptionValue, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_and_allow_other() {
        let config = MountConfig::from_mount_options(["debug,allow_other"]).unwrap();
        assert!(config.debug);
        assert!(config.allow_other);
    }

    #[test]
    fn test_empty_items_ignored() {
        let config = MountConfig::from_mount_options([",,", ""]).unwrap();
        assert_eq!(config, MountConfig::default());
    }

    #[test]
    fn test_later_options_override() {
        let mut config = MountConfig::from_mount_options(["castor_root=/a"]).unwrap();
        config.apply_mount_options(["castor_root=/b"]).unwrap();
        assert_eq!(config.root, "/b");
    }
}
