use regex::Regex;
use std::env;

use crate::types::MountConfig;
use crate::ConfigError;

/// Always exported: the adapter only speaks to the v2 stager.
pub const RFIO_USE_CASTOR_V2: &str = "RFIO_USE_CASTOR_V2";
pub const STAGE_USER: &str = "STAGE_USER";
pub const STAGE_HOST: &str = "STAGE_HOST";
pub const STAGE_SVCCLASS: &str = "STAGE_SVCCLASS";

/// Interpolate environment variables in a string.
/// Replaces `${VAR_NAME}` with the value of the environment variable.
pub fn interpolate_env(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

    let mut result = input.to_string();
    let mut missing = Vec::new();

    let names: Vec<(String, String)> = re
        .captures_iter(input)
        .filter_map(|cap| Some((cap.get(0)?.as_str().to_string(), cap.get(1)?.as_str().to_string())))
        .collect();

    for (full_match, var_name) in names {
        match env::var(&var_name) {
            Ok(value) => result = result.replace(&full_match, &value),
            Err(_) => {
                if !missing.contains(&var_name) {
                    missing.push(var_name);
                }
            }
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::MissingEnvVars(missing));
    }

    Ok(result)
}

impl MountConfig {
    /// Environment the backend client expects, in export order.
    pub fn stage_environment(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![(RFIO_USE_CASTOR_V2, "YES".to_string())];
        if let Some(user) = &self.stage.user {
            vars.push((STAGE_USER, user.clone()));
        }
        if let Some(host) = &self.stage.host {
            vars.push((STAGE_HOST, host.clone()));
        }
        if let Some(svcclass) = &self.stage.svcclass {
            vars.push((STAGE_SVCCLASS, svcclass.clone()));
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageIdentity;

    #[test]
    fn test_interpolate_env() {
        env::set_var("CASTORFS_TEST_HOST", "stager01");
        env::set_var("CASTORFS_TEST_CLASS", "default");

        let input = "host: ${CASTORFS_TEST_HOST}, class: ${CASTORFS_TEST_CLASS}";
        let result = interpolate_env(input).unwrap();
        assert_eq!(result, "host: stager01, class: default");
    }

    #[test]
    fn test_interpolate_env_missing() {
        let input = "root: ${CASTORFS_MISSING_12345}";
        match interpolate_env(input) {
            Err(ConfigError::MissingEnvVars(vars)) => {
                assert_eq!(vars, vec!["CASTORFS_MISSING_12345"]);
            }
            other => panic!("Expected MissingEnvVars error, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolate_env_missing_reported_once() {
        let input = "${CASTORFS_MISSING_A} ${CASTORFS_MISSING_A} ${CASTORFS_MISSING_B}";
        match interpolate_env(input) {
            Err(ConfigError::MissingEnvVars(vars)) => {
                assert_eq!(vars, vec!["CASTORFS_MISSING_A", "CASTORFS_MISSING_B"]);
            }
            other => panic!("Expected MissingEnvVars error, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolate_env_no_vars() {
        assert_eq!(interpolate_env("root: /castor").unwrap(), "root: /castor");
    }

    #[test]
    fn test_interpolate_env_partial_syntax_not_matched() {
        let input = "not a $VAR or ${VAR variable";
        assert_eq!(interpolate_env(input).unwrap(), input);
    }

    #[test]
    fn test_stage_environment_minimal() {
        let config = MountConfig::default();
        assert_eq!(
            config.stage_environment(),
            vec![(RFIO_USE_CASTOR_V2, "YES".to_string())]
        );
    }

    #[test]
    fn test_stage_environment_full() {
        let config = MountConfig {
            stage: StageIdentity {
                user: Some("alice".to_string()),
                host: Some("stager01".to_string()),
                svcclass: Some("t0perm".to_string()),
            },
            ..Default::default()
        };

        assert_eq!(
            config.stage_environment(),
            vec![
                (RFIO_USE_CASTOR_V2, "YES".to_string()),
                (STAGE_USER, "alice".to_string()),
                (STAGE_HOST, "stager01".to_string()),
                (STAGE_SVCCLASS, "t0perm".to_string()),
            ]
        );
    }
}
