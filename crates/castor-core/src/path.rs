//! Mount-relative path to absolute namespace path.

use castor_config::{MountConfig, MAX_PATH_LEN};

use crate::error::{FsError, FsResult};

/// Joins the configured namespace root with caller paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: String,
    max_len: usize,
}

impl PathResolver {
    pub fn new(config: &MountConfig) -> Self {
        Self::with_limit(&config.root, MAX_PATH_LEN)
    }

    /// Resolver with an explicit length bound.
    pub fn with_limit(root: &str, max_len: usize) -> Self {
        PathResolver {
            root: root.trim_end_matches('/').to_string(),
            max_len,
        }
    }

    /// Absolute namespace path for `relative`.
    ///
    /// Fails with [`FsError::PathTooLong`] instead of truncating.
    pub fn resolve(&self, relative: &str) -> FsResult<String> {
        let mut path = String::with_capacity(self.root.len() + relative.len() + 1);
        path.push_str(&self.root);

        let tail = relative.trim_start_matches('/');
        if !tail.is_empty() || path.is_empty() {
            path.push('/');
        }
        path.push_str(tail);

        if path.len() > self.max_len {
            return Err(FsError::PathTooLong {
                len: path.len(),
                max: self.max_len,
            });
        }
        Ok(path)
    }

    pub fn root(&self) -> &str {
        if self.root.is_empty() {
            "/"
        } else {
            &self.root
        }
    }
}
