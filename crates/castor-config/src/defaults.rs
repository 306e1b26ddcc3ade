use crate::types::MountConfig;

impl MountConfig {
    /// Apply default inference rules to the configuration.
    /// This mutates the config in place.
    pub fn apply_defaults(&mut self) {
        // Stager user falls back to the login name of the invoking user
        if self.stage.user.is_none() {
            self.stage.user = std::env::var("USER").ok().filter(|u| !u.is_empty());
        }

        // A trailing slash would double up when relative paths are appended
        if self.root.len() > 1 {
            let trimmed = self.root.trim_end_matches('/');
            self.root = if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() };
        }
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> MountConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }
}
