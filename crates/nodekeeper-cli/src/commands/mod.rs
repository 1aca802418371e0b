//! CLI command implementations.

pub mod account;
pub mod config;
pub mod keys;
pub mod serve;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};
use nodekeeper_core::Config;

pub use account::run_account;
pub use config::run_config;
pub use keys::run_keys;
pub use serve::run_serve;
pub use status::run_status;

/// Load the config file at `path`, or the default location.
///
/// Environment overrides apply either way.
///
/// # Errors
///
/// Returns error if the file cannot be read, parsed, or fails validation.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
                .with_env_overrides();
            config.validate()?;
            Ok(config)
        }
        None => Config::load_default().context("Failed to load config"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodekeeper.json");
        std::fs::write(&path, "{ gateway: { port: 4100 } }").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.gateway.port, 4100);
    }

    #[test]
    fn test_load_missing_path() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.json"))).is_err());
    }
}
