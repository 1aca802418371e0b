//! Authentication configuration.

use std::path::{Path, PathBuf};

use nodekeeper_core::Config;
use nodekeeper_core::config::{AuthSettings, CredentialBackend, MIN_RSA_KEY_BITS, PathsConfig};

/// Everything the auth subsystem needs, resolved from the loaded [`Config`].
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Whether authentication is enforced.
    pub enabled: bool,

    /// Where the identity record lives.
    pub credential_backend: CredentialBackend,

    /// JSON identity record, used by the file backend.
    pub user_file: PathBuf,

    /// Sled directory, used by the sled backend.
    pub credential_db: PathBuf,

    /// PEM-encoded signing key.
    pub private_key_file: PathBuf,

    /// PEM-encoded verification key.
    pub public_key_file: PathBuf,

    /// Replace the keypair at start, invalidating every issued token.
    pub regenerate_keys_on_start: bool,

    /// RSA modulus size for new keys.
    pub rsa_key_bits: usize,

    /// Minimum password length.
    pub min_password_length: usize,

    /// Authorization scheme carrying session tokens.
    pub token_scheme: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::from_parts(&PathsConfig::default(), &AuthSettings::default())
    }
}

impl AuthConfig {
    /// Create a new auth config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Resolve from the application config.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::from_parts(&config.paths, &config.auth)
    }

    fn from_parts(paths: &PathsConfig, auth: &AuthSettings) -> Self {
        let credential_db = paths.credential_db.clone().unwrap_or_else(|| {
            paths
                .user_file
                .parent()
                .map_or_else(|| PathBuf::from("credentials"), |p| p.join("credentials"))
        });

        Self {
            enabled: auth.enabled,
            credential_backend: auth.credential_backend,
            user_file: paths.user_file.clone(),
            credential_db,
            private_key_file: paths.jwt_private_key_file.clone(),
            public_key_file: paths.jwt_public_key_file.clone(),
            regenerate_keys_on_start: auth.regenerate_keys_on_start,
            rsa_key_bits: auth.rsa_key_bits,
            min_password_length: auth.min_password_length,
            token_scheme: auth.token_scheme.clone(),
        }
    }
}

/// Builder for `AuthConfig`.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Place the identity record, keys, and credential db under `dir`.
    #[must_use]
    pub fn rooted_at(mut self, dir: &Path) -> Self {
        let paths = PathsConfig::rooted_at(dir);
        self.config.user_file = paths.user_file;
        self.config.private_key_file = paths.jwt_private_key_file;
        self.config.public_key_file = paths.jwt_public_key_file;
        self.config.credential_db = dir.join("db/credentials");
        self
    }

    /// Set whether auth is enabled.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the credential backend.
    #[must_use]
    pub fn credential_backend(mut self, backend: CredentialBackend) -> Self {
        self.config.credential_backend = backend;
        self
    }

    /// Set whether keys are regenerated at start.
    #[must_use]
    pub fn regenerate_keys_on_start(mut self, regenerate: bool) -> Self {
        self.config.regenerate_keys_on_start = regenerate;
        self
    }

    /// Set the RSA modulus size. Values below the minimum are raised to it.
    #[must_use]
    pub fn rsa_key_bits(mut self, bits: usize) -> Self {
        self.config.rsa_key_bits = bits.max(MIN_RSA_KEY_BITS);
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert!(config.enabled);
        assert_eq!(config.user_file, PathBuf::from("/db/user.json"));
        assert_eq!(config.credential_db, PathBuf::from("/db/credentials"));
        assert_eq!(config.rsa_key_bits, 2048);
        assert_eq!(config.token_scheme, "JWT");
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.paths.credential_db = Some(PathBuf::from("/var/lib/nk"));
        config.auth.credential_backend = CredentialBackend::Sled;

        let auth = AuthConfig::from_config(&config);
        assert_eq!(auth.credential_backend, CredentialBackend::Sled);
        assert_eq!(auth.credential_db, PathBuf::from("/var/lib/nk"));
    }

    #[test]
    fn test_builder() {
        let config = AuthConfig::builder()
            .rooted_at(Path::new("/tmp/nk"))
            .enabled(false)
            .rsa_key_bits(1024)
            .build();

        assert!(!config.enabled);
        assert_eq!(config.rsa_key_bits, 2048);
        assert_eq!(
            config.private_key_file,
            PathBuf::from("/tmp/nk/db/jwt-private-key/jwt.key")
        );
    }
}
