//! Configuration loading and validation.
//!
//! Config is JSON5 at `~/.nodekeeper/nodekeeper.json`. Every field has a
//! default, and the deployment environment variables used on the appliance
//! (`USER_FILE`, `SIGNAL_DIR`, ...) override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Smallest RSA modulus accepted for token signing keys.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP gateway configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Locations of the state files shared with the supervisor.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthSettings,

    /// Node services advertised to wallets.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields defaults. Environment overrides are applied
    /// in both cases.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let config = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("nodekeeper.json")
    }

    /// Get the `NodeKeeper` state directory.
    ///
    /// Uses `NODEKEEPER_STATE_DIR` env var if set, otherwise `~/.nodekeeper`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("NODEKEEPER_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".nodekeeper")
        } else {
            PathBuf::from(".nodekeeper")
        }
    }

    /// Apply deployment environment variables on top of the loaded values.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        let path_vars: [(&str, &mut PathBuf); 8] = [
            ("USER_FILE", &mut self.paths.user_file),
            ("JWT_PUBLIC_KEY_FILE", &mut self.paths.jwt_public_key_file),
            ("JWT_PRIVATE_KEY_FILE", &mut self.paths.jwt_private_key_file),
            ("SIGNAL_DIR", &mut self.paths.signal_dir),
            ("STATUS_DIR", &mut self.paths.status_dir),
            ("VERSION_FILE", &mut self.paths.version_file),
            ("TOR_HIDDEN_SERVICE_DIR", &mut self.paths.tor_hidden_service_dir),
            ("APPS_DIR", &mut self.paths.apps_dir),
        ];
        for (var, slot) in path_vars {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *slot = PathBuf::from(value);
                }
            }
        }

        if let Some(port) = env_parse("PORT") {
            self.gateway.port = port;
        }

        let ports: [(&str, &mut u16); 3] = [
            ("ELECTRUM_PORT", &mut self.services.electrum_port),
            ("BITCOIN_P2P_PORT", &mut self.services.bitcoin_p2p_port),
            ("BITCOIN_RPC_PORT", &mut self.services.bitcoin_rpc_port),
        ];
        for (var, slot) in ports {
            if let Some(port) = env_parse(var) {
                *slot = port;
            }
        }
        if let Ok(user) = std::env::var("BITCOIN_RPC_USER") {
            self.services.bitcoin_rpc_user = user;
        }
        if let Ok(password) = std::env::var("BITCOIN_RPC_PASSWORD") {
            self.services.bitcoin_rpc_password = password;
        }

        if env_flag("NODEKEEPER_REGENERATE_KEYS") {
            self.auth.regenerate_keys_on_start = true;
        }

        if env_flag("NODEKEEPER_AUTH_DISABLED") {
            self.auth.enabled = false;
        }

        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::Validation(
                "Gateway port cannot be 0".to_string(),
            ));
        }

        if self.auth.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(ConfigError::Validation(format!(
                "RSA key size must be at least {MIN_RSA_KEY_BITS} bits (got {})",
                self.auth.rsa_key_bits
            )));
        }

        if self.auth.min_password_length == 0 {
            return Err(ConfigError::Validation(
                "Minimum password length cannot be 0".to_string(),
            ));
        }

        if self.auth.token_scheme.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Token scheme cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Socket address string the gateway binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        match &self.gateway.mode {
            BindMode::Local => "127.0.0.1".to_string(),
            BindMode::Public => "0.0.0.0".to_string(),
            BindMode::Custom(addr) => addr.clone(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address mode.
    #[serde(default)]
    pub mode: BindMode,

    /// Enable CORS.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Allowed login/register attempts per client per minute.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            mode: BindMode::default(),
            cors: true,
            timeout_secs: default_timeout(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

const fn default_port() -> u16 {
    3006
}

const fn default_timeout() -> u64 {
    30
}

const fn default_rate_limit() -> u32 {
    30
}

const fn default_true() -> bool {
    true
}

/// Gateway bind mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to localhost only.
    #[default]
    Local,
    /// Bind to all interfaces.
    Public,
    /// Custom bind address.
    Custom(String),
}

/// State file locations.
///
/// Defaults follow the appliance image layout, where `/db` holds
/// credentials and `/signals` is watched by the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathsConfig {
    /// The identity record.
    pub user_file: PathBuf,
    /// PEM-encoded token verification key.
    pub jwt_public_key_file: PathBuf,
    /// PEM-encoded token signing key.
    pub jwt_private_key_file: PathBuf,
    /// Directory the supervisor watches for signal files.
    pub signal_dir: PathBuf,
    /// Directory the supervisor writes status files to.
    pub status_dir: PathBuf,
    /// Installed release info.
    pub version_file: PathBuf,
    /// Tor hidden service root.
    pub tor_hidden_service_dir: PathBuf,
    /// App definitions, including `registry.json`.
    pub apps_dir: PathBuf,
    /// Sled database directory, used when the sled credential backend is selected.
    pub credential_db: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            user_file: PathBuf::from("/db/user.json"),
            jwt_public_key_file: PathBuf::from("/db/jwt-public-key/jwt.pem"),
            jwt_private_key_file: PathBuf::from("/db/jwt-private-key/jwt.key"),
            signal_dir: PathBuf::from("/signals"),
            status_dir: PathBuf::from("/statuses"),
            version_file: PathBuf::from("/info.json"),
            tor_hidden_service_dir: PathBuf::from("/var/lib/tor"),
            apps_dir: PathBuf::from("/apps"),
            credential_db: None,
        }
    }
}

impl PathsConfig {
    /// Root all default locations under `dir`. Used for development and tests.
    #[must_use]
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            user_file: dir.join("db/user.json"),
            jwt_public_key_file: dir.join("db/jwt-public-key/jwt.pem"),
            jwt_private_key_file: dir.join("db/jwt-private-key/jwt.key"),
            signal_dir: dir.join("signals"),
            status_dir: dir.join("statuses"),
            version_file: dir.join("info.json"),
            tor_hidden_service_dir: dir.join("tor"),
            apps_dir: dir.join("apps"),
            credential_db: None,
        }
    }

    /// Hostname file of a named hidden service.
    #[must_use]
    pub fn hidden_service_file(&self, service: &str) -> PathBuf {
        self.tor_hidden_service_dir.join(service).join("hostname")
    }

    /// The list of apps available for install.
    #[must_use]
    pub fn app_registry_file(&self) -> PathBuf {
        self.apps_dir.join("registry.json")
    }
}

/// Ports and RPC credentials of the node services reachable over Tor.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicesConfig {
    /// Electrum server port.
    pub electrum_port: u16,
    /// Bitcoin peer-to-peer port.
    pub bitcoin_p2p_port: u16,
    /// Bitcoin RPC port.
    pub bitcoin_rpc_port: u16,
    /// Bitcoin RPC user name.
    pub bitcoin_rpc_user: String,
    /// Bitcoin RPC password. Never written back out.
    #[serde(skip_serializing)]
    pub bitcoin_rpc_password: String,
}

impl std::fmt::Debug for ServicesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicesConfig")
            .field("electrum_port", &self.electrum_port)
            .field("bitcoin_p2p_port", &self.bitcoin_p2p_port)
            .field("bitcoin_rpc_port", &self.bitcoin_rpc_port)
            .field("bitcoin_rpc_user", &self.bitcoin_rpc_user)
            .finish_non_exhaustive()
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            electrum_port: 50001,
            bitcoin_p2p_port: 8333,
            bitcoin_rpc_port: 8332,
            bitcoin_rpc_user: "nodekeeper".to_string(),
            bitcoin_rpc_password: String::new(),
        }
    }
}

/// Credential persistence backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// JSON user file shared with the supervisor.
    #[default]
    File,
    /// Embedded sled database.
    Sled,
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Whether authentication is enforced.
    pub enabled: bool,
    /// Where the identity record lives.
    pub credential_backend: CredentialBackend,
    /// Generate a fresh signing keypair at every start, dropping all sessions.
    pub regenerate_keys_on_start: bool,
    /// RSA modulus size for newly generated keys.
    pub rsa_key_bits: usize,
    /// Minimum accepted password length at registration and password change.
    pub min_password_length: usize,
    /// Authorization scheme that carries session tokens.
    pub token_scheme: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            credential_backend: CredentialBackend::default(),
            regenerate_keys_on_start: false,
            rsa_key_bits: MIN_RSA_KEY_BITS,
            min_password_length: 12,
            token_scheme: "JWT".to_string(),
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 3006);
        assert_eq!(config.paths.user_file, PathBuf::from("/db/user.json"));
        assert_eq!(config.auth.token_scheme, "JWT");
        assert!(!config.auth.regenerate_keys_on_start);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");

        let mut config = Config::default();
        config.auth.credential_backend = CredentialBackend::Sled;
        config.gateway.rate_limit_per_minute = 5;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.auth.credential_backend, CredentialBackend::Sled);
        assert_eq!(loaded.gateway.rate_limit_per_minute, 5);
    }

    #[test]
    fn test_json5_parsing() {
        let json5_content = r#"{
            // appliance overrides
            gateway: {
                port: 8080,
                mode: "public",
            },
            paths: {
                signalDir: "/tmp/signals",
            },
            auth: {
                regenerateKeysOnStart: true,
            },
        }"#;

        let config: Config = json5::from_str(json5_content).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.bind_address(), "0.0.0.0");
        assert_eq!(config.paths.signal_dir, PathBuf::from("/tmp/signals"));
        assert_eq!(config.paths.user_file, PathBuf::from("/db/user.json"));
        assert!(config.auth.regenerate_keys_on_start);
        assert_eq!(config.auth.min_password_length, 12);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.gateway.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.rsa_key_bits = 512;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.min_password_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rooted_paths() {
        let paths = PathsConfig::rooted_at(Path::new("/srv/node"));
        assert_eq!(paths.user_file, PathBuf::from("/srv/node/db/user.json"));
        assert_eq!(
            paths.hidden_service_file("web"),
            PathBuf::from("/srv/node/tor/web/hostname")
        );
        assert_eq!(
            paths.app_registry_file(),
            PathBuf::from("/srv/node/apps/registry.json")
        );
    }

    #[test]
    fn test_services_config() {
        let config: Config = json5::from_str(
            r#"{ services: { electrumPort: 50002, bitcoinRpcPassword: "hunter2" } }"#,
        )
        .unwrap();
        assert_eq!(config.services.electrum_port, 50002);
        assert_eq!(config.services.bitcoin_p2p_port, 8333);
        assert_eq!(config.services.bitcoin_rpc_password, "hunter2");

        let shown = serde_json::to_string(&config).unwrap();
        assert!(!shown.contains("hunter2"));
        assert!(!format!("{:?}", config.services).contains("hunter2"));
    }
}
