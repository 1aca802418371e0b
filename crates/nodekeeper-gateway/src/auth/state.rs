//! Shared authentication state.

use super::{
    AuthConfig, AuthError, Credentials, Dispatch, Grant, GuardKind, GuardTable, IdentityAuthority,
    IdentityContext, KeyStore, Verified, open_store,
};

/// Everything a guard needs, shared by all requests.
pub struct AuthState {
    /// Auth configuration.
    pub config: AuthConfig,
    /// Signing keys.
    pub keys: KeyStore,
    /// Registration state and the identity record.
    pub identity: IdentityAuthority,
    /// Guard dispatch table.
    pub guards: GuardTable,
}

impl AuthState {
    /// Create auth state from its parts.
    #[must_use]
    pub fn new(config: AuthConfig, keys: KeyStore, identity: IdentityAuthority) -> Self {
        Self {
            config,
            keys,
            identity,
            guards: GuardTable::standard(),
        }
    }

    /// Open the credential store, load or create the signing keys, and
    /// read the registration state.
    ///
    /// # Errors
    ///
    /// Returns error if the store or the keys cannot be opened.
    pub async fn initialize(config: AuthConfig) -> Result<Self, AuthError> {
        let store = open_store(&config)?;
        let identity = IdentityAuthority::load(store).await?;
        let keys = KeyStore::open(&config).await?;

        if !config.enabled {
            tracing::warn!("Authentication is disabled; every guarded route is open");
        }

        tracing::info!(
            credentials = %identity.location(),
            registered = identity.state().is_registered(),
            "Auth initialized"
        );

        Ok(Self::new(config, keys, identity))
    }

    /// Decide a request for the given guard.
    ///
    /// `header` is the raw `Authorization` value, if any.
    ///
    /// # Errors
    ///
    /// Returns the denial reason.
    pub async fn authorize(&self, kind: GuardKind, header: Option<&str>) -> Result<Grant, AuthError> {
        let state = self.identity.state();

        let strategy = match self.guards.dispatch(kind, state) {
            Dispatch::PassThrough => return Ok(Grant::Unregistered),
            Dispatch::RejectRegistered => return Err(AuthError::AlreadyRegistered),
            Dispatch::Run(strategy) => strategy,
        };

        if !self.config.enabled && kind != GuardKind::Registration {
            return Ok(Grant::Identity(IdentityContext::system()));
        }

        let credentials = header
            .map(|value| Credentials::from_header(value, &self.config.token_scheme))
            .transpose()?;

        match strategy.verify(self, credentials).await {
            Ok(Verified::Identity(identity)) => Ok(Grant::Identity(identity)),
            Ok(Verified::Candidate(record)) => Ok(Grant::Candidate(record)),
            Err(e) => {
                if e.is_internal() {
                    tracing::error!(guard = ?kind, error = %e, "Authorization failed");
                } else {
                    tracing::debug!(guard = ?kind, error = %e, "Request denied");
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::IdentityRecord;
    use nodekeeper_core::config::CredentialBackend;
    use tempfile::TempDir;

    const PASSWORD: &str = "correct-horse-battery";

    async fn state(dir: &TempDir) -> AuthState {
        let config = AuthConfig::builder().rooted_at(dir.path()).build();
        AuthState::initialize(config).await.unwrap()
    }

    async fn register(auth: &AuthState) {
        let header = Credentials::basic_header("admin", PASSWORD);
        let Grant::Candidate(record) = auth
            .authorize(GuardKind::Registration, Some(&header))
            .await
            .unwrap()
        else {
            panic!("expected candidate");
        };
        auth.identity.register(record).await.unwrap();
    }

    #[tokio::test]
    async fn test_basic_before_registration() {
        let dir = TempDir::new().unwrap();
        let auth = state(&dir).await;

        let header = Credentials::basic_header("admin", PASSWORD);
        let result = auth.authorize(GuardKind::Basic, Some(&header)).await;
        assert!(matches!(result, Err(AuthError::NotRegistered)));
    }

    #[tokio::test]
    async fn test_basic_after_registration() {
        let dir = TempDir::new().unwrap();
        let auth = state(&dir).await;
        register(&auth).await;

        let good = Credentials::basic_header("admin", PASSWORD);
        assert!(matches!(
            auth.authorize(GuardKind::Basic, Some(&good)).await,
            Ok(Grant::Identity(_))
        ));

        let bad = Credentials::basic_header("admin", "wrong-password-here");
        assert!(matches!(
            auth.authorize(GuardKind::Basic, Some(&bad)).await,
            Err(AuthError::IncorrectPassword)
        ));

        assert!(matches!(
            auth.authorize(GuardKind::Basic, None).await,
            Err(AuthError::NoCredentials)
        ));
    }

    #[tokio::test]
    async fn test_registration_rejects_short_password() {
        let dir = TempDir::new().unwrap();
        let auth = state(&dir).await;

        let header = Credentials::basic_header("admin", "short");
        assert!(matches!(
            auth.authorize(GuardKind::Registration, Some(&header)).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_registration_closed_after_registering() {
        let dir = TempDir::new().unwrap();
        let auth = state(&dir).await;
        register(&auth).await;

        let header = Credentials::basic_header("admin", PASSWORD);
        assert!(matches!(
            auth.authorize(GuardKind::Registration, Some(&header)).await,
            Err(AuthError::AlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn test_conditional_bearer() {
        let dir = TempDir::new().unwrap();
        let auth = state(&dir).await;

        assert!(matches!(
            auth.authorize(GuardKind::ConditionalBearer, None).await,
            Ok(Grant::Unregistered)
        ));

        auth.identity
            .register(IdentityRecord::new("hash".to_string()))
            .await
            .unwrap();

        assert!(matches!(
            auth.authorize(GuardKind::ConditionalBearer, None).await,
            Err(AuthError::NoCredentials)
        ));

        let token = auth.keys.issue_token().await.unwrap();
        let header = format!("JWT {token}");
        assert!(matches!(
            auth.authorize(GuardKind::ConditionalBearer, Some(&header)).await,
            Ok(Grant::Identity(_))
        ));
    }

    #[tokio::test]
    async fn test_bearer_after_rotation() {
        let dir = TempDir::new().unwrap();
        let auth = state(&dir).await;

        let token = auth.keys.issue_token().await.unwrap();
        let header = format!("JWT {token}");
        assert!(auth.authorize(GuardKind::Bearer, Some(&header)).await.is_ok());

        auth.keys.rotate().await.unwrap();
        assert!(matches!(
            auth.authorize(GuardKind::Bearer, Some(&header)).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_bearer_rejects_basic_credentials() {
        let dir = TempDir::new().unwrap();
        let auth = state(&dir).await;
        register(&auth).await;

        let header = Credentials::basic_header("admin", PASSWORD);
        assert!(matches!(
            auth.authorize(GuardKind::Bearer, Some(&header)).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_basic_upgrades_bcrypt_hash() {
        let dir = TempDir::new().unwrap();
        let auth = state(&dir).await;
        auth.identity
            .register(IdentityRecord::new(bcrypt::hash(PASSWORD, 4).unwrap()))
            .await
            .unwrap();

        let bad = Credentials::basic_header("admin", "wrong-password-here");
        assert!(matches!(
            auth.authorize(GuardKind::Basic, Some(&bad)).await,
            Err(AuthError::IncorrectPassword)
        ));
        let stored = auth.identity.record().await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("$2b$"));

        let good = Credentials::basic_header("admin", PASSWORD);
        assert!(matches!(
            auth.authorize(GuardKind::Basic, Some(&good)).await,
            Ok(Grant::Identity(_))
        ));
        let stored = auth.identity.record().await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$"));

        assert!(matches!(
            auth.authorize(GuardKind::Basic, Some(&good)).await,
            Ok(Grant::Identity(_))
        ));
    }

    #[tokio::test]
    async fn test_sled_backend() {
        let dir = TempDir::new().unwrap();
        let config = AuthConfig::builder()
            .rooted_at(dir.path())
            .credential_backend(CredentialBackend::Sled)
            .build();
        let auth = AuthState::initialize(config).await.unwrap();
        register(&auth).await;

        assert!(!dir.path().join("db/user.json").exists());
        assert!(dir.path().join("db/credentials").is_dir());
        let header = Credentials::basic_header("admin", PASSWORD);
        assert!(matches!(
            auth.authorize(GuardKind::Basic, Some(&header)).await,
            Ok(Grant::Identity(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_auth() {
        let dir = TempDir::new().unwrap();
        let config = AuthConfig::builder()
            .rooted_at(dir.path())
            .enabled(false)
            .build();
        let auth = AuthState::initialize(config).await.unwrap();

        assert!(matches!(
            auth.authorize(GuardKind::Bearer, None).await,
            Ok(Grant::Identity(_))
        ));
    }
}
