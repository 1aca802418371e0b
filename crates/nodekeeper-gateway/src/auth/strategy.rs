//! Authorization header parsing and the three authentication strategies.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nodekeeper_core::validation::validate_password;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{AuthError, AuthState, IdentityRecord, SYSTEM_USER, password};

/// The authenticated principal attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityContext {
    /// Always the system user.
    pub username: String,
}

impl IdentityContext {
    /// Context for the system user.
    #[must_use]
    pub fn system() -> Self {
        Self {
            username: SYSTEM_USER.to_string(),
        }
    }
}

/// A parsed `Authorization` header.
pub enum Credentials {
    /// `Basic base64(user:base64(password))`.
    Basic {
        /// Supplied user name. Not checked; there is only one account.
        username: String,
        /// Decoded password.
        password: SecretString,
    },
    /// `<scheme> <token>`.
    Token(String),
}

impl Credentials {
    /// Parse a header value. The token scheme is matched case-insensitively.
    ///
    /// The Basic password is itself base64 encoded inside the outer
    /// `user:password` pair, so clients never put raw password bytes in
    /// the header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` for unknown schemes or bad encoding.
    pub fn from_header(value: &str, token_scheme: &str) -> Result<Self, AuthError> {
        let value = value.trim();
        let (scheme, rest) = value
            .split_once(char::is_whitespace)
            .ok_or_else(|| AuthError::InvalidCredentials("Malformed authorization header".into()))?;
        let rest = rest.trim();

        if scheme.eq_ignore_ascii_case("basic") {
            return Self::decode_basic(rest);
        }

        if scheme.eq_ignore_ascii_case(token_scheme) {
            if rest.is_empty() {
                return Err(AuthError::InvalidCredentials("Empty token".into()));
            }
            return Ok(Self::Token(rest.to_string()));
        }

        Err(AuthError::InvalidCredentials(format!(
            "Unsupported authorization scheme: {scheme}"
        )))
    }

    fn decode_basic(encoded: &str) -> Result<Self, AuthError> {
        let pair = decode_utf8(encoded)?;
        let (username, encoded_password) = pair
            .split_once(':')
            .ok_or_else(|| AuthError::InvalidCredentials("Missing password".into()))?;

        Ok(Self::Basic {
            username: username.to_string(),
            password: SecretString::from(decode_utf8(encoded_password)?),
        })
    }

    /// Build a Basic header value for `username` and a plaintext password.
    #[must_use]
    pub fn basic_header(username: &str, password: &str) -> String {
        let inner = STANDARD.encode(password);
        format!("Basic {}", STANDARD.encode(format!("{username}:{inner}")))
    }
}

fn decode_utf8(encoded: &str) -> Result<String, AuthError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| AuthError::InvalidCredentials("Invalid base64 encoding".into()))?;
    String::from_utf8(bytes)
        .map_err(|_| AuthError::InvalidCredentials("Credentials are not UTF-8".into()))
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Token(_) => f.write_str("Token(..)"),
        }
    }
}

/// What a successful strategy produces.
#[derive(Debug)]
pub enum Verified {
    /// An authenticated principal.
    Identity(IdentityContext),
    /// A record ready to persist, from the registration strategy.
    Candidate(IdentityRecord),
}

/// How a credential is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Password against the stored hash.
    Basic,
    /// Session token against the current verification key.
    Bearer,
    /// Password turned into a new identity record.
    Registration,
}

impl Strategy {
    /// Run the strategy against the parsed credential.
    ///
    /// # Errors
    ///
    /// Returns the denial reason.
    pub async fn verify(
        self,
        auth: &AuthState,
        credentials: Option<Credentials>,
    ) -> Result<Verified, AuthError> {
        match (self, credentials) {
            (_, None) => Err(AuthError::NoCredentials),
            (Self::Basic, Some(Credentials::Basic { password, .. })) => {
                let record = auth.identity.record().await?.ok_or(AuthError::NotRegistered)?;
                let upgrade = password::needs_rehash(&record.password_hash)
                    .then(|| SecretString::from(password.expose_secret().to_owned()));

                if !password::verify(password, record.password_hash).await? {
                    return Err(AuthError::IncorrectPassword);
                }
                if let Some(password) = upgrade {
                    upgrade_hash(auth, password).await;
                }
                Ok(Verified::Identity(IdentityContext::system()))
            }
            (Self::Bearer, Some(Credentials::Token(token))) => {
                auth.keys.signing_options().await.verify(&token)?;
                Ok(Verified::Identity(IdentityContext::system()))
            }
            (Self::Registration, Some(Credentials::Basic { password, .. })) => {
                validate_password(password.expose_secret(), auth.config.min_password_length)?;
                let hash = password::hash(password).await?;
                Ok(Verified::Candidate(IdentityRecord::new(hash)))
            }
            (Self::Basic | Self::Registration, Some(Credentials::Token(_))) => Err(
                AuthError::InvalidCredentials("Expected Basic credentials".into()),
            ),
            (Self::Bearer, Some(Credentials::Basic { .. })) => Err(AuthError::InvalidToken),
        }
    }
}

/// Replace a legacy bcrypt hash with an Argon2id one. Failure leaves the old
/// hash in place; the login itself already succeeded.
async fn upgrade_hash(auth: &AuthState, password: SecretString) {
    let result = match password::hash(password).await {
        Ok(hash) => auth.identity.change_password(hash).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => tracing::info!("Upgraded legacy password hash to Argon2id"),
        Err(e) => tracing::warn!(error = %e, "Failed to upgrade legacy password hash"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let header = Credentials::basic_header("admin", "correct-horse-battery");
        match Credentials::from_header(&header, "JWT").unwrap() {
            Credentials::Basic { username, password } => {
                assert_eq!(username, "admin");
                assert_eq!(password.expose_secret(), "correct-horse-battery");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_basic_header_nests_password() {
        // "admin:" + base64("pw") = "admin:cHc="
        assert_eq!(
            Credentials::basic_header("admin", "pw"),
            format!("Basic {}", STANDARD.encode("admin:cHc="))
        );
    }

    #[test]
    fn test_parse_token_scheme() {
        assert!(matches!(
            Credentials::from_header("JWT abc.def.ghi", "JWT"),
            Ok(Credentials::Token(t)) if t == "abc.def.ghi"
        ));
        assert!(matches!(
            Credentials::from_header("jwt abc", "JWT"),
            Ok(Credentials::Token(_))
        ));
        assert!(Credentials::from_header("Bearer abc", "JWT").is_err());
        assert!(Credentials::from_header("JWT ", "JWT").is_err());
        assert!(Credentials::from_header("abc", "JWT").is_err());
    }

    #[test]
    fn test_parse_bad_basic() {
        assert!(Credentials::from_header("Basic !!!", "JWT").is_err());
        let no_colon = format!("Basic {}", STANDARD.encode("admin"));
        assert!(Credentials::from_header(&no_colon, "JWT").is_err());
        let raw_password = format!("Basic {}", STANDARD.encode("admin:not base64!"));
        assert!(Credentials::from_header(&raw_password, "JWT").is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let header = Credentials::basic_header("admin", "hunter2hunter2");
        let parsed = Credentials::from_header(&header, "JWT").unwrap();
        assert!(!format!("{parsed:?}").contains("hunter2"));

        let token = Credentials::Token("secret.token".to_string());
        assert!(!format!("{token:?}").contains("secret"));
    }
}
