//! First-run setup.

use nodekeeper_core::validation::validate_password;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{AuthError, AuthState, IdentityAuthority, IdentityRecord, password};

/// Environment variable holding a password to register with at start.
pub const ADMIN_PASSWORD_ENV: &str = "NODEKEEPER_ADMIN_PASSWORD";

/// Setup status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupStatus {
    /// Whether the identity record exists.
    pub registered: bool,
}

impl SetupStatus {
    /// Current status.
    #[must_use]
    pub fn of(auth: &AuthState) -> Self {
        Self {
            registered: auth.identity.state().is_registered(),
        }
    }
}

/// Register with `password` if the device is still unclaimed.
///
/// Only the identity record is touched; signing keys are left alone.
/// Returns `Ok(false)` when a record already exists.
///
/// # Errors
///
/// Returns error if the password is rejected or the record cannot be written.
pub async fn register_with_password(
    identity: &IdentityAuthority,
    min_password_length: usize,
    password: SecretString,
    name: Option<String>,
) -> Result<bool, AuthError> {
    if identity.state().is_registered() {
        return Ok(false);
    }

    validate_password(password.expose_secret(), min_password_length)?;
    let hash = password::hash(password).await?;

    match identity
        .register(IdentityRecord::new(hash).with_name(name))
        .await
    {
        Ok(()) => Ok(true),
        Err(AuthError::AlreadyRegistered) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Auto-setup from environment variables.
///
/// Registers with `NODEKEEPER_ADMIN_PASSWORD` if it is set and no record
/// exists yet. The variable is only read, never logged.
///
/// # Errors
///
/// Returns error if registration fails.
pub async fn register_from_env(auth: &AuthState) -> Result<bool, AuthError> {
    let password = match std::env::var(ADMIN_PASSWORD_ENV) {
        Ok(p) if !p.is_empty() => SecretString::from(p),
        _ => return Ok(false),
    };

    let created =
        register_with_password(&auth.identity, auth.config.min_password_length, password, None)
            .await?;
    if created {
        tracing::info!("Identity registered from {ADMIN_PASSWORD_ENV}");
    }

    Ok(created)
}
