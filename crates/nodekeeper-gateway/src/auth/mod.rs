//! Credential issuance and request authorization.
//!
//! This module provides:
//! - The signing keypair used for session tokens (`keys`)
//! - Argon2 password hashing (`password`)
//! - The single identity record and its stores (`credentials`)
//! - The registration lifecycle (`identity`)
//! - Basic, bearer, and registration strategies (`strategy`)
//! - The per-guard dispatch table (`gate`) and axum guards (`guard`)

mod config;
pub mod credentials;
mod gate;
mod guard;
mod identity;
mod keys;
pub mod password;
/// Start-up registration and setup status.
pub mod setup;
mod state;
mod strategy;

pub use config::{AuthConfig, AuthConfigBuilder};
pub use credentials::{
    CredentialStore, FileCredentialStore, IdentityRecord, SledCredentialStore, open_store,
};
pub use gate::{Dispatch, Grant, GuardKind, GuardTable};
pub use guard::{
    AccountAuth, AccountContext, BasicAuth, BearerAuth, RegistrationAuth, basic_auth_from_body,
};
pub use identity::{IdentityAuthority, RegistrationState};
pub use keys::{KeyStore, Keypair, SessionClaims, SigningOptions, TOKEN_ALGORITHM};
pub use setup::SetupStatus;
pub use state::AuthState;
pub use strategy::{Credentials, IdentityContext, Strategy, Verified};

use nodekeeper_core::ValidationError;
use thiserror::Error;

/// Name of the single system account.
pub const SYSTEM_USER: &str = "admin";

/// Authentication errors.
///
/// Every variant except the internal ones is a terminal denial for the
/// request. `IncorrectPassword` is deliberately kept apart from the other
/// credential failures; it maps to 403 so that clients which log out on
/// 401 keep their session after a mistyped password.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was supplied.
    #[error("No credentials supplied")]
    NoCredentials,

    /// A credential was supplied but could not be parsed.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The password does not match the stored hash.
    #[error("Incorrect password")]
    IncorrectPassword,

    /// The session token failed verification.
    #[error("Invalid JWT")]
    InvalidToken,

    /// No identity record exists yet.
    #[error("No user registered")]
    NotRegistered,

    /// The identity record already exists.
    #[error("User already registered")]
    AlreadyRegistered,

    /// A supplied value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Too many attempts from one client.
    #[error("Too many authentication attempts")]
    RateLimited,

    /// Credential storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Signing key failure.
    #[error("Key store error: {0}")]
    KeyStore(String),

    /// Password hashing failure.
    #[error("Hashing error: {0}")]
    Hashing(String),
}

impl AuthError {
    /// Stable machine-readable code for the response body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoCredentials => "no_credentials",
            Self::InvalidCredentials(_) => "invalid_credentials",
            Self::IncorrectPassword => "incorrect_password",
            Self::InvalidToken => "invalid_token",
            Self::NotRegistered => "not_registered",
            Self::AlreadyRegistered => "already_registered",
            Self::Validation(_) => "invalid_input",
            Self::RateLimited => "rate_limited",
            Self::Storage(_) | Self::KeyStore(_) | Self::Hashing(_) => "internal_error",
        }
    }

    /// Whether the failure is a server-side fault rather than a denial.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::KeyStore(_) | Self::Hashing(_))
    }
}
