//! # NodeKeeper Gateway
//!
//! HTTP control-plane API for the appliance, and the credential subsystem
//! that guards it: a single system identity, argon2 password hashes, and
//! RS256 session tokens.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
mod middleware;
/// HTTP handlers.
pub mod routes;
mod server;

pub use auth::{AuthConfig, AuthError, AuthState, KeyStore};
pub use middleware::GatewayRateLimiter;
pub use server::{Gateway, GatewayBuilder, GatewayConfig, GatewayState, router};

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: GatewayConfig) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config).await?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Auth initialization error.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
