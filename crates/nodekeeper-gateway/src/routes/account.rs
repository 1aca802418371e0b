//! `/v1/account` handlers.

use axum::{Json, body::Bytes, extract::State};
use nodekeeper_core::validation::{validate_display_name, validate_password};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ApiError, parse_body};
use crate::auth::{
    AccountAuth, AccountContext, BasicAuth, BearerAuth, Credentials, RegistrationAuth, SetupStatus,
    Strategy, password,
};
use crate::server::GatewayState;

/// A freshly issued session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed token, sent back as `Authorization: JWT <token>`.
    pub jwt: String,
}

/// Optional fields accepted at registration.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Display name.
    #[serde(default)]
    #[validate(length(max = 256))]
    pub name: Option<String>,
}

/// Password change body.
#[derive(Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    /// Current password.
    #[serde(default)]
    #[validate(length(min = 1))]
    pub password: String,
    /// Replacement password.
    #[serde(default)]
    #[validate(length(min = 1, max = 1024))]
    pub new_password: String,
}

/// Account details.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Whether the device has been claimed.
    pub registered: bool,
    /// Account name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `GET /v1/account/registered`
pub async fn registered(State(state): State<GatewayState>) -> Json<SetupStatus> {
    Json(SetupStatus::of(&state.auth))
}

/// `POST /v1/account/register`
///
/// # Errors
///
/// 409 once registered, 400 for a weak password or bad name.
pub async fn register(
    State(state): State<GatewayState>,
    RegistrationAuth(candidate): RegistrationAuth,
    body: Bytes,
) -> Result<Json<TokenResponse>, ApiError> {
    let request: RegisterRequest = parse_body(&body)?;
    request.validate()?;

    let name = request
        .name
        .as_deref()
        .map(validate_display_name)
        .transpose()?;

    // Sign first so a key failure cannot leave a claimed device without a token.
    let jwt = state.auth.keys.issue_token().await?;
    state.auth.identity.register(candidate.with_name(name)).await?;

    Ok(Json(TokenResponse { jwt }))
}

/// `POST /v1/account/login`
///
/// # Errors
///
/// 401 if unregistered or no credential, 403 on a wrong password.
pub async fn login(
    State(state): State<GatewayState>,
    BasicAuth(identity): BasicAuth,
) -> Result<Json<TokenResponse>, ApiError> {
    let jwt = state.auth.keys.issue_token().await?;
    tracing::info!(user = %identity.username, "Login");
    Ok(Json(TokenResponse { jwt }))
}

/// `POST /v1/account/refresh`
///
/// # Errors
///
/// 401 without a valid token.
pub async fn refresh(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<TokenResponse>, ApiError> {
    let jwt = state.auth.keys.issue_token().await?;
    Ok(Json(TokenResponse { jwt }))
}

/// `GET /v1/account/info`
///
/// Open before registration; token required after.
///
/// # Errors
///
/// 401 without a valid token once registered.
pub async fn info(
    State(state): State<GatewayState>,
    AccountAuth(context): AccountAuth,
) -> Result<Json<AccountInfo>, ApiError> {
    match context {
        AccountContext::Unregistered => Ok(Json(AccountInfo {
            registered: false,
            username: None,
            name: None,
        })),
        AccountContext::Registered(identity) => {
            let record = state.auth.identity.record().await?;
            Ok(Json(AccountInfo {
                registered: true,
                username: Some(identity.username),
                name: record.and_then(|r| r.name),
            }))
        }
    }
}

/// `POST /v1/account/change-password`
///
/// Needs a session token and the current password.
///
/// # Errors
///
/// 401 without a token, 403 on a wrong current password, 400 for a weak
/// new password.
pub async fn change_password(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
    body: Bytes,
) -> Result<Json<&'static str>, ApiError> {
    let request: ChangePasswordRequest = parse_body(&body)?;
    request.validate()?;
    validate_password(&request.new_password, state.auth.config.min_password_length)?;

    let current = Credentials::Basic {
        username: String::new(),
        password: SecretString::from(request.password),
    };
    Strategy::Basic.verify(&state.auth, Some(current)).await?;

    let hash = password::hash(SecretString::from(request.new_password)).await?;
    state.auth.identity.change_password(hash).await?;

    Ok(Json("Password changed"))
}
