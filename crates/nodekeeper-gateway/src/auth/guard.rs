//! Axum guards.
//!
//! Each guard is an extractor; putting one in a handler's arguments
//! protects the route. Rejections render as `{error, code}` JSON.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{FromRef, FromRequestParts, Request},
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::{
    AuthError, AuthState, Credentials, Grant, GuardKind, IdentityContext, IdentityRecord,
    SYSTEM_USER,
};

/// Largest body the password fallback will buffer.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Error response for auth failures.
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NoCredentials
            | Self::InvalidCredentials(_)
            | Self::InvalidToken
            | Self::NotRegistered => StatusCode::UNAUTHORIZED,
            Self::IncorrectPassword => StatusCode::FORBIDDEN,
            Self::AlreadyRegistered => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(_) | Self::KeyStore(_) | Self::Hashing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = AuthErrorResponse {
            error: if self.is_internal() {
                "Unable to authenticate".to_string()
            } else {
                self.to_string()
            },
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

fn authorization(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

async fn grant<S>(parts: &Parts, state: &S, kind: GuardKind) -> Result<Grant, AuthError>
where
    Arc<AuthState>: FromRef<S>,
{
    let auth = Arc::<AuthState>::from_ref(state);
    auth.authorize(kind, authorization(parts)).await
}

/// Password-authenticated request.
#[derive(Debug, Clone)]
pub struct BasicAuth(pub IdentityContext);

impl<S> FromRequestParts<S> for BasicAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match grant(parts, state, GuardKind::Basic).await? {
            Grant::Identity(identity) => Ok(Self(identity)),
            _ => Err(AuthError::NoCredentials),
        }
    }
}

/// Token-authenticated request.
#[derive(Debug, Clone)]
pub struct BearerAuth(pub IdentityContext);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match grant(parts, state, GuardKind::Bearer).await? {
            Grant::Identity(identity) => Ok(Self(identity)),
            _ => Err(AuthError::NoCredentials),
        }
    }
}

/// Result of the conditional guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountContext {
    /// The device is not claimed yet; no credential was needed.
    Unregistered,
    /// A valid session token was presented.
    Registered(IdentityContext),
}

/// Token required once the device is claimed, open before that.
#[derive(Debug, Clone)]
pub struct AccountAuth(pub AccountContext);

impl<S> FromRequestParts<S> for AccountAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match grant(parts, state, GuardKind::ConditionalBearer).await? {
            Grant::Identity(identity) => Ok(Self(AccountContext::Registered(identity))),
            Grant::Unregistered => Ok(Self(AccountContext::Unregistered)),
            Grant::Candidate(_) => Err(AuthError::NoCredentials),
        }
    }
}

/// First-time registration. Carries the hashed record, not yet persisted.
#[derive(Debug)]
pub struct RegistrationAuth(pub IdentityRecord);

impl<S> FromRequestParts<S> for RegistrationAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match grant(parts, state, GuardKind::Registration).await? {
            Grant::Candidate(record) => Ok(Self(record)),
            _ => Err(AuthError::NoCredentials),
        }
    }
}

#[derive(Deserialize)]
struct PasswordField {
    #[serde(default)]
    password: Option<String>,
}

/// Accept a JSON `password` field in place of a Basic header.
///
/// Requests that already carry an `Authorization` header pass untouched.
/// Otherwise a body of the form `{"password": "..."}` gets a synthesized
/// Basic header for the system user, and the body is passed on intact.
///
/// # Errors
///
/// Rejects bodies that cannot be read or exceed the size limit.
pub async fn basic_auth_from_body(request: Request, next: Next) -> Result<Response, AuthError> {
    if request.headers().contains_key(AUTHORIZATION) {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AuthError::InvalidCredentials("Unreadable request body".into()))?;

    if let Ok(PasswordField {
        password: Some(password),
    }) = serde_json::from_slice(&bytes)
    {
        if !password.is_empty() {
            let header = Credentials::basic_header(SYSTEM_USER, &password);
            let value = HeaderValue::from_str(&header)
                .map_err(|_| AuthError::InvalidCredentials("Unencodable password".into()))?;
            parts.headers.insert(AUTHORIZATION, value);
        }
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use axum::{Router, body::to_bytes, middleware, routing::post};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    async fn echo_authorization(request: Request) -> String {
        request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none")
            .to_string()
    }

    fn app() -> Router {
        Router::new()
            .route("/", post(echo_authorization))
            .layer(middleware::from_fn(basic_auth_from_body))
    }

    async fn call(request: Request) -> String {
        let response = app().oneshot(request).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_body_password_becomes_basic() {
        let request = HttpRequest::post("/")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"password":"correct-horse-battery"}"#))
            .unwrap();

        assert_eq!(
            call(request).await,
            Credentials::basic_header("admin", "correct-horse-battery")
        );
    }

    #[tokio::test]
    async fn test_existing_header_wins() {
        let request = HttpRequest::post("/")
            .header(AUTHORIZATION, "JWT abc")
            .body(Body::from(r#"{"password":"ignored"}"#))
            .unwrap();

        assert_eq!(call(request).await, "JWT abc");
    }

    #[tokio::test]
    async fn test_no_password_field() {
        let request = HttpRequest::post("/")
            .body(Body::from(r#"{"name":"Satoshi"}"#))
            .unwrap();
        assert_eq!(call(request).await, "none");

        let request = HttpRequest::post("/").body(Body::from("not json")).unwrap();
        assert_eq!(call(request).await, "none");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AuthError::NoCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AuthError::NotRegistered, StatusCode::UNAUTHORIZED),
            (AuthError::IncorrectPassword, StatusCode::FORBIDDEN),
            (AuthError::AlreadyRegistered, StatusCode::CONFLICT),
            (AuthError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                AuthError::Storage("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
