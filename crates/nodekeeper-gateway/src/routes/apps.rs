//! `/v1/apps` handlers. Install and uninstall are requests to the
//! supervisor; the response only confirms the request was filed.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use nodekeeper_core::disk::{self, Signal};
use nodekeeper_core::validation::validate_app_id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ApiError;
use crate::auth::BearerAuth;
use crate::server::GatewayState;

/// An app from the registry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppEntry {
    /// Registry id.
    pub id: String,
    /// Onion hostname, empty until the app's hidden service exists.
    #[serde(default)]
    pub hidden_service: String,
    /// Remaining registry fields, passed through.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Query of `GET /v1/apps`.
#[derive(Debug, Default, Deserialize)]
pub struct AppsQuery {
    /// `1` or `true` to list installed apps only.
    #[serde(default)]
    pub installed: Option<String>,
}

impl AppsQuery {
    fn installed_only(&self) -> bool {
        self.installed
            .as_deref()
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }
}

/// `GET /v1/apps`
///
/// # Errors
///
/// 500 if the registry cannot be read.
pub async fn list(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
    Query(query): Query<AppsQuery>,
) -> Result<Json<Vec<AppEntry>>, ApiError> {
    let mut apps: Vec<AppEntry> = disk::read_json(&state.paths.app_registry_file())
        .await
        .map_err(|e| ApiError::operation("Unable to get apps", e))?;

    if query.installed_only() {
        let installed = state
            .auth
            .identity
            .record()
            .await?
            .map(|record| record.installed_apps())
            .unwrap_or_default();
        apps.retain(|app| installed.contains(&app.id));
    }

    for app in &mut apps {
        app.hidden_service = String::new();
        if validate_app_id(&app.id).is_ok() {
            let file = state.paths.hidden_service_file(&format!("app-{}", app.id));
            app.hidden_service = disk::read_utf8(&file).await.unwrap_or_default();
        }
    }

    Ok(Json(apps))
}

/// `POST /v1/apps/{id}/install`
///
/// # Errors
///
/// 400 for an invalid id, 500 if the signal cannot be written.
pub async fn install(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
    Path(id): Path<String>,
) -> Result<Json<String>, ApiError> {
    validate_app_id(&id)?;
    disk::write_signal(&state.paths.signal_dir, &Signal::AppInstall(id.clone()))
        .await
        .map_err(|e| ApiError::operation("Could not write the signal file", e))?;
    Ok(Json(format!("Installing {id}")))
}

/// `POST /v1/apps/{id}/uninstall`
///
/// # Errors
///
/// 400 for an invalid id, 500 if the signal cannot be written.
pub async fn uninstall(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
    Path(id): Path<String>,
) -> Result<Json<String>, ApiError> {
    validate_app_id(&id)?;
    disk::write_signal(&state.paths.signal_dir, &Signal::AppUninstall(id.clone()))
        .await
        .map_err(|e| ApiError::operation("Could not write the signal file", e))?;
    Ok(Json(format!("Uninstalling {id}")))
}
