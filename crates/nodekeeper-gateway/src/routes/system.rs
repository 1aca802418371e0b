//! `/v1/system` handlers.

use axum::{Json, body::Bytes, extract::State};
use nodekeeper_core::disk::{self, DiskError, FileMode, Signal};
use nodekeeper_core::validation::validate_release_version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{ApiError, parse_body};
use crate::auth::BearerAuth;
use crate::server::GatewayState;

const MEMORY_WARNING_FILE: &str = "memory-warning";
const UPDATE_STATUS_FILE: &str = "update-status.json";
const UPDATE_LOCK_FILE: &str = "update-in-progress";
const BACKUP_STATUS_FILE: &str = "backup-status.json";
const DEBUG_STATUS_FILE: &str = "debug-status.json";

/// Result of `GET /v1/system/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    /// The supervisor flagged memory pressure.
    pub high_memory_usage: bool,
}

/// How a wallet reaches a node service over Tor.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    /// Onion hostname.
    pub address: String,
    /// Service port.
    pub port: u16,
    /// Everything above in the form wallets import.
    pub connection_string: String,
}

/// [`ConnectionDetails`] plus the RPC login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcConnectionDetails {
    /// RPC user name.
    pub rpcuser: String,
    /// RPC password.
    pub rpcpassword: String,
    /// Onion hostname.
    pub address: String,
    /// RPC port.
    pub port: u16,
    /// `btcrpc://` URL.
    pub connection_string: String,
}

/// Body of `POST /v1/system/update`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    /// Release to install, with or without a leading `v`.
    #[serde(default)]
    pub version: String,
}

/// `GET /v1/system/info`
///
/// # Errors
///
/// 500 if the version file is missing or malformed.
pub async fn info(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<Value>, ApiError> {
    disk::read_json(&state.paths.version_file)
        .await
        .map(Json)
        .map_err(|e| ApiError::operation("Unable to get system information", e))
}

/// `GET /v1/system/dashboard-hidden-service`
///
/// # Errors
///
/// 500 if the hostname file cannot be read.
pub async fn dashboard_hidden_service(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<String>, ApiError> {
    disk::read_utf8(&state.paths.hidden_service_file("web"))
        .await
        .map(Json)
        .map_err(|e| ApiError::operation("Unable to get hidden service url", e))
}

async fn hidden_service(
    state: &GatewayState,
    service: &str,
    failed: &'static str,
) -> Result<String, ApiError> {
    disk::read_utf8(&state.paths.hidden_service_file(service))
        .await
        .map_err(|e| ApiError::operation(failed, e))
}

/// `GET /v1/system/electrum-connection-details`
///
/// # Errors
///
/// 500 if the hostname file cannot be read.
pub async fn electrum_connection_details(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<ConnectionDetails>, ApiError> {
    let address =
        hidden_service(&state, "electrum", "Unable to get Electrum hidden service url").await?;
    let port = state.services.electrum_port;
    Ok(Json(ConnectionDetails {
        connection_string: format!("{address}:{port}:t"),
        address,
        port,
    }))
}

/// `GET /v1/system/bitcoin-p2p-connection-details`
///
/// # Errors
///
/// 500 if the hostname file cannot be read.
pub async fn bitcoin_p2p_connection_details(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<ConnectionDetails>, ApiError> {
    let address =
        hidden_service(&state, "bitcoin-p2p", "Unable to get Bitcoin P2P hidden service url")
            .await?;
    let port = state.services.bitcoin_p2p_port;
    Ok(Json(ConnectionDetails {
        connection_string: format!("{address}:{port}"),
        address,
        port,
    }))
}

/// `GET /v1/system/bitcoin-rpc-connection-details`
///
/// The connection is labelled with the owner's display name.
///
/// # Errors
///
/// 500 if the hostname file or the identity record cannot be read.
pub async fn bitcoin_rpc_connection_details(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<RpcConnectionDetails>, ApiError> {
    const FAILED: &str = "Unable to get Bitcoin RPC connection details";

    let record = state.auth.identity.record().await?.ok_or_else(|| {
        ApiError::operation(FAILED, DiskError::NotFound(state.auth.identity.location().into()))
    })?;
    let address = hidden_service(&state, "bitcoin-rpc", FAILED).await?;

    let label = match record.name {
        Some(name) => format!("{name}'s NodeKeeper"),
        None => "NodeKeeper".to_string(),
    };
    let services = &state.services;
    let connection_string = format!(
        "btcrpc://{}:{}@{address}:{}?label={}",
        services.bitcoin_rpc_user,
        services.bitcoin_rpc_password,
        services.bitcoin_rpc_port,
        urlencoding::encode(&label),
    );

    Ok(Json(RpcConnectionDetails {
        rpcuser: services.bitcoin_rpc_user.clone(),
        rpcpassword: services.bitcoin_rpc_password.clone(),
        address,
        port: services.bitcoin_rpc_port,
        connection_string,
    }))
}

/// `GET /v1/system/status`
pub async fn status(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Json<SystemStatus> {
    let high_memory_usage = disk::exists(&state.paths.status_dir.join(MEMORY_WARNING_FILE)).await;
    Json(SystemStatus { high_memory_usage })
}

/// `DELETE /v1/system/memory-warning`
///
/// # Errors
///
/// 500 if the warning file exists but cannot be removed.
pub async fn clear_memory_warning(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<&'static str>, ApiError> {
    disk::remove(&state.paths.status_dir.join(MEMORY_WARNING_FILE))
        .await
        .map_err(|e| ApiError::operation("Unable to dismiss high memory warning", e))?;
    Ok(Json("High memory warning dismissed"))
}

/// `GET /v1/system/update-status`
///
/// # Errors
///
/// 500 if the status file cannot be read.
pub async fn update_status(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<Value>, ApiError> {
    disk::read_json(&state.paths.status_dir.join(UPDATE_STATUS_FILE))
        .await
        .map(Json)
        .map_err(|e| ApiError::operation("Unable to get update status", e))
}

/// `POST /v1/system/update`
///
/// Records the target release in the update status file, then signals the
/// supervisor to install it.
///
/// # Errors
///
/// 400 for a bad version, 409 while an update is running, 500 if a state
/// file cannot be written.
pub async fn start_update(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: UpdateRequest = parse_body(&body)?;
    let version = validate_release_version(&request.version)?;

    if disk::exists(&state.paths.status_dir.join(UPDATE_LOCK_FILE)).await {
        return Err(ApiError::Conflict("An update is already in progress"));
    }

    let status_file = state.paths.status_dir.join(UPDATE_STATUS_FILE);
    let mut status = match disk::read_json::<Map<String, Value>>(&status_file).await {
        Ok(status) => status,
        Err(DiskError::NotFound(_)) => Map::new(),
        Err(e) => return Err(ApiError::operation("Could not update the update-status file", e)),
    };
    status.insert("updateTo".to_string(), Value::String(format!("v{version}")));
    disk::write_json_atomic(&status_file, &status, FileMode::Shared)
        .await
        .map_err(|e| ApiError::operation("Could not update the update-status file", e))?;

    disk::write_signal(&state.paths.signal_dir, &Signal::Update)
        .await
        .map_err(|e| ApiError::operation("Unable to write update signal file", e))?;

    tracing::info!(%version, "Update requested");
    Ok(Json(json!({ "message": format!("Updating to v{version}") })))
}

/// `GET /v1/system/backup-status`
///
/// # Errors
///
/// 500 if the status file cannot be read.
pub async fn backup_status(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<Value>, ApiError> {
    disk::read_json(&state.paths.status_dir.join(BACKUP_STATUS_FILE))
        .await
        .map(Json)
        .map_err(|e| ApiError::operation("Unable to get backup status", e))
}

/// `GET /v1/system/debug-result`
///
/// # Errors
///
/// 500 if the debug status file cannot be read.
pub async fn debug_result(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<Value>, ApiError> {
    disk::read_json(&state.paths.status_dir.join(DEBUG_STATUS_FILE))
        .await
        .map(Json)
        .map_err(|e| ApiError::operation("Unable to get debug results", e))
}

async fn request(
    state: &GatewayState,
    signal: Signal,
    done: &'static str,
    failed: &'static str,
) -> Result<Json<&'static str>, ApiError> {
    disk::write_signal(&state.paths.signal_dir, &signal)
        .await
        .map_err(|e| ApiError::operation(failed, e))?;
    Ok(Json(done))
}

/// `POST /v1/system/debug`
///
/// # Errors
///
/// 500 if the signal file cannot be written.
pub async fn request_debug(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<&'static str>, ApiError> {
    request(&state, Signal::Debug, "Debug requested", "Could not write the signal file").await
}

/// `POST /v1/system/reboot`
///
/// # Errors
///
/// 500 if the signal file cannot be written.
pub async fn reboot(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<&'static str>, ApiError> {
    request(&state, Signal::Reboot, "Reboot requested", "Unable to request reboot").await
}

/// `POST /v1/system/shutdown`
///
/// # Errors
///
/// 500 if the signal file cannot be written.
pub async fn shutdown(
    State(state): State<GatewayState>,
    BearerAuth(_): BearerAuth,
) -> Result<Json<&'static str>, ApiError> {
    request(&state, Signal::Shutdown, "Shutdown requested", "Unable to request shutdown").await
}
