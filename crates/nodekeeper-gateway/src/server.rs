//! Gateway server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::FromRef,
    middleware,
    routing::{delete, get, post},
};
use nodekeeper_core::Config;
use nodekeeper_core::config::{PathsConfig, ServicesConfig};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::GatewayError;
use crate::auth::{AuthConfig, AuthState, basic_auth_from_body, setup};
use crate::middleware::{GatewayRateLimiter, rate_limit};
use crate::routes::{self, account, apps, system};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Enable CORS.
    pub cors: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Password attempts allowed per client per minute.
    pub rate_limit_per_minute: u32,
    /// State file locations.
    pub paths: PathsConfig,
    /// Node services advertised to wallets.
    pub services: ServicesConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GatewayConfig {
    /// Resolve from the application config.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.gateway.port,
            bind_address: config.bind_address(),
            cors: config.gateway.cors,
            timeout: Duration::from_secs(config.gateway.timeout_secs),
            rate_limit_per_minute: config.gateway.rate_limit_per_minute,
            paths: config.paths.clone(),
            services: config.services.clone(),
            auth: AuthConfig::from_config(config),
        }
    }

    /// Every state file under `dir`. Used for development and tests.
    #[must_use]
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            paths: PathsConfig::rooted_at(dir),
            auth: AuthConfig::builder().rooted_at(dir).build(),
            ..Self::default()
        }
    }
}

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct GatewayState {
    /// Authentication state.
    pub auth: Arc<AuthState>,
    /// State file locations.
    pub paths: Arc<PathsConfig>,
    /// Node service ports and RPC credentials.
    pub services: Arc<ServicesConfig>,
    /// Limiter for password routes.
    pub limiter: Arc<GatewayRateLimiter>,
}

impl FromRef<GatewayState> for Arc<AuthState> {
    fn from_ref(state: &GatewayState) -> Self {
        Arc::clone(&state.auth)
    }
}

/// Builder for constructing a Gateway with its dependencies.
#[derive(Debug, Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if auth initialization fails. A missing or unusable
    /// signing key is fatal here.
    pub async fn build(self) -> Result<Gateway, GatewayError> {
        let auth = Arc::new(AuthState::initialize(self.config.auth.clone()).await?);

        if let Err(e) = setup::register_from_env(&auth).await {
            tracing::warn!("Auto-setup from env failed: {}", e);
        }

        let state = GatewayState {
            auth,
            paths: Arc::new(self.config.paths.clone()),
            services: Arc::new(self.config.services.clone()),
            limiter: Arc::new(GatewayRateLimiter::new(self.config.rate_limit_per_minute)),
        };

        Ok(Gateway {
            config: self.config,
            state,
        })
    }
}

/// Gateway server.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    state: GatewayState,
}

impl Gateway {
    /// Create a gateway with default dependencies.
    ///
    /// # Errors
    ///
    /// Returns error if auth initialization fails.
    pub async fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        GatewayBuilder::new().with_config(config).build().await
    }

    /// Shared handler state.
    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    /// The full application router.
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone(), &self.config)
    }

    /// Run the gateway server until interrupted.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Gateway API listening on http://{}", addr);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::Server(e.to_string()))?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Build the router over `state`.
pub fn router(state: GatewayState, config: &GatewayConfig) -> Router {
    let limited = middleware::from_fn_with_state(Arc::clone(&state.limiter), rate_limit);

    // Routes that take a password accept it in the JSON body too.
    let password_routes = Router::new()
        .route("/v1/account/register", post(account::register))
        .route("/v1/account/login", post(account::login))
        .route_layer(middleware::from_fn(basic_auth_from_body))
        .route_layer(limited.clone());

    let app = Router::new()
        .route("/ping", get(routes::ping))
        .route("/v1/account/registered", get(account::registered))
        .route("/v1/account/refresh", post(account::refresh))
        .route("/v1/account/info", get(account::info))
        .route(
            "/v1/account/change-password",
            post(account::change_password).route_layer(limited),
        )
        .route("/v1/system/info", get(system::info))
        .route(
            "/v1/system/dashboard-hidden-service",
            get(system::dashboard_hidden_service),
        )
        .route("/v1/system/status", get(system::status))
        .route("/v1/system/memory-warning", delete(system::clear_memory_warning))
        .route(
            "/v1/system/electrum-connection-details",
            get(system::electrum_connection_details),
        )
        .route(
            "/v1/system/bitcoin-p2p-connection-details",
            get(system::bitcoin_p2p_connection_details),
        )
        .route(
            "/v1/system/bitcoin-rpc-connection-details",
            get(system::bitcoin_rpc_connection_details),
        )
        .route("/v1/system/update", post(system::start_update))
        .route("/v1/system/update-status", get(system::update_status))
        .route("/v1/system/backup-status", get(system::backup_status))
        .route("/v1/system/debug", post(system::request_debug))
        .route("/v1/system/debug-result", get(system::debug_result))
        .route("/v1/system/reboot", post(system::reboot))
        .route("/v1/system/shutdown", post(system::shutdown))
        .route("/v1/apps", get(apps::list))
        .route("/v1/apps/{id}/install", post(apps::install))
        .route("/v1/apps/{id}/uninstall", post(apps::uninstall))
        .merge(password_routes)
        .layer(TimeoutLayer::new(config.timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 3006);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_builder() {
        let dir = TempDir::new().unwrap();
        let gateway = GatewayBuilder::new()
            .with_config(GatewayConfig::rooted_at(dir.path()))
            .build()
            .await
            .unwrap();

        assert!(!gateway.state().auth.identity.state().is_registered());
        assert!(dir.path().join("db/jwt-private-key/jwt.key").exists());
    }
}
