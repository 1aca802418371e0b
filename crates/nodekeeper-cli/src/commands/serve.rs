//! Serve command - run the gateway in the foreground.

use anyhow::Result;
use nodekeeper_core::Config;
use nodekeeper_core::config::BindMode;
use nodekeeper_gateway::GatewayConfig;

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
    /// Start even if the port looks taken.
    pub force: bool,
}

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if the gateway cannot initialize or bind.
pub async fn run_serve(config: &Config, args: ServeArgs) -> Result<()> {
    let gateway_config = gateway_config(config, &args);
    let address = format!("{}:{}", gateway_config.bind_address, gateway_config.port);

    if !args.force && std::net::TcpListener::bind(&address).is_err() {
        ui::error(&format!(
            "Port {} is already in use. Use --force to override.",
            gateway_config.port
        ));
        return Ok(());
    }

    ui::header("Starting NodeKeeper Gateway");
    ui::kv("Address", &address);
    ui::kv(
        "Mode",
        match &config.gateway.mode {
            BindMode::Local => "local",
            BindMode::Public => "public",
            BindMode::Custom(_) => "custom",
        },
    );
    ui::kv("Identity", &gateway_config.auth.user_file.display().to_string());
    if !gateway_config.auth.enabled {
        ui::warning("Authentication is disabled");
    }
    println!();
    ui::info("Press Ctrl+C to stop");

    nodekeeper_gateway::start(gateway_config).await?;

    Ok(())
}

fn gateway_config(config: &Config, args: &ServeArgs) -> GatewayConfig {
    let mut gateway_config = GatewayConfig::from_config(config);
    if let Some(port) = args.port {
        gateway_config.port = port;
    }
    if let Some(bind) = &args.bind {
        gateway_config.bind_address = match bind.as_str() {
            "loopback" | "local" => "127.0.0.1".to_string(),
            "lan" | "public" => "0.0.0.0".to_string(),
            addr => addr.to_string(),
        };
    }
    gateway_config
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overrides() {
        let config = Config::default();

        let plain = gateway_config(&config, &ServeArgs::default());
        assert_eq!(plain.port, 3006);
        assert_eq!(plain.bind_address, "127.0.0.1");

        let args = ServeArgs {
            port: Some(8080),
            bind: Some("lan".into()),
            force: false,
        };
        let overridden = gateway_config(&config, &args);
        assert_eq!(overridden.port, 8080);
        assert_eq!(overridden.bind_address, "0.0.0.0");

        let args = ServeArgs {
            bind: Some("10.0.0.5".into()),
            ..ServeArgs::default()
        };
        assert_eq!(gateway_config(&config, &args).bind_address, "10.0.0.5");
    }
}
