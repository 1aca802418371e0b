//! Status command - check on a running gateway.

use std::time::Duration;

use anyhow::Result;
use nodekeeper_core::Config;
use serde_json::Value;

use crate::ui;

/// Status command arguments.
#[derive(Debug, Clone, Default)]
pub struct StatusArgs {
    /// Base URL override, e.g. `http://node.local:3006`.
    pub url: Option<String>,
}

/// Call the gateway's `/ping` endpoint.
///
/// # Errors
///
/// Only client construction errors are returned; an unreachable gateway is
/// reported, not an error.
pub async fn run_status(config: &Config, args: StatusArgs) -> Result<()> {
    let base = args.url.unwrap_or_else(|| base_url(config));
    let url = format!("{}/ping", base.trim_end_matches('/'));

    ui::header("Gateway Status");
    ui::kv("URL", &base);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            ui::success("Gateway is running");
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(version) = body.get("version").and_then(Value::as_str) {
                    ui::kv("Version", version);
                }
            }
        }
        Ok(resp) => {
            ui::warning(&format!("Gateway answered with {}", resp.status()));
        }
        Err(e) => {
            tracing::debug!(error = %e, "Ping failed");
            ui::warning("Gateway is not reachable");
            ui::info("Start with: nodekeeper serve");
        }
    }

    Ok(())
}

/// Where a local client reaches the configured gateway.
fn base_url(config: &Config) -> String {
    let host = match config.bind_address().as_str() {
        "0.0.0.0" => "127.0.0.1".to_string(),
        addr => addr.to_string(),
    };
    format!("http://{host}:{}", config.gateway.port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodekeeper_core::config::BindMode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base_url() {
        let mut config = Config::default();
        assert_eq!(base_url(&config), "http://127.0.0.1:3006");

        config.gateway.mode = BindMode::Public;
        config.gateway.port = 80;
        assert_eq!(base_url(&config), "http://127.0.0.1:80");

        config.gateway.mode = BindMode::Custom("10.0.0.5".into());
        assert_eq!(base_url(&config), "http://10.0.0.5:80");
    }
}
