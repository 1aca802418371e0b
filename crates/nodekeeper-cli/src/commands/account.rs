//! Account command - inspect or claim the device identity offline.

use anyhow::{Context, Result};
use nodekeeper_core::Config;
use nodekeeper_gateway::AuthConfig;
use nodekeeper_gateway::auth::{IdentityAuthority, IdentityRecord, open_store, setup};
use secrecy::SecretString;

use crate::ui;

/// Account actions.
#[derive(Debug, Clone)]
pub enum AccountAction {
    /// Show whether the device has been claimed.
    Status,
    /// Create the identity record.
    Register {
        /// Password, prompted for if absent.
        password: Option<String>,
        /// Display name.
        name: Option<String>,
    },
}

/// Run the account command.
///
/// # Errors
///
/// Returns error if the credential store cannot be read or written.
pub async fn run_account(config: &Config, action: AccountAction) -> Result<()> {
    let auth = AuthConfig::from_config(config);
    match action {
        AccountAction::Status => {
            let store = open_store(&auth)?;
            let record = store
                .read()
                .await
                .with_context(|| format!("Failed to read {}", store.location()))?;
            print_status(&store.location(), record.as_ref());
            Ok(())
        }
        AccountAction::Register { password, name } => {
            let password = match password {
                Some(p) => p,
                None => ui::prompts::new_password("Password")?,
            };
            let name = match name {
                Some(n) => Some(n),
                None if console::user_attended() => ui::prompts::input_optional("Display name")?,
                None => None,
            };

            if register(&auth, SecretString::from(password), name).await? {
                ui::success("Device registered");
            } else {
                ui::warning("A user is already registered. Nothing changed.");
            }
            Ok(())
        }
    }
}

/// Register with `password` unless a record exists.
///
/// Signing keys are not created here; the gateway does that on start.
/// Returns `false` when the device was already claimed.
///
/// # Errors
///
/// Returns error for a rejected password or a storage failure.
pub async fn register(
    auth: &AuthConfig,
    password: SecretString,
    name: Option<String>,
) -> Result<bool> {
    let identity = IdentityAuthority::load(open_store(auth)?).await?;
    Ok(
        setup::register_with_password(&identity, auth.min_password_length, password, name)
            .await?,
    )
}

fn print_status(location: &str, record: Option<&IdentityRecord>) {
    ui::header("Account");
    ui::kv("Store", location);
    match record {
        Some(record) => {
            ui::kv("Registered", "yes");
            ui::kv("Username", &record.username);
            if let Some(name) = &record.name {
                ui::kv("Name", name);
            }
            if let Some(created) = record.created_at {
                ui::kv("Created", &created.format("%Y-%m-%d %H:%M:%S").to_string());
            }
        }
        None => {
            ui::kv("Registered", "no");
            ui::info("Claim the device with: nodekeeper account register");
        }
    }
}
