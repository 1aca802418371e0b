//! Keys command - manage the token signing keypair.

use anyhow::{Context, Result, bail};
use nodekeeper_core::Config;
use nodekeeper_gateway::{AuthConfig, KeyStore};

use crate::ui;

/// Keys actions.
#[derive(Debug, Clone)]
pub enum KeysAction {
    /// Replace the keypair.
    Rotate {
        /// Skip the confirmation prompt.
        yes: bool,
    },
    /// Print the verification key.
    Public,
}

/// Run the keys command.
///
/// # Errors
///
/// Returns error if the keys cannot be read or written.
pub async fn run_keys(config: &Config, action: KeysAction) -> Result<()> {
    let auth = AuthConfig::from_config(config);
    match action {
        KeysAction::Rotate { yes } => rotate(&auth, yes).await,
        KeysAction::Public => {
            print!("{}", read_public_key(&auth).await?);
            Ok(())
        }
    }
}

/// Read the verification key from disk without creating one.
///
/// # Errors
///
/// Returns error if the PEM file is missing or unreadable.
pub async fn read_public_key(auth: &AuthConfig) -> Result<String> {
    let path = &auth.public_key_file;
    match tokio::fs::read_to_string(path).await {
        Ok(pem) => Ok(pem),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            ui::warning(&format!("No public key at {}", path.display()));
            ui::info("Start the gateway or run: nodekeeper keys rotate");
            bail!("public key not found: {}", path.display())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

async fn rotate(auth: &AuthConfig, yes: bool) -> Result<()> {
    ui::header("Rotate Signing Key");
    ui::kv("Private key", &auth.private_key_file.display().to_string());
    ui::kv("Public key", &auth.public_key_file.display().to_string());
    ui::warning("Every issued session token stops working. All clients must log in again.");

    if !yes && !ui::prompts::confirm("Rotate the signing key?")? {
        ui::info("Rotation cancelled");
        return Ok(());
    }

    let pb = ui::spinner(&format!("Generating {}-bit RSA key...", auth.rsa_key_bits));
    let result = rotate_offline(auth).await;
    pb.finish_and_clear();
    result?;

    ui::success("Signing key rotated");
    ui::info("Restart the gateway to load the new key");
    Ok(())
}

/// Replace the keypair on disk. Opening with regeneration set swaps the
/// pair in one step.
///
/// # Errors
///
/// Returns error if the new pair cannot be generated or written.
pub async fn rotate_offline(auth: &AuthConfig) -> Result<KeyStore> {
    let mut auth = auth.clone();
    auth.regenerate_keys_on_start = true;
    let keys = KeyStore::open(&auth).await?;
    tracing::info!(path = %auth.private_key_file.display(), "Signing key rotated");
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_public_key_does_not_create() {
        let dir = TempDir::new().unwrap();
        let auth = AuthConfig::builder().rooted_at(dir.path()).build();

        assert!(read_public_key(&auth).await.is_err());
        assert!(!auth.public_key_file.exists());
        assert!(!auth.private_key_file.exists());

        let keys = KeyStore::open(&auth).await.unwrap();
        let pem = read_public_key(&auth).await.unwrap();
        assert_eq!(pem, keys.load_public_key().await);
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[tokio::test]
    async fn test_rotate_offline_invalidates_tokens() {
        let dir = TempDir::new().unwrap();
        let auth = AuthConfig::builder().rooted_at(dir.path()).build();

        let before = KeyStore::open(&auth).await.unwrap();
        let token = before.issue_token().await.unwrap();
        let old_public = before.load_public_key().await;

        let after = rotate_offline(&auth).await.unwrap();
        assert!(after.verify(&token).await.is_err());

        let reopened = KeyStore::open(&auth).await.unwrap();
        assert_ne!(reopened.load_public_key().await, old_public);
        assert!(reopened.verify(&token).await.is_err());
    }
}
