//! Config command - inspect the resolved configuration.

use std::path::Path;

use anyhow::Result;
use nodekeeper_core::Config;

use crate::ui;

/// Config actions.
#[derive(Debug, Clone, Copy, Default)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON.
    #[default]
    Show,
    /// Check the configuration and the paths it names.
    Validate,
}

/// Run the config command.
///
/// # Errors
///
/// Returns error if the configuration cannot be serialized.
pub fn run_config(config: &Config, source: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
            Ok(())
        }
        ConfigAction::Validate => {
            ui::header("Configuration");
            ui::kv("File", &source.display().to_string());
            ui::success("Configuration is valid");

            let warnings = path_warnings(config);
            for warning in &warnings {
                ui::warning(warning);
            }
            if warnings.is_empty() {
                ui::success("All state directories exist");
            }
            Ok(())
        }
    }
}

/// Directories the gateway expects to write into but that do not exist yet.
fn path_warnings(config: &Config) -> Vec<String> {
    let paths = &config.paths;
    let dirs = [
        ("user file", paths.user_file.parent()),
        ("private key", paths.jwt_private_key_file.parent()),
        ("public key", paths.jwt_public_key_file.parent()),
        ("signal", Some(paths.signal_dir.as_path())),
        ("status", Some(paths.status_dir.as_path())),
    ];

    dirs.into_iter()
        .filter_map(|(label, dir)| {
            let dir = dir?;
            (!dir.as_os_str().is_empty() && !dir.is_dir())
                .then(|| format!("{label} directory {} does not exist", dir.display()))
        })
        .collect()
}
