//! `NodeKeeper` CLI - run and administer the appliance gateway.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nodekeeper_core::Config;
use nodekeeper_core::config::LogFormat;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::account::AccountAction;
use commands::config::ConfigAction;
use commands::keys::KeysAction;

#[derive(Parser)]
#[command(name = "nodekeeper")]
#[command(about = "NodeKeeper - node appliance control plane")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.nodekeeper/nodekeeper.json)
    #[arg(short, long, global = true, env = "NODEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (loopback, lan, or IP)
        #[arg(long)]
        bind: Option<String>,

        /// Start even if the port is in use
        #[arg(long)]
        force: bool,
    },

    /// Signing key management
    Keys {
        #[command(subcommand)]
        action: KeysCommands,
    },

    /// Device identity
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },

    /// Show or validate configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },

    /// Check whether the gateway is running
    Status {
        /// Gateway base URL
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(Subcommand)]
enum KeysCommands {
    /// Replace the signing keypair, logging out every client
    Rotate {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the public verification key
    Public,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Show whether the device is registered
    Status,

    /// Register the device owner
    Register {
        /// Password (prompted if omitted)
        #[arg(long, env = "NODEKEEPER_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show full configuration
    Show,

    /// Validate configuration
    Validate,
}

fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = commands::load_config(cli.config.as_deref());
    let format = loaded
        .as_ref()
        .map_or(LogFormat::Pretty, |c| c.settings.log_format);
    init_logging(cli.verbose || loaded.as_ref().is_ok_and(|c| c.settings.debug), format);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            return Err(e);
        }
    };

    let Some(command) = cli.command else {
        return commands::run_status(&config, commands::status::StatusArgs::default()).await;
    };

    match command {
        Commands::Serve { port, bind, force } => {
            let args = commands::serve::ServeArgs { port, bind, force };
            commands::run_serve(&config, args).await?;
        }

        Commands::Keys { action } => {
            let action = match action {
                KeysCommands::Rotate { yes } => KeysAction::Rotate { yes },
                KeysCommands::Public => KeysAction::Public,
            };
            commands::run_keys(&config, action).await?;
        }

        Commands::Account { action } => {
            let action = match action {
                AccountCommands::Status => AccountAction::Status,
                AccountCommands::Register { password, name } => {
                    AccountAction::Register { password, name }
                }
            };
            commands::run_account(&config, action).await?;
        }

        Commands::Config { action } => {
            let action = match action {
                Some(ConfigCommands::Validate) => ConfigAction::Validate,
                Some(ConfigCommands::Show) | None => ConfigAction::Show,
            };
            let source = cli.config.unwrap_or_else(Config::default_path);
            commands::run_config(&config, &source, action)?;
        }

        Commands::Status { url } => {
            commands::run_status(&config, commands::status::StatusArgs { url }).await?;
        }
    }

    Ok(())
}
