// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mishkat - chat escalation and routing core for a hadith reading app.
//!
//! This is the binary entry point: an interactive user shell, an operator
//! queue view, and config inspection.

mod queue;
mod shell;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use mishkat_config::MishkatConfig;
use mishkat_core::MishkatError;

use crate::queue::QueueAction;

/// Mishkat - chat escalation and routing core.
#[derive(Parser, Debug)]
#[command(name = "mishkat", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat with the support assistant as one user.
    Shell {
        /// User id to sign in as.
        #[arg(long, default_value = "guest")]
        user: String,
        /// Display name (defaults to the user id).
        #[arg(long)]
        name: Option<String>,
    },
    /// Operator view of the support queue.
    Queue {
        #[command(subcommand)]
        action: Option<QueueAction>,
    },
    /// Validate and print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => mishkat_config::load_and_validate_path(path),
        None => mishkat_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            mishkat_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.service.log_level);

    let result = match cli.command {
        Some(Commands::Shell { user, name }) => shell::run_shell(config, user, name).await,
        Some(Commands::Queue { action }) => {
            queue::run_queue(config, action.unwrap_or(QueueAction::List { json: false })).await
        }
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("mishkat: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

fn print_config(config: &MishkatConfig) -> Result<(), MishkatError> {
    let rendered =
        toml::to_string_pretty(config).map_err(|e| MishkatError::Config(e.to_string()))?;
    println!("{}", "# effective configuration".dimmed());
    print!("{rendered}");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mishkat={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn shell_flags_parse() {
        let cli = Cli::try_parse_from(["mishkat", "shell", "--user", "amina", "--name", "Amina"])
            .unwrap();
        match cli.command {
            Some(Commands::Shell { user, name }) => {
                assert_eq!(user, "amina");
                assert_eq!(name.as_deref(), Some("Amina"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn queue_defaults_to_listing() {
        let cli = Cli::try_parse_from(["mishkat", "queue"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Queue { action: None })));
    }

    #[test]
    fn default_config_renders_as_toml() {
        let config = mishkat_config::load_and_validate_str("").unwrap();
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("[generator]"));
        assert!(rendered.contains("timeout_ms = 8000"));
    }
}
