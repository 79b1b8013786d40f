//! CLI definitions for chatwatch.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// chatwatch CLI.
#[derive(Parser)]
#[command(name = "chatwatch")]
#[command(about = "Watch a chat page and answer messages that mention a trigger")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (.toml or .json)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "CHATWATCH_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the HTTP control server (default)
    Serve {
        /// Listen address, overriding [server] bind
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Run the control server and start monitoring once it answers
    Run {
        /// Listen address, overriding [server] bind
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Seconds to wait before starting, overriding [server] start_delay_secs
        #[arg(long)]
        start_delay_secs: Option<u64>,
    },

    /// Monitor in the foreground until Ctrl-C
    Watch {
        /// Start right away instead of waiting for Enter after login
        #[arg(long)]
        no_wait: bool,
    },

    /// Send a command to a running control server
    Ctl {
        #[command(subcommand)]
        action: CtlAction,

        /// Control server base URL
        #[arg(long, default_value = "http://127.0.0.1:5000")]
        url: String,
    },

    /// Validate the configuration file
    Check {
        /// Report whether this message text would get a reply
        #[arg(long)]
        sample: Option<String>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub(crate) enum CtlAction {
    /// Start monitoring
    Start,
    /// Stop monitoring
    Stop,
    /// Show monitor status
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_no_subcommand() {
        let cli = Cli::try_parse_from(["chatwatch"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "chatwatch",
            "run",
            "--bind",
            "0.0.0.0:9000",
            "--start-delay-secs",
            "5",
            "--config",
            "bot.json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("bot.json"));
        match cli.command {
            Some(Commands::Run {
                bind,
                start_delay_secs,
            }) => {
                assert_eq!(bind.unwrap().port(), 9000);
                assert_eq!(start_delay_secs, Some(5));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_ctl_subcommand() {
        let cli = Cli::try_parse_from(["chatwatch", "ctl", "status"]).unwrap();
        match cli.command {
            Some(Commands::Ctl { action, url }) => {
                assert!(matches!(action, CtlAction::Status));
                assert_eq!(url, "http://127.0.0.1:5000");
            }
            _ => panic!("expected ctl"),
        }
    }
}
