//! Command Line and Logging
//!
//! Parses the daemon's command line and sets up `tracing` output.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// ADB pairing daemon command-line interface
#[derive(Parser, Debug)]
#[command(name = "adb-pairing-daemon")]
#[command(about = "Pair this device with its own ADB wireless debugging service", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable JSON structured logging
    #[arg(long)]
    pub json_logs: bool,

    /// Show timestamps in logs
    #[arg(long, default_value = "true")]
    pub timestamps: bool,

    /// Subcommand; without one the daemon watches for the pairing service
    /// and reads pairing codes from standard input
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch for pairing services and print presence changes
    Discover {
        /// Stop after this many seconds (0 = until interrupted)
        #[arg(short, long, default_value = "0")]
        timeout: u64,
    },

    /// Pair with a pairing service
    Pair {
        /// Host of the pairing service
        #[arg(long, default_value = adb_pairing_protocol::pairing::endpoint::LOCAL_HOST)]
        host: String,

        /// Port of the pairing service
        #[arg(short, long)]
        port: u16,

        /// Six digit pairing code
        #[arg(short, long)]
        code: String,
    },

    /// Inspect or replace the pairing identity
    Identity {
        #[command(subcommand)]
        action: IdentityCommand,
    },

    /// Show current configuration
    DumpConfig,
}

#[derive(Subcommand, Debug)]
pub enum IdentityCommand {
    /// Show the identity fingerprint, creating the identity if needed
    Show,

    /// Replace the identity; every earlier pairing stops working
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

/// Initialize logging based on CLI configuration
pub fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli.log_level.parse::<Level>().with_context(|| {
        format!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            cli.log_level
        )
    })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.as_str()))
        .context("Failed to create log filter")?;

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match (cli.json_logs, cli.timestamps) {
        (true, true) => subscriber.json().init(),
        (true, false) => subscriber.without_time().json().init(),
        (false, true) => subscriber.init(),
        (false, false) => subscriber.without_time().init(),
    }

    info!(
        "Logging initialized: level={}, json={}, timestamps={}",
        log_level, cli.json_logs, cli.timestamps
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["adb-pairing-daemon"]).unwrap();
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
        assert!(cli.timestamps);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_pair_defaults_to_local_host() {
        let cli = Cli::try_parse_from([
            "adb-pairing-daemon",
            "pair",
            "--port",
            "37123",
            "--code",
            "123456",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Pair { host, port, code }) => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, 37123);
                assert_eq!(code, "123456");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_identity_reset_flag() {
        let cli =
            Cli::try_parse_from(["adb-pairing-daemon", "identity", "reset", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Identity {
                action: IdentityCommand::Reset { yes: true }
            })
        ));
    }

    #[test]
    fn test_pair_requires_port() {
        assert!(Cli::try_parse_from(["adb-pairing-daemon", "pair", "--code", "123456"]).is_err());
    }
}
