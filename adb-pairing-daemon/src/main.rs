mod config;
mod diagnostics;

use adb_pairing_protocol::identity::FileKeyValueStore;
use adb_pairing_protocol::{
    PairingEndpoint, PairingKeyStore, PairingOrchestrator, PairingOutcome, ServiceDiscovery,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use diagnostics::{Cli, Command, IdentityCommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use config::Config;

/// Main daemon state
struct Daemon {
    config: Config,
    orchestrator: PairingOrchestrator,
}

impl Daemon {
    fn new(config: Config) -> Result<Self> {
        config
            .ensure_directories()
            .context("Failed to create daemon directories")?;

        let store = Arc::new(FileKeyValueStore::new(config.identity_store_dir()));
        let key_store = Arc::new(PairingKeyStore::new(store, config.device.name.clone()));
        let discovery = ServiceDiscovery::mdns(config.discovery_config());
        let orchestrator =
            PairingOrchestrator::new(key_store, discovery, config.pairing_config());

        Ok(Self {
            config,
            orchestrator,
        })
    }

    /// Run one pairing attempt and print the authorized peer
    async fn pair(&self, endpoint: PairingEndpoint, code: &str) -> Result<()> {
        let outcome = tokio::select! {
            outcome = self.orchestrator.submit_code(endpoint, code) => outcome,
            _ = tokio::signal::ctrl_c() => {
                self.orchestrator.stop().await;
                bail!("Pairing interrupted");
            }
        };

        match outcome {
            PairingOutcome::Success(record) => {
                println!(
                    "Paired with {} at {}",
                    record.peer_name, record.endpoint_identity
                );
                println!(
                    "{}",
                    serde_json::to_string_pretty(&record)
                        .context("Failed to serialize peer record")?
                );
                Ok(())
            }
            PairingOutcome::Failed(e) => Err(anyhow!(e.user_message())
                .context(format!("Pairing failed ({})", e.reason()))),
        }
    }

    /// Print presence changes until interrupted or `timeout` elapses
    async fn discover(&self, timeout: Option<Duration>) -> Result<()> {
        let mut presence = self.orchestrator.start_discovery().await;
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                event = presence.recv() => match event {
                    Some(event) if event.present => println!("+ {}", event.endpoint),
                    Some(event) => println!("- {}", event.endpoint),
                    None => break,
                },
                _ = &mut deadline => break,
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        self.orchestrator.stop_discovery().await;
        Ok(())
    }

    /// Watch for the pairing service and pair with codes typed on stdin
    ///
    /// A line holds either a code (for the last service seen) or a port or
    /// `host:port` followed by a code.
    async fn run(&self) -> Result<()> {
        let mut presence = self.orchestrator.start_discovery().await;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut last_seen: Option<PairingEndpoint> = None;

        println!("Open \"Pair device with pairing code\" in Wireless debugging, then type the code.");

        loop {
            tokio::select! {
                event = presence.recv() => match event {
                    Some(event) if event.present => {
                        println!("Pairing service found at {}", event.endpoint);
                        last_seen = Some(event.endpoint);
                    }
                    Some(event) => {
                        println!("Pairing service at {} went away", event.endpoint);
                        if last_seen.as_ref() == Some(&event.endpoint) {
                            last_seen = None;
                        }
                    }
                    None => {
                        debug!("Presence stream closed");
                        presence = self.orchestrator.start_discovery().await;
                    }
                },
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read standard input")? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    let (endpoint, code) = match parse_request(&line, last_seen.as_ref()) {
                        Ok(request) => request,
                        Err(e) => {
                            eprintln!("{}", e);
                            continue;
                        }
                    };

                    match self.pair(endpoint, &code).await {
                        Ok(()) => break,
                        Err(e) => eprintln!("{:#}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        self.orchestrator.stop().await;
        Ok(())
    }

    fn show_identity(&self) -> Result<()> {
        let identity = self
            .orchestrator
            .key_store()
            .get()
            .map_err(|e| anyhow!(e.user_message()))?;

        println!("Name: {}", identity.device_name());
        println!("Fingerprint: {}", identity.fingerprint());
        println!("Store: {:?}", self.config.identity_store_dir());
        Ok(())
    }

    fn reset_identity(&self) -> Result<()> {
        let identity = self
            .orchestrator
            .key_store()
            .reset()
            .map_err(|e| anyhow!(e.user_message()))?;

        println!("New fingerprint: {}", identity.fingerprint());
        println!("Earlier pairings no longer work; pair again.");
        Ok(())
    }
}

/// Split an input line into an endpoint and a code
fn parse_request(
    line: &str,
    last_seen: Option<&PairingEndpoint>,
) -> std::result::Result<(PairingEndpoint, String), String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [code] => match last_seen {
            Some(endpoint) => Ok((endpoint.clone(), code.to_string())),
            None => Err("No pairing service seen yet; type '<port> <code>'".to_string()),
        },
        [target, code] => {
            let endpoint = if let Ok(port) = target.parse::<u16>() {
                PairingEndpoint::local(port)
            } else if let Ok(addr) = target.parse::<SocketAddr>() {
                PairingEndpoint::from(addr)
            } else {
                return Err(format!("Not a port or host:port: {}", target));
            };
            Ok((endpoint, code.to_string()))
        }
        _ => Err("Expected '<code>' or '<port> <code>'".to_string()),
    }
}

fn dump_config(config: &Config) {
    println!("\n=== Daemon Configuration ===");
    println!("\n[Device]");
    println!("Name: {}", config.device.name);

    println!("\n[Pairing]");
    println!("Connect timeout: {} seconds", config.pairing.connect_timeout_secs);
    println!("I/O timeout: {} seconds", config.pairing.io_timeout_secs);
    println!(
        "Stop discovery on success: {}",
        config.pairing.stop_discovery_on_success
    );

    println!("\n[Discovery]");
    println!("Service type: {}", config.discovery.service_type);

    println!("\n[Paths]");
    println!("Config file: {:?}", config.config_path());
    println!("Identity store: {:?}", config.identity_store_dir());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    diagnostics::init_logging(&cli).context("Failed to initialize logging")?;

    let config = Config::load().context("Failed to load configuration")?;
    debug!("Configuration loaded from {:?}", config.config_path());

    if let Some(Command::DumpConfig) = &cli.command {
        dump_config(&config);
        return Ok(());
    }

    let daemon = Daemon::new(config).context("Failed to create daemon")?;

    match cli.command {
        None => daemon.run().await,
        Some(Command::Discover { timeout }) => {
            let limit = (timeout > 0).then(|| Duration::from_secs(timeout));
            daemon.discover(limit).await
        }
        Some(Command::Pair { host, port, code }) => {
            daemon.pair(PairingEndpoint::new(host, port), &code).await
        }
        Some(Command::Identity { action }) => match action {
            IdentityCommand::Show => daemon.show_identity(),
            IdentityCommand::Reset { yes: false } => {
                warn!("Identity reset needs --yes");
                bail!("Resetting the identity revokes every pairing; rerun with --yes")
            }
            IdentityCommand::Reset { yes: true } => daemon.reset_identity(),
        },
        Some(Command::DumpConfig) => Ok(()),
    }
}
