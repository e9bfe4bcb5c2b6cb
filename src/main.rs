//! wikistash daemon
//!
//! Serves Wikipedia lookups through the tiered cache over a Unix socket, or
//! answers a single lookup from the command line.

use anyhow::{anyhow, Result};
use std::env;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wikistash::config::Config;
use wikistash::ipc::IpcServer;
use wikistash::Stash;

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run IPC server mode (default)
    Server,
    /// Cache-aside lookup through every tier
    Lookup { key: String },
    /// Durable-only lookup
    Store { key: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"wikistash - Tiered cache for Wikipedia lookups

USAGE:
    wikistash                    # Run IPC server (default)
    wikistash lookup <key>
    wikistash store <key>
    wikistash help

COMMANDS:
    (none)  Run IPC server mode (newline-delimited JSON on a Unix socket)
    lookup  Look a page up: memory, then durable store, then Wikipedia
    store   Look a page up in the durable store, then Wikipedia
    help    Show this help message

EXAMPLES:
    wikistash lookup "Go (programming language)"
    WIKISTASH_DURABLE=b2 B2_KEY_ID=004xxx B2_KEY=K004xxx wikistash

ENVIRONMENT:
    WIKISTASH_DURABLE            disk (default) or b2
    WIKISTASH_CACHE_DIR          Directory for the disk store
    B2_KEY_ID, B2_KEY, B2_BUCKET B2 credentials and bucket
    WIKISTASH_VOLATILE_TTL_SECS  In-memory entry lifetime (default 3600)
    WIKISTASH_ORIGIN_URL         MediaWiki API endpoint
    WIKISTASH_SOCKET             IPC socket path (default /tmp/wikistash.sock)
    RUST_LOG                     Log filter, e.g. info or wikistash=debug

    Variables may also be set in a .env file in the working directory.
"#
    );
}

fn parse_args(args: &[String]) -> Result<Command> {
    if args.len() < 2 {
        return Ok(Command::Server);
    }

    let key = || {
        if args.len() < 3 {
            return Err(anyhow!("Usage: wikistash {} <key>", args[1]));
        }
        Ok(args[2..].join(" "))
    };

    match args[1].as_str() {
        "lookup" => Ok(Command::Lookup { key: key()? }),
        "store" => Ok(Command::Store { key: key()? }),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry RUST_LOG, so load it before the subscriber
    dotenv::dotenv().ok();

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = env::args().collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };

    match command {
        Command::Server => {
            let stash = Stash::from_config(&config).await?;
            info!("Starting wikistash in IPC server mode");

            let mut ipc_server = IpcServer::new(stash, config.socket_path.clone());
            if let Err(e) = ipc_server.start().await {
                error!(error = %e, "Failed to start IPC server");
                return Err(e);
            }

            info!("Daemon ready. Waiting for lookups...");

            tokio::select! {
                result = ipc_server.run() => {
                    if let Err(e) = result {
                        error!(error = %e, "IPC server error");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                }
            }

            ipc_server.stop()?;
            info!("Shutdown complete.");
        }
        Command::Lookup { key } => one_shot(&config, &key, false).await?,
        Command::Store { key } => one_shot(&config, &key, true).await?,
        Command::Help => {}
    }

    Ok(())
}

/// Answer one lookup, then wait for its write-backs before exiting
async fn one_shot(config: &Config, key: &str, durable_only: bool) -> Result<()> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let stash = Stash::from_config_with_events(config, tx).await?;

    let entry = if durable_only {
        stash.cache.lookup_and_store(key).await?
    } else {
        stash.cache.lookup(key).await?
    };
    println!("{}", serde_json::to_string_pretty(&entry)?);

    drop(stash);
    while let Some(event) = events.recv().await {
        if event.result.is_ok() {
            info!(tier = %event.tier, key = %event.key, "Write-back complete");
        }
    }
    Ok(())
}
