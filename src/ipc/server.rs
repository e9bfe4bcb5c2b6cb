//! IPC Server - Unix socket server for lookup clients
//!
//! Accepts connections and answers each newline-delimited command through
//! the shared tiered cache. Every connection runs in its own task.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use crate::ipc::protocol::{parse_command, serialize_response, Command, Response, PROTOCOL_VERSION};
use crate::stash::Stash;

/// Shared state handed to every connection
struct Shared {
    stash: Stash,
    connection_count: AtomicU32,
}

/// IPC Server that listens for lookup commands
pub struct IpcServer {
    shared: Arc<Shared>,
    socket_path: PathBuf,
    /// Socket listener
    listener: Option<UnixListener>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(stash: Stash, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                stash,
                connection_count: AtomicU32::new(0),
            }),
            socket_path: socket_path.into(),
            listener: None,
        }
    }

    /// Bind the socket, replacing a stale socket file if one exists
    pub async fn start(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove existing socket file")?;
        }

        let listener = UnixListener::bind(&self.socket_path).context("Failed to bind Unix socket")?;

        info!(socket_path = %self.socket_path.display(), "IPC server started");

        self.listener = Some(listener);
        Ok(())
    }

    /// Run the server loop, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let shared = Arc::clone(&self.shared);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, shared).await {
                            error!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Stop the IPC server and clean up
    pub fn stop(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).context("Failed to remove socket file")?;
        }
        self.shared.stash.volatile.log_metrics();
        info!("IPC server stopped");
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Handle a single client connection
async fn handle_connection(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
    let count = shared.connection_count.fetch_add(1, Ordering::Relaxed) + 1;
    debug!(count = count, "New connection");

    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Connection closed by client");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                debug!(command = %trimmed, "Received command");

                let response = match parse_command(trimmed.as_bytes()) {
                    Ok(command) => process_command(command, &shared).await,
                    Err(e) => {
                        error!(error = %e, command = %trimmed, "Failed to parse command");
                        Response::Error {
                            kind: "badCommand".to_string(),
                            error: format!("Invalid command: {}", e),
                        }
                    }
                };

                match serialize_response(&response) {
                    Ok(json) => {
                        if let Err(e) = writer.write_all(&json).await {
                            error!(error = %e, "Failed to write response");
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to serialize response");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from socket");
                break;
            }
        }
    }

    let remaining = shared
        .connection_count
        .fetch_sub(1, Ordering::Relaxed)
        .saturating_sub(1);
    debug!(count = remaining, "Connection ended");

    Ok(())
}

/// Process a command and return a response
async fn process_command(command: Command, shared: &Shared) -> Response {
    let stash = &shared.stash;
    match command {
        Command::Lookup { key } => {
            debug!(key = %key, "Processing lookup command");
            stash.cache.lookup(&key).await.into()
        }
        Command::Store { key } => {
            debug!(key = %key, "Processing store command");
            stash.cache.lookup_and_store(&key).await.into()
        }
        Command::GetStatus => {
            debug!("Processing getStatus command");
            Response::Status {
                version: PROTOCOL_VERSION,
                healthy: true,
                connections: shared.connection_count.load(Ordering::Relaxed),
                volatile: stash.volatile.stats(),
            }
        }
    }
}
