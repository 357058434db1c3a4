//! Async Winston Wave Server.
//!
//! Answers WWS commands from a pluggable [`Storage`] and, when configured,
//! serves the FDSN station and dataselect web services from the same data.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> winston_rs_server::Result<()> {
//! use std::sync::Arc;
//! use winston_rs_protocol::{Scnl, TracePacket};
//! use winston_rs_server::{MemoryStore, WinstonServer};
//!
//! let store = MemoryStore::new();
//! let server = WinstonServer::bind("0.0.0.0:16022", Arc::new(store.clone())).await?;
//!
//! tokio::spawn(server.run());
//!
//! // Push data from any source
//! let scnl = Scnl::new("ABC", "EHZ", "XX", "--");
//! store.push_packet(TracePacket::new(scnl, 0.0, 100.0, vec![0; 100]));
//! # Ok(())
//! # }
//! ```

pub(crate) mod commands;
pub mod connections;
pub mod constraint;
pub mod dispatch;
pub mod error;
pub mod fdsn;
pub(crate) mod handler;
pub mod store;

pub use connections::ConnectionStats;
pub use dispatch::{CommandHandler, DEFAULT_MAX_SAMPLES, DispatchTable, Reply, ServerContext};
pub use error::{Result, ServerError};
pub use fdsn::FdsnConfig;
pub use store::{MemoryStore, Storage, StorageError};

use std::net::SocketAddr;
use std::sync::Arc;

use handler::ClientHandler;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tracing::{info, warn};

/// Configuration for [`WinstonServer`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Reported by `VERSION`. Default: `3`.
    pub protocol_version: u32,
    /// Commands executing at once across all connections. Default: `8`.
    pub worker_threads: usize,
    /// Longest accepted command line in bytes. Default: `4096`.
    pub max_line_len: usize,
    /// Largest gap-filled wave one command may assemble. Default: 20 million samples.
    pub max_samples: usize,
    /// Bind address for the FDSN HTTP surface. Default: none (disabled).
    pub fdsn_addr: Option<String>,
    pub fdsn: FdsnConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol_version: 3,
            worker_threads: 8,
            max_line_len: 4096,
            max_samples: DEFAULT_MAX_SAMPLES,
            fdsn_addr: None,
            fdsn: FdsnConfig::default(),
        }
    }
}

/// Handle for triggering graceful server shutdown.
///
/// Obtained via [`WinstonServer::shutdown_handle()`]. Calling [`shutdown()`](Self::shutdown)
/// stops the accept loop, every client handler and the FDSN listener.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signal the server to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Async Winston Wave Server.
///
/// Binds to a TCP port, accepts client connections, and answers WWS
/// commands through a [`DispatchTable`] over a shared [`Storage`].
pub struct WinstonServer {
    listener: TcpListener,
    fdsn_listener: Option<TcpListener>,
    config: ServerConfig,
    table: Arc<DispatchTable>,
    context: ServerContext,
    workers: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WinstonServer {
    /// Bind to the given address with default configuration.
    pub async fn bind(addr: &str, storage: Arc<dyn Storage>) -> Result<Self> {
        Self::bind_with_config(addr, storage, ServerConfig::default()).await
    }

    /// Bind to the given address with custom configuration. Also binds the
    /// FDSN listener when `config.fdsn_addr` is set.
    pub async fn bind_with_config(
        addr: &str,
        storage: Arc<dyn Storage>,
        config: ServerConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        let fdsn_listener = match &config.fdsn_addr {
            Some(fdsn_addr) => Some(
                TcpListener::bind(fdsn_addr.as_str())
                    .await
                    .map_err(ServerError::Bind)?,
            ),
            None => None,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let context = ServerContext::new(storage, config.protocol_version)
            .with_max_samples(config.max_samples);
        let workers = Arc::new(Semaphore::new(config.worker_threads.max(1)));
        info!(addr, fdsn = ?config.fdsn_addr, "server bound");
        Ok(Self {
            listener,
            fdsn_listener,
            config,
            table: Arc::new(DispatchTable::standard()),
            context,
            workers,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Replace the built-in command set.
    pub fn with_dispatch_table(mut self, table: DispatchTable) -> Self {
        self.table = Arc::new(table);
        self
    }

    /// Returns the local address this server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(ServerError::Io)
    }

    /// Address of the FDSN listener, if one was configured.
    pub fn fdsn_addr(&self) -> Option<SocketAddr> {
        self.fdsn_listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The context every command handler is bound to.
    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Snapshot of the currently connected clients.
    pub fn connections(&self) -> Vec<ConnectionStats> {
        self.context.connections.snapshot()
    }

    /// Returns a handle that can be used to trigger graceful shutdown.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run the accept loop. Spawns a task per client connection, plus the
    /// FDSN service when configured.
    ///
    /// Returns when shutdown is signalled.
    pub async fn run(mut self) {
        if let Some(listener) = self.fdsn_listener.take() {
            let storage = self.context.storage.clone();
            let state = fdsn::FdsnState::new(storage, self.config.fdsn.clone());
            let shutdown_rx = self.shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) = fdsn::serve(listener, fdsn::router(state), shutdown_rx).await {
                    warn!(error = %e, "fdsn service stopped");
                }
            });
        }

        loop {
            let (stream, addr) = tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept error");
                            continue;
                        }
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
            };

            info!(%addr, "accepted connection");
            stream.set_nodelay(true).ok();

            let conn_id = self.context.connections.register(addr);
            let (read_half, write_half) = stream.into_split();
            let handler = ClientHandler::new(
                read_half,
                write_half,
                self.table.clone(),
                self.context.clone(),
                self.workers.clone(),
                self.config.max_line_len,
                self.shutdown_rx.clone(),
                conn_id,
            );
            tokio::spawn(handler.run());
        }
    }
}
