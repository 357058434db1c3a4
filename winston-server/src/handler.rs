use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, trace, warn};
use winston_rs_protocol::frame::empty_frame;
use winston_rs_protocol::{Command, WinstonError};

use crate::dispatch::{DispatchTable, ServerContext};
use crate::error::ServerError;

/// Whether the connection survives the last command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Continue,
    Close,
}

/// Per-client connection handler, run as a spawned tokio task.
///
/// Reads one command line at a time, runs it on the blocking pool (at most
/// `workers` at once across the server) and writes the framed answer before
/// reading the next line.
pub(crate) struct ClientHandler {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    table: Arc<DispatchTable>,
    context: ServerContext,
    workers: Arc<Semaphore>,
    max_line_len: usize,
    shutdown_rx: watch::Receiver<bool>,
    conn_id: u64,
}

impl ClientHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        read_half: OwnedReadHalf,
        write_half: OwnedWriteHalf,
        table: Arc<DispatchTable>,
        context: ServerContext,
        workers: Arc<Semaphore>,
        max_line_len: usize,
        shutdown_rx: watch::Receiver<bool>,
        conn_id: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            table,
            context,
            workers,
            max_line_len,
            shutdown_rx,
            conn_id,
        }
    }

    /// Main loop: read a line, dispatch, answer; until EOF, a fatal
    /// command, or shutdown.
    pub async fn run(mut self) {
        info!(conn_id = self.conn_id, "client connected");
        let mut line = Vec::new();
        let limit = self.max_line_len as u64 + 1;

        loop {
            line.clear();

            let mut limited = (&mut self.reader).take(limit);
            let n = tokio::select! {
                result = limited.read_until(b'\n', &mut line) => {
                    match result {
                        Ok(n) => n,
                        Err(e) => {
                            debug!(error = %e, "read failed");
                            break;
                        }
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    debug!("shutdown received during command loop");
                    break;
                }
            };

            if n == 0 {
                break; // client disconnected
            }
            if line.len() > self.max_line_len {
                warn!(
                    conn_id = self.conn_id,
                    limit = self.max_line_len,
                    "command line too long"
                );
                break;
            }

            let Ok(text) = std::str::from_utf8(&line) else {
                warn!(conn_id = self.conn_id, "command line is not UTF-8");
                break;
            };
            if text.trim().is_empty() {
                continue;
            }

            if self.handle_line(text).await == Outcome::Close {
                break;
            }
        }

        self.context.connections.unregister(self.conn_id);
        let _ = self.writer.shutdown().await;
        info!(conn_id = self.conn_id, "client disconnected");
    }

    async fn handle_line(&mut self, text: &str) -> Outcome {
        let cmd = match Command::parse(text) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(conn_id = self.conn_id, error = %e, "malformed command line");
                // Echo the id when the line got that far.
                if let Some(id) = text.split_whitespace().nth(1) {
                    let _ = self.send(&empty_frame(id)).await;
                }
                return Outcome::Close;
            }
        };

        if !self.table.contains(cmd.name()) {
            warn!(
                conn_id = self.conn_id,
                command = cmd.name(),
                "unsupported command"
            );
            let _ = self.send(&empty_frame(cmd.id())).await;
            return Outcome::Close;
        }

        let Ok(permit) = self.workers.clone().acquire_owned().await else {
            return Outcome::Close;
        };
        let table = self.table.clone();
        let context = self.context.clone();
        let conn_id = self.conn_id;
        let job = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = table.dispatch(&cmd, &context, conn_id);
            (cmd, result)
        });
        let (cmd, result) = match job.await {
            Ok(done) => done,
            Err(e) => {
                warn!(conn_id, error = %e, "command task failed");
                return Outcome::Close;
            }
        };

        let (bytes, outcome) = match result {
            Ok(reply) => (reply.encode(cmd.id()), Outcome::Continue),
            Err(ServerError::Protocol(WinstonError::UnsupportedCommand(n))) => {
                warn!(conn_id, command = %n, "unsupported command");
                (empty_frame(cmd.id()), Outcome::Close)
            }
            Err(ServerError::Protocol(e)) => {
                debug!(conn_id, command = cmd.name(), error = %e, "command rejected");
                (empty_frame(cmd.id()), Outcome::Continue)
            }
            Err(ServerError::Storage(e)) => {
                warn!(conn_id, command = cmd.name(), error = %e, "storage failure");
                (empty_frame(cmd.id()), Outcome::Continue)
            }
            Err(e) => {
                warn!(conn_id, command = cmd.name(), error = %e, "command failed");
                (empty_frame(cmd.id()), Outcome::Close)
            }
        };

        if self.send(&bytes).await.is_err() {
            return Outcome::Close;
        }
        trace!(conn_id, id = cmd.id(), bytes = bytes.len(), "response sent");
        outcome
    }

    async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }
}
