use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use winston_rs_protocol::{Command, Response, ResponseKind};

use crate::bridge::{self, CloseHandle, Shared};
use crate::error::{ClientError, Result};

/// One TCP connection: a writer plus a reader task feeding the bridge.
pub(crate) struct Connection {
    writer: BufWriter<OwnedWriteHalf>,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    max_decompressed_len: usize,
}

impl Connection {
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        max_decompressed_len: usize,
    ) -> Result<Self> {
        debug!(addr, "TCP connecting");
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout(connect_timeout))?
            .map_err(ClientError::Io)?;

        stream.set_nodelay(true).ok();
        Ok(Self::from_stream(stream, max_decompressed_len))
    }

    pub fn from_stream(stream: TcpStream, max_decompressed_len: usize) -> Self {
        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared::default());
        let reader = tokio::spawn(bridge::read_responses(read_half, shared.clone()));
        Self {
            writer: BufWriter::new(write_half),
            shared,
            reader,
            max_decompressed_len,
        }
    }

    /// Send `cmd` and wait up to `deadline` for its complete answer.
    ///
    /// A timeout closes the connection: a late answer would otherwise be
    /// read as the reply to the next request.
    pub async fn request(
        &mut self,
        cmd: &Command,
        kind: ResponseKind,
        deadline: Duration,
    ) -> Result<(String, Response)> {
        let rx = self.shared.register(kind, self.max_decompressed_len)?;
        let guard = CloseOnDrop(Some(self.close_handle()));

        trace!(name = cmd.name(), id = cmd.id(), "sending");
        self.send_raw(&cmd.to_bytes()).await?;

        let answer = match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                warn!(name = cmd.name(), id = cmd.id(), ?deadline, "request timed out, closing");
                return Err(ClientError::Timeout(deadline));
            }
        };
        guard.disarm();
        answer
    }

    async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).await.map_err(ClientError::Io)?;
        self.writer.flush().await.map_err(ClientError::Io)?;
        Ok(())
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle::new(self.shared.clone(), self.reader.abort_handle())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.close_handle().close();
        self.writer.shutdown().await.map_err(ClientError::Io)?;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Closes the connection unless disarmed, so a request abandoned after
/// sending (error, timeout or a dropped future) leaves no slot behind.
struct CloseOnDrop(Option<CloseHandle>);

impl CloseOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.close();
        }
    }
}
