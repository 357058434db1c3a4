//! Hands reader-task bytes to the single in-flight request.
//!
//! Each request registers one [`Pending`] slot holding its reassembler and a
//! oneshot sender. The reader task feeds every received chunk into that
//! reassembler and fires the sender exactly once: with the decoded answer,
//! a decode failure, or [`ClientError::ConnectionClosed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};
use winston_rs_protocol::{Reassembler, Response, ResponseKind, WinstonError};

use crate::error::{ClientError, Result};

const READ_CHUNK: usize = 8192;

/// Decoded answer plus the id its header echoed.
pub(crate) type Answer = Result<(String, Response)>;

struct Pending {
    reassembler: Reassembler,
    kind: ResponseKind,
    tx: oneshot::Sender<Answer>,
}

#[derive(Default)]
pub(crate) struct Shared {
    pending: Mutex<Option<Pending>>,
    closed: AtomicBool,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Install the slot for a new request.
    pub fn register(
        &self,
        kind: ResponseKind,
        max_decompressed_len: usize,
    ) -> Result<oneshot::Receiver<Answer>> {
        let mut slot = self.slot();
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        if slot.is_some() {
            return Err(ClientError::UnexpectedResponse(
                "a request is already in flight".into(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(Pending {
            reassembler: Reassembler::with_limit(kind.body_kind(), max_decompressed_len),
            kind,
            tx,
        });
        Ok(rx)
    }

    /// Feed one received chunk. Returns `false` once the stream is unusable.
    fn deliver(&self, chunk: &[u8]) -> bool {
        let mut slot = self.slot();
        let fed = match slot.as_mut().map(|p| p.reassembler.feed(chunk)) {
            Some(fed) => fed,
            None => {
                drop(slot);
                warn!(bytes = chunk.len(), "unsolicited bytes from server");
                self.close();
                return false;
            }
        };
        match fed {
            Ok(None) => true,
            Ok(Some(frame)) => {
                if let Some(p) = slot.take() {
                    let token = frame.header.token.clone();
                    trace!(id = %token, kind = ?p.kind, "response complete");
                    let answer = p
                        .kind
                        .decode(frame)
                        .map(|r| (token, r))
                        .map_err(ClientError::from);
                    let _ = p.tx.send(answer);
                }
                true
            }
            // Decompression runs on a completed frame, so framing is still aligned.
            Err(e @ WinstonError::Codec(_)) => {
                if let Some(p) = slot.take() {
                    let _ = p.tx.send(Err(e.into()));
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "response framing lost, closing");
                if let Some(p) = slot.take() {
                    let _ = p.tx.send(Err(e.into()));
                }
                self.closed.store(true, Ordering::Release);
                false
            }
        }
    }

    /// The server closed the stream.
    fn eof(&self) {
        let pending = {
            let mut slot = self.slot();
            self.closed.store(true, Ordering::Release);
            slot.take()
        };
        if let Some(p) = pending {
            let err = match p.reassembler.close_error() {
                Some(e) => ClientError::Protocol(e),
                None => ClientError::ConnectionClosed,
            };
            let _ = p.tx.send(Err(err));
        }
    }

    /// Mark closed and fail any waiter with `err`.
    fn fail(&self, err: ClientError) {
        let pending = {
            let mut slot = self.slot();
            self.closed.store(true, Ordering::Release);
            slot.take()
        };
        if let Some(p) = pending {
            let _ = p.tx.send(Err(err));
        }
    }

    /// Mark closed and release any waiter with `ConnectionClosed`.
    pub fn close(&self) {
        self.fail(ClientError::ConnectionClosed);
    }
}

/// Reader task: pump socket bytes into the pending slot until EOF or error.
pub(crate) async fn read_responses<R>(mut reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("server closed connection");
                shared.eof();
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "read failed");
                shared.fail(ClientError::Io(e));
                return;
            }
        };
        trace!(bytes = n, "received");
        if !shared.deliver(&buf[..n]) {
            return;
        }
    }
}

/// Closes a connection from any thread, releasing a blocked request.
///
/// Clone is cheap (Arc).
#[derive(Clone)]
pub struct CloseHandle {
    shared: Arc<Shared>,
    reader: AbortHandle,
}

impl CloseHandle {
    pub(crate) fn new(shared: Arc<Shared>, reader: AbortHandle) -> Self {
        Self { shared, reader }
    }

    /// Close the connection. Any in-flight request fails with
    /// [`ClientError::ConnectionClosed`].
    pub fn close(&self) {
        debug!("closing connection");
        self.shared.close();
        self.reader.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}
