use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use winston_rs_protocol::Command;

type BuildFn = Box<dyn Fn(&Command) -> Vec<u8> + Send + Sync>;

/// One scripted answer, consumed per received command.
pub enum MockReply {
    /// Bytes built from the request, written `chunk` bytes at a time.
    Frame {
        build: BuildFn,
        chunk: usize,
        delay: Duration,
    },
    /// Read the command and never answer.
    Silent,
    /// Write the given bytes, then close the socket.
    CloseAfter(Vec<u8>),
}

impl MockReply {
    pub fn frame<F>(build: F) -> Self
    where
        F: Fn(&Command) -> Vec<u8> + Send + Sync + 'static,
    {
        Self::Frame {
            build: Box::new(build),
            chunk: usize::MAX,
            delay: Duration::ZERO,
        }
    }

    /// Split the answer into `chunk`-byte writes with `delay` between them.
    pub fn chunked(self, chunk: usize, delay: Duration) -> Self {
        match self {
            Self::Frame { build, .. } => Self::Frame {
                build,
                chunk: chunk.max(1),
                delay,
            },
            other => other,
        }
    }
}

pub struct MockServer {
    addr: SocketAddr,
}

impl MockServer {
    pub async fn start(replies: Vec<MockReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            Self::handle_connection(listener, replies).await;
        });

        Self { addr }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    async fn handle_connection(listener: TcpListener, replies: Vec<MockReply>) {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut replies = replies.into_iter();
        let mut line = String::new();
        // Keep the socket open after a Silent reply until the client leaves.
        let mut silent = false;

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            if silent {
                continue;
            }
            let Ok(cmd) = Command::parse(&line) else {
                break;
            };
            let Some(reply) = replies.next() else {
                break;
            };

            match reply {
                MockReply::Frame {
                    build,
                    chunk,
                    delay,
                } => {
                    let bytes = build(&cmd);
                    for piece in bytes.chunks(chunk) {
                        if write_half.write_all(piece).await.is_err() {
                            return;
                        }
                        let _ = write_half.flush().await;
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                MockReply::Silent => silent = true,
                MockReply::CloseAfter(bytes) => {
                    let _ = write_half.write_all(&bytes).await;
                    let _ = write_half.shutdown().await;
                    break;
                }
            }
        }
    }
}
