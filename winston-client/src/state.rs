use std::time::Duration;

use winston_rs_protocol::reassembler::DEFAULT_MAX_DECOMPRESSED_LEN;

/// Configuration for [`WaveServerClient`](crate::WaveServerClient) connections.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Timeout for the initial TCP connection. Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Deadline for each request, from send to complete answer. Default: 30 seconds.
    pub request_timeout: Duration,
    /// Ask the server to gzip binary answers where the command allows it. Default: `true`.
    pub compress: bool,
    /// Largest accepted payload after decompression. Default: 64 MiB.
    pub max_decompressed_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            compress: true,
            max_decompressed_len: DEFAULT_MAX_DECOMPRESSED_LEN,
        }
    }
}
