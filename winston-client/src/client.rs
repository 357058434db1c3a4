use tracing::{debug, info};
use winston_rs_protocol::{
    Channel, Command, HelicorderData, MenuEntry, Response, ResponseKind, RsamData, Scnl,
    TracePacket, Wave,
};

use crate::bridge::CloseHandle;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::state::ClientConfig;

/// Async Winston Wave Server client.
///
/// Requests are strictly sequential: every call takes `&mut self`, sends one
/// command and waits (bounded by [`ClientConfig::request_timeout`]) for its
/// complete answer before the next may start.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> winston_rs_client::Result<()> {
/// use winston_rs_client::WaveServerClient;
/// use winston_rs_protocol::Scnl;
///
/// let mut client = WaveServerClient::connect("localhost:16022").await?;
/// for entry in client.menu().await? {
///     println!("{} {}..{}", entry.scnl, entry.start, entry.end);
/// }
/// let scnl = Scnl::new("ABC", "EHZ", "XX", "--");
/// if let Some(wave) = client.wave(&scnl, 0.0, 100.0).await? {
///     println!("{} samples", wave.samples.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct WaveServerClient {
    connection: Connection,
    config: ClientConfig,
    next_id: u64,
}

impl WaveServerClient {
    /// Connect with default configuration.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    pub async fn connect_with_config(addr: &str, config: ClientConfig) -> Result<Self> {
        info!(addr, "connecting");
        let connection =
            Connection::connect(addr, config.connect_timeout, config.max_decompressed_len).await?;
        Ok(Self {
            connection,
            config,
            next_id: 0,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Handle that closes this connection from another task or thread.
    pub fn close_handle(&self) -> CloseHandle {
        self.connection.close_handle()
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<()> {
        info!("closing");
        self.connection.shutdown().await
    }

    /// `VERSION`: the server's protocol version.
    pub async fn version(&mut self) -> Result<u32> {
        match self.call("VERSION", vec![], ResponseKind::Version).await? {
            Response::Version(v) => Ok(v),
            other => Err(unexpected("VERSION", &other)),
        }
    }

    /// `MENU`: one entry per channel with a known time range.
    pub async fn menu(&mut self) -> Result<Vec<MenuEntry>> {
        match self
            .call("MENU", vec!["SCNL".into()], ResponseKind::Menu)
            .await?
        {
            Response::Menu(entries) => Ok(entries),
            other => Err(unexpected("MENU", &other)),
        }
    }

    /// `GETCHANNELS`, optionally with instrument metadata.
    pub async fn channels(&mut self, metadata: bool) -> Result<Vec<Channel>> {
        let args = if metadata {
            vec!["METADATA".into()]
        } else {
            Vec::new()
        };
        match self
            .call("GETCHANNELS", args, ResponseKind::Channels)
            .await?
        {
            Response::Channels(channels) => Ok(channels),
            other => Err(unexpected("GETCHANNELS", &other)),
        }
    }

    /// `STATUS`: human-readable server status text.
    pub async fn status(&mut self, max_age: Option<f64>) -> Result<String> {
        let args = max_age.map(|a| vec![a.to_string()]).unwrap_or_default();
        match self.call("STATUS", args, ResponseKind::Text).await? {
            Response::Text(text) => Ok(text),
            Response::Empty => Ok(String::new()),
            other => Err(unexpected("STATUS", &other)),
        }
    }

    /// `GETWAVERAW`: samples in `[start, end]`, gap-filled. `None` if no data.
    pub async fn wave(&mut self, scnl: &Scnl, start: f64, end: f64) -> Result<Option<Wave>> {
        let compressed = self.config.compress;
        let mut args = window_args(scnl, start, end);
        args.push(flag(compressed));
        match self
            .call("GETWAVERAW", args, ResponseKind::Wave { compressed })
            .await?
        {
            Response::Wave(wave) => Ok(Some(wave)),
            Response::Empty => Ok(None),
            other => Err(unexpected("GETWAVERAW", &other)),
        }
    }

    /// `GETSCNLRAW`: the stored trace packets overlapping `[start, end]`.
    pub async fn raw_packets(
        &mut self,
        scnl: &Scnl,
        start: f64,
        end: f64,
    ) -> Result<Vec<TracePacket>> {
        let args = window_args(scnl, start, end);
        match self.call("GETSCNLRAW", args, ResponseKind::Packets).await? {
            Response::Packets(packets) => Ok(packets),
            Response::Empty => Ok(Vec::new()),
            other => Err(unexpected("GETSCNLRAW", &other)),
        }
    }

    /// `GETSCNLRSAMRAW`: RSAM over `period`-second buckets.
    pub async fn rsam(
        &mut self,
        scnl: &Scnl,
        start: f64,
        end: f64,
        period: f64,
    ) -> Result<Option<RsamData>> {
        let compressed = self.config.compress;
        let mut args = window_args(scnl, start, end);
        args.push(period.to_string());
        args.push(flag(compressed));
        let kind = ResponseKind::Rsam { compressed };
        match self.call("GETSCNLRSAMRAW", args, kind).await? {
            Response::Rsam(data) => Ok(Some(data)),
            Response::Empty => Ok(None),
            other => Err(unexpected("GETSCNLRSAMRAW", &other)),
        }
    }

    /// `GETSCNLHELIRAW`: per-second min/max rows.
    pub async fn helicorder(
        &mut self,
        scnl: &Scnl,
        start: f64,
        end: f64,
    ) -> Result<Option<HelicorderData>> {
        let compressed = self.config.compress;
        let mut args = window_args(scnl, start, end);
        args.push(flag(compressed));
        let kind = ResponseKind::Helicorder { compressed };
        match self.call("GETSCNLHELIRAW", args, kind).await? {
            Response::Helicorder(data) => Ok(Some(data)),
            Response::Empty => Ok(None),
            other => Err(unexpected("GETSCNLHELIRAW", &other)),
        }
    }

    /// `GETSCNLSAC`: the window as a SAC file.
    pub async fn sac(&mut self, scnl: &Scnl, start: f64, end: f64) -> Result<Option<Vec<u8>>> {
        let args = window_args(scnl, start, end);
        match self.call("GETSCNLSAC", args, ResponseKind::Raw).await? {
            Response::Raw(bytes) => Ok(Some(bytes)),
            Response::Empty => Ok(None),
            other => Err(unexpected("GETSCNLSAC", &other)),
        }
    }

    async fn call(
        &mut self,
        name: &str,
        args: Vec<String>,
        kind: ResponseKind,
    ) -> Result<Response> {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let cmd = Command::new(name, &id, args);
        debug!(name, id = %id, "request");

        let (echoed, response) = self
            .connection
            .request(&cmd, kind, self.config.request_timeout)
            .await?;
        if echoed != id {
            self.close_handle().close();
            return Err(ClientError::IdMismatch {
                expected: id,
                actual: echoed,
            });
        }
        Ok(response)
    }
}

fn window_args(scnl: &Scnl, start: f64, end: f64) -> Vec<String> {
    vec![
        scnl.station.clone(),
        scnl.channel.clone(),
        scnl.network.clone(),
        scnl.location.clone(),
        start.to_string(),
        end.to_string(),
    ]
}

fn flag(on: bool) -> String {
    if on { "1" } else { "0" }.to_owned()
}

fn unexpected(command: &str, response: &Response) -> ClientError {
    ClientError::UnexpectedResponse(format!("{command} answered with {response:?}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{MockReply, MockServer};
    use winston_rs_protocol::frame::{
        compress, empty_frame, encode_frame, encode_header_only, encode_lines,
    };
    use winston_rs_protocol::WinstonError;

    fn quick_config() -> ClientConfig {
        ClientConfig {
            request_timeout: Duration::from_millis(500),
            ..ClientConfig::default()
        }
    }

    fn abc() -> Scnl {
        Scnl::new("ABC", "EHZ", "XX", "--")
    }

    #[tokio::test]
    async fn version() {
        let server = MockServer::start(vec![MockReply::frame(|cmd| {
            assert_eq!(cmd.name(), "VERSION");
            encode_header_only(cmd.id(), 3)
        })])
        .await;

        let mut client = WaveServerClient::connect(&server.addr()).await.unwrap();
        assert_eq!(client.version().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn menu_in_small_chunks() {
        let server = MockServer::start(vec![
            MockReply::frame(|cmd| {
                assert_eq!(cmd.args(), ["SCNL"]);
                encode_lines(
                    cmd.id(),
                    &[
                        "1 ABC EHZ XX -- 0 100 s4".to_owned(),
                        "2 DEF EHZ XX 00 50 60 s4".to_owned(),
                    ],
                )
            })
            .chunked(3, Duration::from_millis(1)),
        ])
        .await;

        let mut client = WaveServerClient::connect(&server.addr()).await.unwrap();
        let menu = client.menu().await.unwrap();
        assert_eq!(menu.len(), 2);
        assert_eq!(menu[0].scnl, abc());
        assert_eq!(menu[1].end, 60.0);
    }

    #[tokio::test]
    async fn compressed_wave_byte_by_byte() {
        let wave = Wave::new(0.0, 10.0, (0..1001).collect());
        let expected = wave.clone();
        let server = MockServer::start(vec![
            MockReply::frame(move |cmd| {
                assert_eq!(cmd.name(), "GETWAVERAW");
                assert_eq!(cmd.args().last().map(String::as_str), Some("1"));
                encode_frame(cmd.id(), &compress(&wave.to_binary()).unwrap())
            })
            .chunked(1, Duration::ZERO),
        ])
        .await;

        let mut client = WaveServerClient::connect(&server.addr()).await.unwrap();
        let got = client.wave(&abc(), 0.0, 100.0).await.unwrap().unwrap();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn empty_frame_is_no_data() {
        let server = MockServer::start(vec![
            MockReply::frame(|cmd| empty_frame(cmd.id())),
            MockReply::frame(|cmd| empty_frame(cmd.id())),
        ])
        .await;

        let mut client = WaveServerClient::connect(&server.addr()).await.unwrap();
        assert!(client.wave(&abc(), 0.0, 1.0).await.unwrap().is_none());
        let packets = client.raw_packets(&abc(), 0.0, 1.0).await.unwrap();
        assert!(packets.is_empty());
    }

    #[tokio::test]
    async fn sequential_ids() {
        let server = MockServer::start(vec![
            MockReply::frame(|cmd| {
                assert_eq!(cmd.id(), "1");
                encode_header_only(cmd.id(), 3)
            }),
            MockReply::frame(|cmd| {
                assert_eq!(cmd.id(), "2");
                encode_frame(cmd.id(), b"ok")
            }),
        ])
        .await;

        let mut client = WaveServerClient::connect(&server.addr()).await.unwrap();
        client.version().await.unwrap();
        assert_eq!(client.status(None).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn id_mismatch() {
        let server =
            MockServer::start(vec![MockReply::frame(|_| encode_header_only("999", 3))]).await;

        let mut client = WaveServerClient::connect(&server.addr()).await.unwrap();
        let err = client.version().await.unwrap_err();
        assert!(matches!(err, ClientError::IdMismatch { .. }));
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn request_timeout() {
        let server = MockServer::start(vec![MockReply::Silent]).await;

        let mut client = WaveServerClient::connect_with_config(&server.addr(), quick_config())
            .await
            .unwrap();
        let err = client.version().await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
        assert!(matches!(
            client.version().await.unwrap_err(),
            ClientError::ConnectionClosed
        ));
    }

    #[tokio::test]
    async fn close_handle_unblocks_waiter() {
        let server = MockServer::start(vec![MockReply::Silent]).await;

        let mut client = WaveServerClient::connect(&server.addr()).await.unwrap();
        let handle = client.close_handle();
        let task = tokio::spawn(async move { client.menu().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.close();

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("waiter was not released")
            .unwrap();
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn server_closes_mid_body() {
        let reply = MockReply::CloseAfter(b"1 100\npartial".to_vec());
        let server = MockServer::start(vec![reply]).await;

        let mut client = WaveServerClient::connect(&server.addr()).await.unwrap();
        let err = client.sac(&abc(), 0.0, 1.0).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(WinstonError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn rsam_and_helicorder_arguments() {
        let server = MockServer::start(vec![
            MockReply::frame(|cmd| {
                assert_eq!(cmd.name(), "GETSCNLRSAMRAW");
                assert_eq!(cmd.args(), ["ABC", "EHZ", "XX", "--", "0", "60", "10", "0"]);
                let data = RsamData {
                    rows: vec![(0.0, 1.5), (10.0, 2.5)],
                };
                encode_frame(cmd.id(), &data.to_binary())
            }),
            MockReply::frame(|cmd| {
                assert_eq!(cmd.name(), "GETSCNLHELIRAW");
                encode_frame(cmd.id(), &HelicorderData::default().to_binary())
            }),
        ])
        .await;

        let config = ClientConfig {
            compress: false,
            ..ClientConfig::default()
        };
        let mut client = WaveServerClient::connect_with_config(&server.addr(), config)
            .await
            .unwrap();
        let rsam = client.rsam(&abc(), 0.0, 60.0, 10.0).await.unwrap().unwrap();
        assert_eq!(rsam.rows, vec![(0.0, 1.5), (10.0, 2.5)]);
        let heli = client.helicorder(&abc(), 0.0, 60.0).await.unwrap().unwrap();
        assert!(heli.rows.is_empty());
    }
}
