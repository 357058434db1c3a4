use tokio::runtime::{Builder, Runtime};
use winston_rs_protocol::{Channel, HelicorderData, MenuEntry, RsamData, Scnl, TracePacket, Wave};

use crate::bridge::CloseHandle;
use crate::client::WaveServerClient;
use crate::error::Result;
use crate::state::ClientConfig;

/// Blocking facade over [`WaveServerClient`].
///
/// Owns a private current-thread runtime; every call blocks the calling
/// thread until the answer is complete, the request deadline passes, or the
/// connection is closed through a [`CloseHandle`]. Must not be used from
/// inside an async runtime.
pub struct BlockingClient {
    runtime: Runtime,
    inner: WaveServerClient,
}

impl BlockingClient {
    pub fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default())
    }

    pub fn connect_with_config(addr: &str, config: ClientConfig) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let inner = runtime.block_on(WaveServerClient::connect_with_config(addr, config))?;
        Ok(Self { runtime, inner })
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.inner.close_handle()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn version(&mut self) -> Result<u32> {
        self.runtime.block_on(self.inner.version())
    }

    pub fn menu(&mut self) -> Result<Vec<MenuEntry>> {
        self.runtime.block_on(self.inner.menu())
    }

    pub fn channels(&mut self, metadata: bool) -> Result<Vec<Channel>> {
        self.runtime.block_on(self.inner.channels(metadata))
    }

    pub fn status(&mut self, max_age: Option<f64>) -> Result<String> {
        self.runtime.block_on(self.inner.status(max_age))
    }

    pub fn wave(&mut self, scnl: &Scnl, start: f64, end: f64) -> Result<Option<Wave>> {
        self.runtime.block_on(self.inner.wave(scnl, start, end))
    }

    pub fn raw_packets(&mut self, scnl: &Scnl, start: f64, end: f64) -> Result<Vec<TracePacket>> {
        self.runtime
            .block_on(self.inner.raw_packets(scnl, start, end))
    }

    pub fn rsam(
        &mut self,
        scnl: &Scnl,
        start: f64,
        end: f64,
        period: f64,
    ) -> Result<Option<RsamData>> {
        self.runtime
            .block_on(self.inner.rsam(scnl, start, end, period))
    }

    pub fn helicorder(
        &mut self,
        scnl: &Scnl,
        start: f64,
        end: f64,
    ) -> Result<Option<HelicorderData>> {
        self.runtime
            .block_on(self.inner.helicorder(scnl, start, end))
    }

    pub fn sac(&mut self, scnl: &Scnl, start: f64, end: f64) -> Result<Option<Vec<u8>>> {
        self.runtime.block_on(self.inner.sac(scnl, start, end))
    }

    pub fn close(self) -> Result<()> {
        let Self { runtime, inner } = self;
        runtime.block_on(inner.close())
    }
}
