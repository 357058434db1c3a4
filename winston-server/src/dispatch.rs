//! Command-name → handler table.
//!
//! Built once at startup. Each dispatched command gets a fresh handler bound
//! to the shared [`ServerContext`]; the per-connection served count is
//! bumped here, before the handler runs, so every command kind is counted
//! the same way.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use winston_rs_protocol::frame::{self, empty_frame, encode_frame, encode_header_only, encode_lines};
use winston_rs_protocol::{Command, WinstonError};

use crate::commands;
use crate::connections::ConnectionRegistry;
use crate::error::Result;
use crate::store::Storage;

/// Default cap on the samples one wave command may gap-fill.
pub const DEFAULT_MAX_SAMPLES: usize = 20_000_000;

/// Shared state every handler is bound to.
#[derive(Clone)]
pub struct ServerContext {
    pub storage: Arc<dyn Storage>,
    pub protocol_version: u32,
    /// Wave commands whose window would hold more samples are refused.
    pub max_samples: usize,
    /// Startup time in J2kSec.
    pub started: f64,
    pub connections: ConnectionRegistry,
}

impl ServerContext {
    pub fn new(storage: Arc<dyn Storage>, protocol_version: u32) -> Self {
        Self {
            storage,
            protocol_version,
            max_samples: DEFAULT_MAX_SAMPLES,
            started: winston_rs_protocol::time::now_j2k(),
            connections: ConnectionRegistry::new(),
        }
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }
}

/// Answer produced by a handler, framed with the request id on the way out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Header-only `<id> <version>`.
    Version(u32),
    /// `<id> <len>` + payload.
    Bytes(Vec<u8>),
    /// `<id> <count>` + newline-terminated lines.
    Lines(Vec<String>),
    /// `<id> 0`: unknown channel or no data.
    Empty,
}

impl Reply {
    /// Binary payload, gzip-compressed when `compress` is set.
    pub fn binary(payload: Vec<u8>, compress: bool) -> Result<Self> {
        if compress {
            Ok(Self::Bytes(frame::compress(&payload)?))
        } else {
            Ok(Self::Bytes(payload))
        }
    }

    pub fn encode(&self, id: &str) -> Vec<u8> {
        match self {
            Self::Version(v) => encode_header_only(id, *v as usize),
            Self::Bytes(payload) => encode_frame(id, payload),
            Self::Lines(lines) => encode_lines(id, lines),
            Self::Empty => empty_frame(id),
        }
    }
}

/// One WWS command kind.
pub trait CommandHandler: Send {
    fn name(&self) -> &'static str;

    fn context(&self) -> &ServerContext;

    fn handle(&self, cmd: &Command) -> Result<Reply>;

    fn storage(&self) -> &Arc<dyn Storage> {
        &self.context().storage
    }
}

pub type Constructor = fn(ServerContext) -> Box<dyn CommandHandler>;

pub struct DispatchTable {
    entries: HashMap<&'static str, Constructor>,
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl DispatchTable {
    /// A table with no commands.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Every built-in WWS command.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        commands::register_all(&mut table);
        table
    }

    /// Register (or replace) `name`, matched upper-cased.
    pub fn register(&mut self, name: &'static str, constructor: Constructor) {
        self.entries.insert(name, constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Construct the handler for `name`.
    pub fn handler_for(
        &self,
        name: &str,
        context: &ServerContext,
    ) -> std::result::Result<Box<dyn CommandHandler>, WinstonError> {
        let constructor = self
            .entries
            .get(name)
            .ok_or_else(|| WinstonError::UnsupportedCommand(name.to_owned()))?;
        Ok(constructor(context.clone()))
    }

    /// Route `cmd` to its handler on behalf of connection `conn_id`.
    pub fn dispatch(&self, cmd: &Command, context: &ServerContext, conn_id: u64) -> Result<Reply> {
        let handler = self.handler_for(cmd.name(), context)?;
        context.connections.record_command(conn_id, handler.name());
        debug!(
            command = handler.name(),
            id = cmd.id(),
            conn_id,
            "dispatching"
        );
        handler.handle(cmd)
    }
}
