//! Winston Wave Server protocol types, command grammar, and response framing.
//!
//! This crate provides the shared protocol layer for the WWS line protocol,
//! used by both the client and server crates.

pub mod channel;
pub mod command;
pub mod data;
pub mod error;
pub mod frame;
pub mod reassembler;
pub mod response;
pub mod time;

pub use channel::{Channel, Instrument, Scnl};
pub use command::Command;
pub use data::{HelicorderData, MenuEntry, RsamData, TracePacket, Wave};
pub use error::{Result, WinstonError};
pub use frame::FrameHeader;
pub use reassembler::{BodyKind, CompletedFrame, ReassemblyState, Reassembler};
pub use response::{Response, ResponseKind};
pub use time::TimeSpan;

/// Protocol version reported by `VERSION`.
pub const PROTOCOL_VERSION: u32 = 3;
