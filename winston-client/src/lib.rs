//! Winston Wave Server client.
//!
//! [`WaveServerClient`] issues WWS commands over one TCP connection, one
//! request at a time, and decodes the length-prefixed answers.
//! [`BlockingClient`] offers the same calls to callers without a runtime.

mod blocking;
mod bridge;
mod client;
mod connection;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;
pub mod state;

pub use blocking::BlockingClient;
pub use bridge::CloseHandle;
pub use client::WaveServerClient;
pub use error::{ClientError, Result};
pub use state::ClientConfig;
