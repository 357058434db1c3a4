//! Client-side response reassembly across arbitrary chunk boundaries.
//!
//! One `Reassembler` is owned by each in-flight request:
//! `AwaitingHeader` → `AwaitingBody` → `Complete`.

use tracing::trace;

use crate::error::{Result, WinstonError};
use crate::frame::{self, FrameHeader, MAX_HEADER_LEN};

/// Default cap for gunzipped payloads.
pub const DEFAULT_MAX_DECOMPRESSED_LEN: usize = 64 * 1024 * 1024;

/// Upper bound on the body buffer reserved up front from an untrusted header.
const MAX_PREALLOC: usize = 1024 * 1024;

/// What follows the header line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// Nothing; the header value is the answer (e.g. `VERSION`).
    None,
    /// Exactly `value` bytes, gzip-compressed when `compressed`.
    Bytes { compressed: bool },
    /// Exactly `value` newline-terminated lines.
    Lines,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReassemblyState {
    AwaitingHeader,
    AwaitingBody,
    Complete,
    Failed,
}

/// A fully received frame, handed to the response decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedFrame {
    pub header: FrameHeader,
    pub body: Vec<u8>,
}

enum Phase {
    AwaitingHeader {
        buf: Vec<u8>,
    },
    AwaitingBody {
        header: FrameHeader,
        body: Vec<u8>,
        lines_seen: usize,
    },
    Complete,
    Failed,
}

pub struct Reassembler {
    kind: BodyKind,
    phase: Phase,
    max_decompressed_len: usize,
}

impl Reassembler {
    pub fn new(kind: BodyKind) -> Self {
        Self::with_limit(kind, DEFAULT_MAX_DECOMPRESSED_LEN)
    }

    pub fn with_limit(kind: BodyKind, max_decompressed_len: usize) -> Self {
        Self {
            kind,
            phase: Phase::AwaitingHeader { buf: Vec::new() },
            max_decompressed_len,
        }
    }

    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    pub fn state(&self) -> ReassemblyState {
        match self.phase {
            Phase::AwaitingHeader { .. } => ReassemblyState::AwaitingHeader,
            Phase::AwaitingBody { .. } => ReassemblyState::AwaitingBody,
            Phase::Complete => ReassemblyState::Complete,
            Phase::Failed => ReassemblyState::Failed,
        }
    }

    /// Bytes buffered so far for the current phase.
    pub fn buffered(&self) -> usize {
        match &self.phase {
            Phase::AwaitingHeader { buf } => buf.len(),
            Phase::AwaitingBody { body, .. } => body.len(),
            Phase::Complete | Phase::Failed => 0,
        }
    }

    /// Append a delivered chunk. Returns the frame once it is complete.
    ///
    /// Any error leaves the reassembler in the `Failed` state.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<CompletedFrame>> {
        let result = self.feed_inner(chunk);
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }

    /// Error to surface when the transport closes before completion.
    ///
    /// `None` if nothing of the response had arrived yet.
    pub fn close_error(&self) -> Option<WinstonError> {
        match &self.phase {
            Phase::AwaitingHeader { buf } if buf.is_empty() => None,
            Phase::AwaitingHeader { buf } => Some(WinstonError::MalformedResponse(format!(
                "connection closed inside header after {} bytes",
                buf.len()
            ))),
            Phase::AwaitingBody {
                header,
                body,
                lines_seen,
            } => Some(WinstonError::MalformedResponse(match self.kind {
                BodyKind::Lines => format!(
                    "connection closed after {lines_seen} of {} declared lines",
                    header.value
                ),
                _ => format!(
                    "connection closed after {} of {} declared bytes",
                    body.len(),
                    header.value
                ),
            })),
            Phase::Complete | Phase::Failed => None,
        }
    }

    fn feed_inner(&mut self, chunk: &[u8]) -> Result<Option<CompletedFrame>> {
        match &mut self.phase {
            Phase::Complete => {
                if chunk.is_empty() {
                    Ok(None)
                } else {
                    Err(WinstonError::MalformedResponse(format!(
                        "{} unexpected bytes after a complete frame",
                        chunk.len()
                    )))
                }
            }
            Phase::Failed => Err(WinstonError::MalformedResponse(
                "reassembler already failed".into(),
            )),
            Phase::AwaitingHeader { buf } => {
                let scan_from = buf.len();
                buf.extend_from_slice(chunk);
                let newline = buf[scan_from..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map(|p| scan_from + p);
                let Some(pos) = newline else {
                    if buf.len() > MAX_HEADER_LEN {
                        return Err(WinstonError::MalformedResponse(format!(
                            "no header newline within {MAX_HEADER_LEN} bytes"
                        )));
                    }
                    trace!(buffered = buf.len(), "partial header");
                    return Ok(None);
                };
                if pos > MAX_HEADER_LEN {
                    return Err(WinstonError::MalformedResponse(format!(
                        "header longer than {MAX_HEADER_LEN} bytes"
                    )));
                }
                let header = FrameHeader::parse(&buf[..pos])?;
                let rest = buf.split_off(pos + 1);
                trace!(id = %header.token, value = header.value, "header parsed");
                self.begin_body(header, &rest)
            }
            Phase::AwaitingBody { .. } => self.append_body(chunk),
        }
    }

    fn begin_body(&mut self, header: FrameHeader, rest: &[u8]) -> Result<Option<CompletedFrame>> {
        let declared = header.value;
        let capacity = match self.kind {
            BodyKind::Bytes { .. } => declared.min(MAX_PREALLOC),
            _ => 0,
        };
        self.phase = Phase::AwaitingBody {
            header,
            body: Vec::with_capacity(capacity),
            lines_seen: 0,
        };
        if self.kind == BodyKind::None || declared == 0 {
            if !rest.is_empty() {
                return Err(WinstonError::MalformedResponse(format!(
                    "{} unexpected bytes after a bodiless frame",
                    rest.len()
                )));
            }
            return self.complete();
        }
        self.append_body(rest)
    }

    fn append_body(&mut self, chunk: &[u8]) -> Result<Option<CompletedFrame>> {
        let Phase::AwaitingBody {
            header,
            body,
            lines_seen,
        } = &mut self.phase
        else {
            return Err(WinstonError::MalformedResponse(
                "body bytes before header".into(),
            ));
        };
        let declared = header.value;

        let done = match self.kind {
            BodyKind::Bytes { .. } => {
                if body.len() + chunk.len() > declared {
                    return Err(WinstonError::MalformedResponse(format!(
                        "frame declared {declared} bytes, received {}",
                        body.len() + chunk.len()
                    )));
                }
                body.extend_from_slice(chunk);
                trace!(accumulated = body.len(), declared, "body chunk");
                body.len() == declared
            }
            BodyKind::Lines => {
                let mut done = false;
                for (i, &b) in chunk.iter().enumerate() {
                    if b != b'\n' {
                        continue;
                    }
                    *lines_seen += 1;
                    if *lines_seen == declared {
                        if i + 1 < chunk.len() {
                            return Err(WinstonError::MalformedResponse(format!(
                                "{} bytes after the final declared line",
                                chunk.len() - i - 1
                            )));
                        }
                        done = true;
                        break;
                    }
                }
                body.extend_from_slice(chunk);
                trace!(lines = *lines_seen, declared, "line chunk");
                done
            }
            BodyKind::None => {
                return Err(WinstonError::MalformedResponse(
                    "unexpected body for a header-only response".into(),
                ));
            }
        };

        if done { self.complete() } else { Ok(None) }
    }

    fn complete(&mut self) -> Result<Option<CompletedFrame>> {
        let Phase::AwaitingBody { header, body, .. } =
            std::mem::replace(&mut self.phase, Phase::Complete)
        else {
            return Err(WinstonError::MalformedResponse(
                "frame completed without a header".into(),
            ));
        };
        let body = match self.kind {
            BodyKind::Bytes { compressed: true } if !body.is_empty() => {
                frame::decompress(&body, self.max_decompressed_len)?
            }
            _ => body,
        };
        trace!(id = %header.token, bytes = body.len(), "frame complete");
        Ok(Some(CompletedFrame { header, body }))
    }
}
