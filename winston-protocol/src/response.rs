//! Typed decoding of completed response frames.

use crate::channel::Channel;
use crate::data::{HelicorderData, MenuEntry, RsamData, TracePacket, Wave};
use crate::error::{Result, WinstonError};
use crate::reassembler::{BodyKind, CompletedFrame};

/// Expected shape of the answer to a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    Version,
    Menu,
    Channels,
    Wave { compressed: bool },
    Packets,
    Rsam { compressed: bool },
    Helicorder { compressed: bool },
    Text,
    Raw,
}

impl ResponseKind {
    pub fn body_kind(self) -> BodyKind {
        match self {
            Self::Version => BodyKind::None,
            Self::Menu | Self::Channels => BodyKind::Lines,
            Self::Wave { compressed }
            | Self::Rsam { compressed }
            | Self::Helicorder { compressed } => BodyKind::Bytes { compressed },
            Self::Packets | Self::Text | Self::Raw => BodyKind::Bytes { compressed: false },
        }
    }

    /// Decode a completed frame as this kind.
    ///
    /// A zero-length binary body means "no data" and decodes to
    /// [`Response::Empty`]; zero lines decode to an empty list.
    pub fn decode(self, frame: CompletedFrame) -> Result<Response> {
        let CompletedFrame { header, body } = frame;
        match self {
            Self::Version => u32::try_from(header.value)
                .map(Response::Version)
                .map_err(|_| {
                    WinstonError::MalformedResponse(format!(
                        "version out of range: {}",
                        header.value
                    ))
                }),
            Self::Menu => Ok(Response::Menu(
                lines(&body)?
                    .map(MenuEntry::parse_line)
                    .collect::<Result<_>>()?,
            )),
            Self::Channels => Ok(Response::Channels(
                lines(&body)?
                    .map(Channel::parse_wire_line)
                    .collect::<Result<_>>()?,
            )),
            _ if body.is_empty() => Ok(Response::Empty),
            Self::Wave { .. } => Ok(Response::Wave(Wave::from_binary(&body)?)),
            Self::Packets => Ok(Response::Packets(TracePacket::parse_all(&body)?)),
            Self::Rsam { .. } => Ok(Response::Rsam(RsamData::from_binary(&body)?)),
            Self::Helicorder { .. } => {
                Ok(Response::Helicorder(HelicorderData::from_binary(&body)?))
            }
            Self::Text => String::from_utf8(body)
                .map(Response::Text)
                .map_err(|_| WinstonError::MalformedResponse("text body is not UTF-8".into())),
            Self::Raw => Ok(Response::Raw(body)),
        }
    }
}

fn lines(body: &[u8]) -> Result<impl Iterator<Item = &str>> {
    let text = std::str::from_utf8(body)
        .map_err(|_| WinstonError::MalformedResponse("line body is not UTF-8".into()))?;
    Ok(text.lines())
}

/// A decoded server answer.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Version(u32),
    Menu(Vec<MenuEntry>),
    Channels(Vec<Channel>),
    Wave(Wave),
    Packets(Vec<TracePacket>),
    Rsam(RsamData),
    Helicorder(HelicorderData),
    Text(String),
    Raw(Vec<u8>),
    /// Zero-length payload: unknown channel or no data.
    Empty,
}

impl Response {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
