//! Binary and text payload codecs carried inside response frames.

pub mod heli;
pub mod menu;
pub mod packet;
pub mod rsam;
pub mod wave;

pub use heli::{HeliRow, HelicorderData};
pub use menu::MenuEntry;
pub use packet::TracePacket;
pub use rsam::RsamData;
pub use wave::Wave;

use crate::error::{Result, WinstonError};

/// Big-endian cursor over a completed payload.
pub(crate) struct BeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BeReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(WinstonError::Codec(format!(
                "payload truncated: need {end} bytes, have {}",
                self.buf.len()
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_be_bytes(raw))
    }

    /// Row count prefix; rejects negatives and counts the payload cannot hold.
    pub fn count(&mut self, row_len: usize) -> Result<usize> {
        let n = self.i32()?;
        let n = usize::try_from(n)
            .map_err(|_| WinstonError::Codec(format!("negative row count: {n}")))?;
        if n.saturating_mul(row_len) > self.remaining() {
            return Err(WinstonError::Codec(format!(
                "row count {n} exceeds payload ({} bytes left)",
                self.remaining()
            )));
        }
        Ok(n)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(WinstonError::Codec(format!(
                "{} trailing bytes in payload",
                self.remaining()
            )));
        }
        Ok(())
    }
}
