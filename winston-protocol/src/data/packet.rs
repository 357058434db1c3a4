//! Fixed-format trace packets (TRACEBUF2 layout, big-endian `s4` samples).

use crate::channel::Scnl;
use crate::data::{BeReader, Wave};
use crate::error::{Result, WinstonError};

pub const HEADER_LEN: usize = 64;

const STA_LEN: usize = 7;
const NET_LEN: usize = 9;
const CHAN_LEN: usize = 4;
const LOC_LEN: usize = 3;
const VERSION: &[u8; 2] = b"20";
const DATATYPE: &[u8; 3] = b"s4\0";

/// A chunk of contiguous samples with embedded SCNL and timing.
#[derive(Clone, Debug, PartialEq)]
pub struct TracePacket {
    pub pin: i32,
    pub scnl: Scnl,
    pub start: f64,
    pub sample_rate: f64,
    pub samples: Vec<i32>,
}

impl TracePacket {
    pub fn new(scnl: Scnl, start: f64, sample_rate: f64, samples: Vec<i32>) -> Self {
        Self {
            pin: 0,
            scnl,
            start,
            sample_rate,
            samples,
        }
    }

    /// Time of the last sample.
    pub fn last_sample_time(&self) -> f64 {
        let n = self.samples.len().saturating_sub(1);
        self.start + n as f64 / self.sample_rate
    }

    /// End of the interval covered by this packet (one period after the last sample).
    pub fn end(&self) -> f64 {
        self.start + self.samples.len() as f64 / self.sample_rate
    }

    pub fn to_wave(&self) -> Wave {
        Wave::new(self.start, self.sample_rate, self.samples.clone())
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.samples.len() * 4
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        out.extend_from_slice(&self.pin.to_be_bytes());
        out.extend_from_slice(&(self.samples.len() as i32).to_be_bytes());
        out.extend_from_slice(&self.start.to_be_bytes());
        out.extend_from_slice(&self.last_sample_time().to_be_bytes());
        out.extend_from_slice(&self.sample_rate.to_be_bytes());
        put_fixed(out, &self.scnl.station, STA_LEN);
        put_fixed(out, &self.scnl.network, NET_LEN);
        put_fixed(out, &self.scnl.channel, CHAN_LEN);
        put_fixed(out, &self.scnl.location, LOC_LEN);
        out.extend_from_slice(VERSION);
        out.extend_from_slice(DATATYPE);
        out.extend_from_slice(&[0u8; 4]); // quality + pad
        for s in &self.samples {
            out.extend_from_slice(&s.to_be_bytes());
        }
    }

    pub fn to_binary(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    /// Decode one packet from the front of `buf`; returns it with the bytes consumed.
    pub fn from_binary(buf: &[u8]) -> Result<(Self, usize)> {
        let mut r = BeReader::new(buf);
        let pin = r.i32()?;
        let nsamp = r.i32()?;
        let start = r.f64()?;
        let _end = r.f64()?;
        let sample_rate = r.f64()?;
        let station = get_fixed(r.take(STA_LEN)?);
        let network = get_fixed(r.take(NET_LEN)?);
        let channel = get_fixed(r.take(CHAN_LEN)?);
        let location = get_fixed(r.take(LOC_LEN)?);
        let _version = r.take(2)?;
        let datatype = r.take(3)?;
        let _quality_pad = r.take(4)?;

        if datatype != DATATYPE {
            return Err(WinstonError::Codec(format!(
                "unsupported trace datatype: {:?}",
                String::from_utf8_lossy(datatype)
            )));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(WinstonError::Codec(format!(
                "invalid sample rate: {sample_rate}"
            )));
        }
        let n = usize::try_from(nsamp)
            .map_err(|_| WinstonError::Codec(format!("negative sample count: {nsamp}")))?;
        if n * 4 > r.remaining() {
            return Err(WinstonError::Codec(format!(
                "trace packet declares {n} samples, {} bytes left",
                r.remaining()
            )));
        }
        let samples = (0..n).map(|_| r.i32()).collect::<Result<Vec<_>>>()?;

        let packet = Self {
            pin,
            scnl: Scnl::new(&station, &channel, &network, &location),
            start,
            sample_rate,
            samples,
        };
        Ok((packet, HEADER_LEN + n * 4))
    }

    /// Decode a concatenation of packets.
    pub fn parse_all(mut buf: &[u8]) -> Result<Vec<Self>> {
        let mut packets = Vec::new();
        while !buf.is_empty() {
            let (packet, used) = Self::from_binary(buf)?;
            packets.push(packet);
            buf = &buf[used..];
        }
        Ok(packets)
    }
}

fn put_fixed(out: &mut Vec<u8>, s: &str, len: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(len - 1);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + (len - n), 0);
}

fn get_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> TracePacket {
        TracePacket::new(
            Scnl::new("ABC", "EHZ", "XX", "--"),
            100.0,
            50.0,
            vec![1, -2, 3, i32::MAX],
        )
    }

    #[test]
    fn header_is_64_bytes() {
        let p = packet();
        let bin = p.to_binary();
        assert_eq!(bin.len(), HEADER_LEN + 16);
        assert_eq!(&bin[32..36], b"ABC\0");
        assert_eq!(&bin[39..42], b"XX\0");
        assert_eq!(&bin[48..52], b"EHZ\0");
        assert_eq!(&bin[52..55], b"--\0");
        assert_eq!(&bin[57..60], b"s4\0");
    }

    #[test]
    fn timing() {
        let p = packet();
        assert!((p.last_sample_time() - 100.06).abs() < 1e-9);
        assert!((p.end() - 100.08).abs() < 1e-9);
    }

    #[test]
    fn decode_concatenated() {
        let a = packet();
        let mut b = packet();
        b.start = 100.08;
        b.scnl = Scnl::new("LONGSTA", "HHN", "NETWORKXX", "00");
        let mut buf = a.to_binary();
        b.write_to(&mut buf);

        let decoded = TracePacket::parse_all(&buf).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], a);
        // fixed-width fields truncate
        assert_eq!(decoded[1].scnl.station, "LONGST");
        assert_eq!(decoded[1].scnl.network, "NETWORKX");
        assert_eq!(decoded[1].samples, b.samples);
    }

    #[test]
    fn truncated_samples() {
        let bin = packet().to_binary();
        assert!(matches!(
            TracePacket::from_binary(&bin[..bin.len() - 2]),
            Err(WinstonError::Codec(_))
        ));
    }

    #[test]
    fn wrong_datatype() {
        let mut bin = packet().to_binary();
        bin[57] = b'i';
        assert!(TracePacket::from_binary(&bin).is_err());
    }
}
