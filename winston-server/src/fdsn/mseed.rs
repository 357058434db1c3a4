//! Uncompressed INT32 miniSEED 2.4 records for the dataselect stream.
//!
//! Records are built as [`MseedRecord`]s and serialized by `miniseed_rs`;
//! this module only slices packets and numbers the records.

use chrono::{Datelike, Timelike};
use miniseed_rs::{EncodingFormat, MseedError, MseedRecord, NanoTime, Samples};
use winston_rs_protocol::TracePacket;
use winston_rs_protocol::time::j2k_to_datetime;

pub const RECORD_LEN: usize = 512;
/// INT32 data follows blockette 1000 directly, at byte 56.
pub const SAMPLES_PER_RECORD: usize = (RECORD_LEN - 56) / 4;

const MAX_SEQUENCE: u32 = 999_999;

/// Numbers records across one response, wrapping after 999999.
#[derive(Debug)]
pub struct RecordWriter {
    sequence: u32,
}

impl Default for RecordWriter {
    fn default() -> Self {
        Self { sequence: 1 }
    }
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records for one packet, `SAMPLES_PER_RECORD` samples at a time.
    pub fn write_packet(&mut self, packet: &TracePacket) -> Result<Vec<u8>, MseedError> {
        let records = packet.samples.len().div_ceil(SAMPLES_PER_RECORD);
        let mut out = Vec::with_capacity(records * RECORD_LEN);
        for (i, chunk) in packet.samples.chunks(SAMPLES_PER_RECORD).enumerate() {
            let offset = (i * SAMPLES_PER_RECORD) as f64 / packet.sample_rate;
            let record = self.record(packet, packet.start + offset, chunk)?;
            out.extend_from_slice(&miniseed_rs::encode(&record)?);
        }
        Ok(out)
    }

    fn record(
        &mut self,
        packet: &TracePacket,
        start: f64,
        samples: &[i32],
    ) -> Result<MseedRecord, MseedError> {
        let scnl = &packet.scnl;
        let location = if scnl.location == "--" {
            ""
        } else {
            &scnl.location
        };
        let mut record = MseedRecord::new()
            .with_nslc(&scnl.network, &scnl.station, location, &scnl.channel)
            .with_start_time(nano_time(start)?)
            .with_sample_rate(packet.sample_rate)
            .with_encoding(EncodingFormat::Int32)
            .with_samples(Samples::Int(samples.to_vec()))
            .with_record_length(RECORD_LEN as u32);
        record.sequence_number = format!("{:06}", self.sequence);
        self.sequence = if self.sequence >= MAX_SEQUENCE {
            1
        } else {
            self.sequence + 1
        };
        Ok(record)
    }
}

/// J2K seconds as a record start time, rounded to BTIME's 100 µs ticks.
fn nano_time(j2k: f64) -> Result<NanoTime, MseedError> {
    let dt = j2k_to_datetime(j2k)
        .ok_or_else(|| MseedError::EncodeError(format!("start time {j2k} out of range")))?;
    let ticks = ((dt.nanosecond() + 50_000) / 100_000).min(9_999);
    Ok(NanoTime {
        year: dt.year() as u16,
        day: dt.ordinal() as u16,
        hour: dt.hour() as u8,
        minute: dt.minute() as u8,
        second: dt.second() as u8,
        nanosecond: ticks * 100_000,
    })
}
