use std::collections::BTreeMap;

use crate::data::{BeReader, Wave};
use crate::error::{Result, WinstonError};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeliRow {
    pub time: f64,
    pub min: f64,
    pub max: f64,
}

/// Helicorder series: min/max envelope per bin.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HelicorderData {
    pub rows: Vec<HeliRow>,
}

impl HelicorderData {
    /// Bin width used by `GETSCNLHELIRAW`.
    pub const BIN_SECONDS: f64 = 1.0;

    pub fn from_wave(wave: &Wave, bin_seconds: f64) -> Result<Self> {
        if !(bin_seconds.is_finite() && bin_seconds > 0.0) {
            return Err(WinstonError::Codec(format!(
                "invalid helicorder bin: {bin_seconds}"
            )));
        }
        let mut bins: BTreeMap<i64, (i32, i32)> = BTreeMap::new();
        for (i, &s) in wave.samples.iter().enumerate() {
            if s == Wave::NO_DATA {
                continue;
            }
            let bin = (wave.time_of(i) / bin_seconds).floor() as i64;
            bins.entry(bin)
                .and_modify(|(lo, hi)| {
                    *lo = (*lo).min(s);
                    *hi = (*hi).max(s);
                })
                .or_insert((s, s));
        }
        let rows = bins
            .into_iter()
            .map(|(bin, (lo, hi))| HeliRow {
                time: bin as f64 * bin_seconds,
                min: f64::from(lo),
                max: f64::from(hi),
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn to_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.rows.len() * 24);
        out.extend_from_slice(&(self.rows.len() as i32).to_be_bytes());
        for row in &self.rows {
            out.extend_from_slice(&row.time.to_be_bytes());
            out.extend_from_slice(&row.min.to_be_bytes());
            out.extend_from_slice(&row.max.to_be_bytes());
        }
        out
    }

    pub fn from_binary(buf: &[u8]) -> Result<Self> {
        let mut r = BeReader::new(buf);
        let n = r.count(24)?;
        let rows = (0..n)
            .map(|_| {
                Ok(HeliRow {
                    time: r.f64()?,
                    min: r.f64()?,
                    max: r.f64()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        r.finish()?;
        Ok(Self { rows })
    }
}
