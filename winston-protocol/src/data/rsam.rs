use std::collections::BTreeMap;

use crate::data::{BeReader, Wave};
use crate::error::{Result, WinstonError};

/// RSAM series: `(time, value)` rows, one per period bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RsamData {
    pub rows: Vec<(f64, f64)>,
}

impl RsamData {
    /// Mean absolute deviation from the bucket mean, per `period`-second bucket.
    ///
    /// Buckets are aligned to multiples of `period`; gap samples are skipped and
    /// buckets without samples are omitted.
    pub fn from_wave(wave: &Wave, period: f64) -> Result<Self> {
        if !(period.is_finite() && period > 0.0) {
            return Err(WinstonError::Codec(format!(
                "invalid RSAM period: {period}"
            )));
        }
        let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        for (i, &s) in wave.samples.iter().enumerate() {
            if s == Wave::NO_DATA {
                continue;
            }
            let bucket = (wave.time_of(i) / period).floor() as i64;
            buckets.entry(bucket).or_default().push(f64::from(s));
        }
        let rows = buckets
            .into_iter()
            .map(|(bucket, values)| {
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let mad = values.iter().map(|v| (v - mean).abs()).sum::<f64>() / n;
                (bucket as f64 * period, mad)
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn to_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.rows.len() * 16);
        out.extend_from_slice(&(self.rows.len() as i32).to_be_bytes());
        for (t, v) in &self.rows {
            out.extend_from_slice(&t.to_be_bytes());
            out.extend_from_slice(&v.to_be_bytes());
        }
        out
    }

    pub fn from_binary(buf: &[u8]) -> Result<Self> {
        let mut r = BeReader::new(buf);
        let n = r.count(16)?;
        let rows = (0..n)
            .map(|_| Ok((r.f64()?, r.f64()?)))
            .collect::<Result<Vec<_>>>()?;
        r.finish()?;
        Ok(Self { rows })
    }
}
