use crate::data::BeReader;
use crate::error::{Result, WinstonError};
use crate::time::TimeSpan;

const HEADER_LEN: usize = 28;

/// Contiguous evenly-sampled waveform.
///
/// Sample `i` is at `start + i / sample_rate`; the wave covers
/// `[start, start + len / sample_rate)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Wave {
    pub start: f64,
    pub sample_rate: f64,
    pub registration_offset: f64,
    pub samples: Vec<i32>,
}

impl Wave {
    /// Fill value for gaps.
    pub const NO_DATA: i32 = i32::MIN;

    pub fn new(start: f64, sample_rate: f64, samples: Vec<i32>) -> Self {
        Self {
            start,
            sample_rate,
            registration_offset: 0.0,
            samples,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.samples.len() as f64 / self.sample_rate
    }

    pub fn span(&self) -> TimeSpan {
        TimeSpan::new(self.start, self.end())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of sample `i`.
    pub fn time_of(&self, i: usize) -> f64 {
        self.start + i as f64 / self.sample_rate
    }

    /// Samples whose time falls in `[start, end)`.
    pub fn slice(&self, start: f64, end: f64) -> Wave {
        let len = self.samples.len();
        let first = self.index_at(start).min(len);
        let last = self.index_at(end).clamp(first, len);
        Wave {
            start: self.time_of(first),
            sample_rate: self.sample_rate,
            registration_offset: self.registration_offset,
            samples: self.samples[first..last].to_vec(),
        }
    }

    /// First sample index at or after `t`.
    fn index_at(&self, t: f64) -> usize {
        let raw = ((t - self.start) * self.sample_rate - 1e-6).ceil();
        if raw <= 0.0 { 0 } else { raw as usize }
    }

    /// Join waves of the same sample rate in time order, filling gaps with
    /// [`NO_DATA`](Self::NO_DATA). Overlapping samples keep the earlier wave's values.
    pub fn join(waves: &[Wave]) -> Option<Wave> {
        let mut sorted: Vec<&Wave> = waves.iter().filter(|w| !w.is_empty()).collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
        let first = *sorted.first()?;
        let rate = first.sample_rate;
        let start = first.start;
        let end = sorted.iter().map(|w| w.end()).fold(f64::MIN, f64::max);
        let total = ((end - start) * rate).round() as usize;

        let mut samples = vec![Self::NO_DATA; total];
        let mut filled = vec![false; total];
        for w in sorted {
            let offset = ((w.start - start) * rate).round() as usize;
            for (i, &s) in w.samples.iter().enumerate() {
                let idx = offset + i;
                if idx < total && !filled[idx] {
                    samples[idx] = s;
                    filled[idx] = true;
                }
            }
        }
        Some(Wave {
            start,
            sample_rate: rate,
            registration_offset: first.registration_offset,
            samples,
        })
    }

    pub fn to_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.samples.len() * 4);
        out.extend_from_slice(&self.start.to_be_bytes());
        out.extend_from_slice(&self.sample_rate.to_be_bytes());
        out.extend_from_slice(&self.registration_offset.to_be_bytes());
        out.extend_from_slice(&(self.samples.len() as i32).to_be_bytes());
        for s in &self.samples {
            out.extend_from_slice(&s.to_be_bytes());
        }
        out
    }

    pub fn from_binary(buf: &[u8]) -> Result<Self> {
        let mut r = BeReader::new(buf);
        let start = r.f64()?;
        let sample_rate = r.f64()?;
        let registration_offset = r.f64()?;
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(WinstonError::Codec(format!(
                "invalid sample rate: {sample_rate}"
            )));
        }
        let n = r.count(4)?;
        let samples = (0..n).map(|_| r.i32()).collect::<Result<Vec<_>>>()?;
        r.finish()?;
        Ok(Self {
            start,
            sample_rate,
            registration_offset,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: f64, rate: f64, n: i32) -> Wave {
        Wave::new(start, rate, (0..n).collect())
    }

    #[test]
    fn end_from_sample_count() {
        let w = ramp(0.0, 1.0, 100);
        assert_eq!(w.span(), TimeSpan::new(0.0, 100.0));
        assert_eq!(ramp(10.0, 50.0, 100).end(), 12.0);
    }

    #[test]
    fn slice_window() {
        let w = ramp(0.0, 1.0, 100);
        let s = w.slice(10.0, 20.0);
        assert_eq!(s.start, 10.0);
        assert_eq!(s.samples, (10..20).collect::<Vec<_>>());
        assert_eq!(s.end(), 20.0);

        let all = w.slice(-50.0, 500.0);
        assert_eq!(all.samples.len(), 100);

        let none = w.slice(200.0, 300.0);
        assert!(none.is_empty());
    }

    #[test]
    fn slice_between_samples() {
        let w = ramp(0.0, 2.0, 10);
        let s = w.slice(0.25, 1.75);
        assert_eq!(s.start, 0.5);
        assert_eq!(s.samples, vec![1, 2, 3]);
    }

    #[test]
    fn join_fills_gaps() {
        let a = ramp(0.0, 1.0, 3);
        let b = Wave::new(5.0, 1.0, vec![7, 8]);
        let joined = Wave::join(&[b, a]).unwrap();
        assert_eq!(joined.start, 0.0);
        assert_eq!(
            joined.samples,
            vec![0, 1, 2, Wave::NO_DATA, Wave::NO_DATA, 7, 8]
        );
    }

    #[test]
    fn join_overlap_keeps_earlier() {
        let a = Wave::new(0.0, 1.0, vec![1, 1, 1]);
        let b = Wave::new(2.0, 1.0, vec![9, 9]);
        let joined = Wave::join(&[a, b]).unwrap();
        assert_eq!(joined.samples, vec![1, 1, 1, 9]);
    }

    #[test]
    fn join_takes_earliest_registration_offset() {
        let mut early = ramp(0.0, 1.0, 2);
        early.registration_offset = 0.25;
        let mut late = ramp(4.0, 1.0, 2);
        late.registration_offset = 0.75;
        let joined = Wave::join(&[late, early]).unwrap();
        assert_eq!(joined.registration_offset, 0.25);
        assert_eq!(joined.samples.len(), 6);
    }

    #[test]
    fn join_empty() {
        assert!(Wave::join(&[]).is_none());
    }

    #[test]
    fn binary_layout() {
        let w = Wave::new(1.5, 100.0, vec![-1, 2]);
        let bin = w.to_binary();
        assert_eq!(bin.len(), 28 + 8);
        assert_eq!(&bin[24..28], &2i32.to_be_bytes());
        assert_eq!(Wave::from_binary(&bin).unwrap(), w);
    }

    #[test]
    fn truncated_binary_is_codec_failure() {
        let bin = Wave::new(0.0, 1.0, vec![1, 2, 3]).to_binary();
        assert!(matches!(
            Wave::from_binary(&bin[..bin.len() - 1]),
            Err(WinstonError::Codec(_))
        ));
        let mut extra = bin.clone();
        extra.push(0);
        assert!(Wave::from_binary(&extra).is_err());
    }

    #[test]
    fn zero_rate_rejected() {
        let bin = Wave::new(0.0, 0.0, vec![]).to_binary();
        assert!(Wave::from_binary(&bin).is_err());
    }
}
