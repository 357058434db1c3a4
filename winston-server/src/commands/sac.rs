//! SAC (version 6) binary writer, big-endian.

use chrono::{Datelike, Timelike};
use winston_rs_protocol::time::j2k_to_datetime;
use winston_rs_protocol::{Scnl, Wave};

const FLOAT_FIELDS: usize = 70;
const INT_FIELDS: usize = 40;
const STRING_BYTES: usize = 192;
pub const HEADER_LEN: usize = FLOAT_FIELDS * 4 + INT_FIELDS * 4 + STRING_BYTES;

const UNDEF_F: f32 = -12345.0;
const UNDEF_I: i32 = -12345;
const UNDEF_K: &[u8] = b"-12345";

// Float header slots.
const DELTA: usize = 0;
const DEPMIN: usize = 1;
const DEPMAX: usize = 2;
const B: usize = 5;
const E: usize = 6;
const STLA: usize = 31;
const STLO: usize = 32;
const STEL: usize = 33;
const DEPMEN: usize = 56;

// Int header slots.
const NZYEAR: usize = 0;
const NZJDAY: usize = 1;
const NZHOUR: usize = 2;
const NZMIN: usize = 3;
const NZSEC: usize = 4;
const NZMSEC: usize = 5;
const NVHDR: usize = 6;
const NPTS: usize = 9;
const IFTYPE: usize = 15;
const IZTYPE: usize = 17;
const LEVEN: usize = 35;

const ITIME: i32 = 1;
const IB: i32 = 9;

// String header offsets: (offset, width).
const KSTNM: (usize, usize) = (0, 8);
const KHOLE: (usize, usize) = (24, 8);
const KCMPNM: (usize, usize) = (160, 8);
const KNETWK: (usize, usize) = (168, 8);

/// Encode `wave` as a SAC file. Gap samples are written as `0.0`.
///
/// `station` fills latitude, longitude and (when known) elevation.
pub fn write(wave: &Wave, scnl: &Scnl, station: Option<(f64, f64, Option<f64>)>) -> Vec<u8> {
    let mut floats = [UNDEF_F; FLOAT_FIELDS];
    let mut ints = [UNDEF_I; INT_FIELDS];
    let mut strings = [b' '; STRING_BYTES];
    for slot in strings.chunks_mut(8) {
        slot[..UNDEF_K.len()].copy_from_slice(UNDEF_K);
    }
    // kevnm is the one 16-byte field; its second half stays blank.
    strings[8 + UNDEF_K.len()..24].fill(b' ');

    let delta = 1.0 / wave.sample_rate;
    let data: Vec<f32> = wave
        .samples
        .iter()
        .map(|&s| if s == Wave::NO_DATA { 0.0 } else { s as f32 })
        .collect();
    let present: Vec<f64> = wave
        .samples
        .iter()
        .filter(|&&s| s != Wave::NO_DATA)
        .map(|&s| f64::from(s))
        .collect();

    floats[DELTA] = delta as f32;
    floats[B] = 0.0;
    floats[E] = (delta * wave.samples.len().saturating_sub(1) as f64) as f32;
    if !present.is_empty() {
        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        floats[DEPMIN] = min as f32;
        floats[DEPMAX] = max as f32;
        floats[DEPMEN] = mean as f32;
    }
    if let Some((lat, lon, elevation)) = station {
        floats[STLA] = lat as f32;
        floats[STLO] = lon as f32;
        if let Some(el) = elevation {
            floats[STEL] = el as f32;
        }
    }

    if let Some(t) = j2k_to_datetime(wave.start) {
        ints[NZYEAR] = t.year();
        ints[NZJDAY] = t.ordinal() as i32;
        ints[NZHOUR] = t.hour() as i32;
        ints[NZMIN] = t.minute() as i32;
        ints[NZSEC] = t.second() as i32;
        ints[NZMSEC] = (t.nanosecond() / 1_000_000).min(999) as i32;
    }
    ints[NVHDR] = 6;
    ints[NPTS] = data.len() as i32;
    ints[IFTYPE] = ITIME;
    ints[IZTYPE] = IB;
    ints[LEVEN] = 1;

    put_string(&mut strings, KSTNM, &scnl.station);
    put_string(&mut strings, KCMPNM, &scnl.channel);
    put_string(&mut strings, KNETWK, &scnl.network);
    if scnl.location != winston_rs_protocol::channel::WILDCARD_LOCATION {
        put_string(&mut strings, KHOLE, &scnl.location);
    }

    let mut out = Vec::with_capacity(HEADER_LEN + data.len() * 4);
    for f in floats {
        out.extend_from_slice(&f.to_be_bytes());
    }
    for i in ints {
        out.extend_from_slice(&i.to_be_bytes());
    }
    out.extend_from_slice(&strings);
    for d in data {
        out.extend_from_slice(&d.to_be_bytes());
    }
    out
}

fn put_string(strings: &mut [u8; STRING_BYTES], (offset, width): (usize, usize), value: &str) {
    let field = &mut strings[offset..offset + width];
    field.fill(b' ');
    let bytes = value.as_bytes();
    let n = bytes.len().min(width);
    field[..n].copy_from_slice(&bytes[..n]);
}
