//! Channel catalog model shared by dispatch and constraint evaluation.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, WinstonError};

/// Location code used when a request or catalog entry has no location.
pub const WILDCARD_LOCATION: &str = "--";

/// Station-Channel-Network-Location identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Scnl {
    pub station: String,
    pub channel: String,
    pub network: String,
    pub location: String,
}

impl Scnl {
    pub fn new(station: &str, channel: &str, network: &str, location: &str) -> Self {
        Self {
            station: station.to_owned(),
            channel: channel.to_owned(),
            network: network.to_owned(),
            location: normalize_location(location).to_owned(),
        }
    }

    /// SCN form: the location defaults to `--`.
    pub fn scn(station: &str, channel: &str, network: &str) -> Self {
        Self::new(station, channel, network, WILDCARD_LOCATION)
    }

    /// Storage key, e.g. `ABC$EHZ$XX$--`.
    pub fn code(&self) -> String {
        format!(
            "{}${}${}${}",
            self.station, self.channel, self.network, self.location
        )
    }

    /// Parse a `$`-separated storage key (3 or 4 parts).
    pub fn parse_code(code: &str) -> Result<Self> {
        let parts: Vec<&str> = code.split('$').collect();
        match parts.as_slice() {
            [s, c, n] if !s.is_empty() && !c.is_empty() && !n.is_empty() => Ok(Self::scn(s, c, n)),
            [s, c, n, l] if !s.is_empty() && !c.is_empty() && !n.is_empty() => {
                Ok(Self::new(s, c, n, l))
            }
            _ => Err(WinstonError::InvalidChannelCode(code.to_owned())),
        }
    }

    fn sort_key(&self) -> (&str, &str, &str, &str) {
        (&self.network, &self.station, &self.location, &self.channel)
    }
}

impl fmt::Display for Scnl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl PartialOrd for Scnl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by network, station, location, channel.
impl Ord for Scnl {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

fn normalize_location(location: &str) -> &str {
    if location.is_empty() {
        WILDCARD_LOCATION
    } else {
        location
    }
}

/// Physical instrument a channel belongs to.
///
/// Coordinates are independently optional; an absent value is unknown,
/// never a default coordinate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Instrument {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub height: Option<f64>,
    pub name: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

impl Instrument {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Self::default()
        }
    }

    /// Latitude and longitude, when both are known.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// A catalog channel. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct Channel {
    pub sid: u32,
    pub scnl: Scnl,
    pub min_time: Option<f64>,
    pub max_time: Option<f64>,
    pub instrument: Option<Arc<Instrument>>,
}

impl Channel {
    pub fn new(sid: u32, scnl: Scnl) -> Self {
        Self {
            sid,
            scnl,
            min_time: None,
            max_time: None,
            instrument: None,
        }
    }

    pub fn with_times(mut self, min_time: f64, max_time: f64) -> Self {
        self.min_time = Some(min_time);
        self.max_time = Some(max_time);
        self
    }

    pub fn with_instrument(mut self, instrument: Arc<Instrument>) -> Self {
        self.instrument = Some(instrument);
        self
    }

    pub fn code(&self) -> String {
        self.scnl.code()
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.instrument.as_ref().and_then(|i| i.coordinates())
    }

    /// `GETCHANNELS` descriptor line (no trailing newline).
    ///
    /// `sid:code:min:max:lon:lat:height`, then with `metadata` the instrument
    /// name, description and `key=value` pairs.
    pub fn to_wire_line(&self, metadata: bool) -> String {
        let instrument = self.instrument.as_deref();
        let mut line = format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.sid,
            self.code(),
            format_optional(self.min_time),
            format_optional(self.max_time),
            format_optional(instrument.and_then(|i| i.longitude)),
            format_optional(instrument.and_then(|i| i.latitude)),
            format_optional(instrument.and_then(|i| i.height)),
        );
        if metadata {
            let (name, description) = instrument
                .map(|i| (i.name.as_str(), i.description.as_str()))
                .unwrap_or_default();
            line.push(':');
            line.push_str(&sanitize_field(name));
            line.push(':');
            line.push_str(&sanitize_field(description));
            if let Some(i) = instrument {
                for (k, v) in &i.metadata {
                    line.push(':');
                    line.push_str(&sanitize_field(k));
                    line.push('=');
                    line.push_str(&sanitize_field(v));
                }
            }
        }
        line
    }

    /// Parse a `GETCHANNELS` descriptor line.
    pub fn parse_wire_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 7 {
            return Err(WinstonError::MalformedResponse(format!(
                "channel line needs 7 fields, got {}: {line:?}",
                fields.len()
            )));
        }
        let sid = fields[0].parse::<u32>().map_err(|_| {
            WinstonError::MalformedResponse(format!("invalid channel sid: {:?}", fields[0]))
        })?;
        let scnl = Scnl::parse_code(fields[1])?;
        let min_time = parse_optional(fields[2])?;
        let max_time = parse_optional(fields[3])?;
        let longitude = parse_optional(fields[4])?;
        let latitude = parse_optional(fields[5])?;
        let height = parse_optional(fields[6])?;

        let mut instrument = Instrument {
            latitude,
            longitude,
            height,
            ..Instrument::default()
        };
        if let Some(name) = fields.get(7) {
            instrument.name = (*name).to_owned();
        }
        if let Some(description) = fields.get(8) {
            instrument.description = (*description).to_owned();
        }
        for pair in fields.iter().skip(9) {
            if let Some((k, v)) = pair.split_once('=') {
                instrument.metadata.insert(k.to_owned(), v.to_owned());
            }
        }

        let has_instrument = fields.len() > 7
            || latitude.is_some()
            || longitude.is_some()
            || height.is_some();
        Ok(Self {
            sid,
            scnl,
            min_time,
            max_time,
            instrument: has_instrument.then(|| Arc::new(instrument)),
        })
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.scnl == other.scnl
    }
}

impl Eq for Channel {}

impl PartialOrd for Channel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Channel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.scnl.cmp(&other.scnl)
    }
}

fn format_optional(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => "NaN".to_owned(),
    }
}

fn parse_optional(field: &str) -> Result<Option<f64>> {
    if field.eq_ignore_ascii_case("nan") || field.is_empty() {
        return Ok(None);
    }
    field
        .parse::<f64>()
        .map(Some)
        .map_err(|_| WinstonError::MalformedResponse(format!("invalid number: {field:?}")))
}

fn sanitize_field(s: &str) -> String {
    s.replace([':', '\n', '\r'], " ")
}
