//! Channel selection predicates for the FDSN station and dataselect services.
//!
//! A [`ConstraintSet`] holds any number of name constraints (each optionally
//! carrying its own time window) plus one shared time and one shared
//! geographic constraint. A catalog channel passes when any name constraint
//! matches and the shared constraints, when present, also match.

use std::fmt;

use regex::Regex;
use winston_rs_protocol::{Channel, Scnl, TimeSpan, TracePacket};

#[derive(Debug, thiserror::Error)]
pub enum ConstraintError {
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// One SCNL field pattern. `None` matches everything.
#[derive(Clone, Debug)]
struct FieldPattern {
    source: String,
    regex: Option<Regex>,
}

impl FieldPattern {
    fn new(pattern: &str) -> Result<Self, ConstraintError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() || trimmed == "null" || trimmed == "*" {
            return Ok(Self {
                source: "*".to_owned(),
                regex: None,
            });
        }
        let regex = Regex::new(&wildcard_to_regex(trimmed)).map_err(|e| {
            ConstraintError::InvalidPattern {
                pattern: trimmed.to_owned(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            source: trimmed.to_owned(),
            regex: Some(regex),
        })
    }

    fn matches(&self, value: &str) -> bool {
        self.regex.as_ref().is_none_or(|r| r.is_match(value))
    }
}

/// `*` → `.*`, `?` → `.?`, everything else literal; anchored at both ends.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push_str(".?"),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

/// Name patterns for the four SCNL fields, plus an optional time window.
#[derive(Clone, Debug)]
pub struct ChannelConstraint {
    station: FieldPattern,
    channel: FieldPattern,
    network: FieldPattern,
    location: FieldPattern,
    time: Option<TimeConstraint>,
}

impl ChannelConstraint {
    /// Patterns use `*`/`?` wildcards; empty or `"null"` matches anything.
    pub fn new(
        station: &str,
        channel: &str,
        network: &str,
        location: &str,
    ) -> Result<Self, ConstraintError> {
        Ok(Self {
            station: FieldPattern::new(station)?,
            channel: FieldPattern::new(channel)?,
            network: FieldPattern::new(network)?,
            location: FieldPattern::new(location)?,
            time: None,
        })
    }

    pub fn with_time(mut self, time: TimeConstraint) -> Self {
        self.time = Some(time);
        self
    }

    pub fn time(&self) -> Option<&TimeConstraint> {
        self.time.as_ref()
    }

    pub fn matches_scnl(&self, scnl: &Scnl) -> bool {
        self.network.matches(&scnl.network)
            && self.station.matches(&scnl.station)
            && self.location.matches(&scnl.location)
            && self.channel.matches(&scnl.channel)
    }

    /// Names, then the attached time window against the catalog range.
    pub fn matches(&self, channel: &Channel) -> bool {
        self.matches_scnl(&channel.scnl)
            && self
                .time
                .as_ref()
                .is_none_or(|t| t.matches_range(channel.min_time, channel.max_time))
    }

    /// Names, then the attached time window against the packet's own
    /// first and last sample times.
    pub fn matches_packet(&self, packet: &TracePacket) -> bool {
        self.matches_scnl(&packet.scnl)
            && self.time.as_ref().is_none_or(|t| {
                t.matches_range(Some(packet.start), Some(packet.last_sample_time()))
            })
    }
}

impl fmt::Display for ChannelConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network.source, self.station.source, self.location.source, self.channel.source
        )
    }
}

/// Temporal filter over a `[min, max]` data range. Unknown bounds never exclude.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeConstraint {
    /// Inclusive window the data range must intersect.
    Simple { start: f64, end: f64 },
    /// The range start must lie in `[start_after, start_before]` and its end
    /// in `[end_after, end_before]`.
    Window {
        start_before: f64,
        start_after: f64,
        end_before: f64,
        end_after: f64,
    },
}

impl TimeConstraint {
    /// Simple window; absent bounds are open.
    pub fn simple(start: Option<f64>, end: Option<f64>) -> Self {
        Self::Simple {
            start: start.unwrap_or(f64::NEG_INFINITY),
            end: end.unwrap_or(f64::INFINITY),
        }
    }

    /// Four-sided window; absent bounds are open.
    pub fn window(
        start_before: Option<f64>,
        start_after: Option<f64>,
        end_before: Option<f64>,
        end_after: Option<f64>,
    ) -> Self {
        Self::Window {
            start_before: start_before.unwrap_or(f64::INFINITY),
            start_after: start_after.unwrap_or(f64::NEG_INFINITY),
            end_before: end_before.unwrap_or(f64::INFINITY),
            end_after: end_after.unwrap_or(f64::NEG_INFINITY),
        }
    }

    /// Span used to fetch data for this constraint, clipped to `available`.
    pub fn fetch_span(&self, available: TimeSpan) -> TimeSpan {
        match *self {
            Self::Simple { start, end } => {
                TimeSpan::new(start.max(available.start), end.min(available.end))
            }
            Self::Window { .. } => available,
        }
    }

    pub fn matches_range(&self, min: Option<f64>, max: Option<f64>) -> bool {
        let min = min.filter(|t| !t.is_nan());
        let max = max.filter(|t| !t.is_nan());
        match *self {
            Self::Simple { start, end } => {
                min.is_none_or(|m| m <= end) && max.is_none_or(|m| m >= start)
            }
            Self::Window {
                start_before,
                start_after,
                end_before,
                end_after,
            } => {
                min.is_none_or(|m| m >= start_after && m <= start_before)
                    && max.is_none_or(|m| m >= end_after && m <= end_before)
            }
        }
    }
}

/// Geographic filter over instrument coordinates. Channels without
/// coordinates never match.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GeoConstraint {
    /// Great-circle distance from the center, in degrees, within `[min_radius, max_radius]`.
    Circle {
        latitude: f64,
        longitude: f64,
        min_radius: f64,
        max_radius: f64,
    },
    /// Latitude and longitude ranges; a longitude range with `min > max`
    /// crosses the antimeridian.
    Box {
        min_latitude: f64,
        max_latitude: f64,
        min_longitude: f64,
        max_longitude: f64,
    },
}

impl GeoConstraint {
    pub fn circle(
        latitude: f64,
        longitude: f64,
        min_radius: Option<f64>,
        max_radius: Option<f64>,
    ) -> Self {
        Self::Circle {
            latitude,
            longitude,
            min_radius: min_radius.unwrap_or(0.0),
            max_radius: max_radius.unwrap_or(180.0),
        }
    }

    pub fn bounding_box(
        min_latitude: Option<f64>,
        max_latitude: Option<f64>,
        min_longitude: Option<f64>,
        max_longitude: Option<f64>,
    ) -> Self {
        Self::Box {
            min_latitude: min_latitude.unwrap_or(-90.0),
            max_latitude: max_latitude.unwrap_or(90.0),
            min_longitude: min_longitude.unwrap_or(-180.0),
            max_longitude: max_longitude.unwrap_or(180.0),
        }
    }

    pub fn matches(&self, channel: &Channel) -> bool {
        let Some((lat, lon)) = channel.coordinates() else {
            return false;
        };
        match *self {
            Self::Circle {
                latitude,
                longitude,
                min_radius,
                max_radius,
            } => {
                let d = great_circle_degrees(latitude, longitude, lat, lon);
                d >= min_radius && d <= max_radius
            }
            Self::Box {
                min_latitude,
                max_latitude,
                min_longitude,
                max_longitude,
            } => {
                let lat_ok = lat >= min_latitude && lat <= max_latitude;
                let lon_ok = if min_longitude <= max_longitude {
                    lon >= min_longitude && lon <= max_longitude
                } else {
                    lon >= min_longitude || lon <= max_longitude
                };
                lat_ok && lon_ok
            }
        }
    }
}

/// Haversine central angle between two points, in degrees.
pub fn great_circle_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = (lat2 - lat1).to_radians();
    let dl = (lon2 - lon1).to_radians();
    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    (2.0 * a.sqrt().min(1.0).asin()).to_degrees()
}

/// The active constraints of one request. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct ConstraintSet {
    pub channels: Vec<ChannelConstraint>,
    pub time: Option<TimeConstraint>,
    pub geo: Option<GeoConstraint>,
}

impl ConstraintSet {
    /// One constraint per (net, sta, loc, cha) tuple of the comma-split
    /// lists. Blank and `null` entries are dropped; an empty list becomes `*`.
    pub fn cartesian(
        networks: &str,
        stations: &str,
        locations: &str,
        channels: &str,
    ) -> Result<Vec<ChannelConstraint>, ConstraintError> {
        let (nets, stas, locs, chas) = (
            split_list(networks),
            split_list(stations),
            split_list(locations),
            split_list(channels),
        );
        let mut out = Vec::with_capacity(nets.len() * stas.len() * locs.len() * chas.len());
        for net in &nets {
            for sta in &stas {
                for loc in &locs {
                    for cha in &chas {
                        out.push(ChannelConstraint::new(sta, cha, net, loc)?);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Name (any of), shared time, shared geography.
    pub fn matches(&self, channel: &Channel) -> bool {
        (self.channels.is_empty() || self.channels.iter().any(|c| c.matches(channel)))
            && self
                .time
                .as_ref()
                .is_none_or(|t| t.matches_range(channel.min_time, channel.max_time))
            && self.geo.as_ref().is_none_or(|g| g.matches(channel))
    }

    /// Matching channels, sorted by identity.
    pub fn filter(&self, channels: Vec<Channel>) -> Vec<Channel> {
        let mut out: Vec<Channel> = channels.into_iter().filter(|c| self.matches(c)).collect();
        out.sort();
        out
    }

    /// The first name constraint (in request order) accepting `channel`.
    pub fn first_match(&self, channel: &Channel) -> Option<&ChannelConstraint> {
        self.channels.iter().find(|c| c.matches(channel))
    }

    /// The first name constraint (in request order) accepting `packet`.
    pub fn first_packet_match(&self, packet: &TracePacket) -> Option<&ChannelConstraint> {
        self.channels.iter().find(|c| c.matches_packet(packet))
    }
}

fn split_list(list: &str) -> Vec<&str> {
    let items: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "null")
        .collect();
    if items.is_empty() { vec!["*"] } else { items }
}
