//! FDSN query parameters: GET query strings and POST selection bodies.

use axum::http::StatusCode;
use winston_rs_protocol::time::parse_fdsn_time;

use super::error::FdsnRequestError;
use crate::constraint::{ChannelConstraint, ConstraintSet, GeoConstraint, TimeConstraint};

type Result<T> = std::result::Result<T, FdsnRequestError>;

/// Which service a query is addressed to. Decides the accepted
/// `format` values and whether a time window is mandatory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    Station,
    Dataselect,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Level {
    Network,
    #[default]
    Station,
    Channel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Text,
    Xml,
    Miniseed,
}

/// A fully parsed request.
#[derive(Debug)]
pub struct FdsnQuery {
    pub constraints: ConstraintSet,
    pub level: Level,
    pub format: Format,
    /// Status for an empty result: 204 or 404.
    pub nodata: StatusCode,
}

/// Accepted and ignored: they select features this server has no data for.
const IGNORED: &[&str] = &[
    "quality",
    "minimumlength",
    "longestonly",
    "includerestricted",
    "includeavailability",
    "matchtimeseries",
    "updatedafter",
];

#[derive(Default)]
struct Params {
    network: Vec<String>,
    station: Vec<String>,
    location: Vec<String>,
    channel: Vec<String>,
    start: Option<f64>,
    end: Option<f64>,
    start_before: Option<f64>,
    start_after: Option<f64>,
    end_before: Option<f64>,
    end_after: Option<f64>,
    min_latitude: Option<f64>,
    max_latitude: Option<f64>,
    min_longitude: Option<f64>,
    max_longitude: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    min_radius: Option<f64>,
    max_radius: Option<f64>,
    level: Option<Level>,
    format: Option<Format>,
    nodata: Option<StatusCode>,
}

impl Params {
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key.to_ascii_lowercase().as_str() {
            "net" | "network" => self.network.push(value.to_owned()),
            "sta" | "station" => self.station.push(value.to_owned()),
            "loc" | "location" => self.location.push(value.to_owned()),
            "cha" | "channel" => self.channel.push(value.to_owned()),
            "start" | "starttime" => self.start = Some(time(key, value)?),
            "end" | "endtime" => self.end = Some(time(key, value)?),
            "startbefore" => self.start_before = Some(time(key, value)?),
            "startafter" => self.start_after = Some(time(key, value)?),
            "endbefore" => self.end_before = Some(time(key, value)?),
            "endafter" => self.end_after = Some(time(key, value)?),
            "minlat" | "minlatitude" => self.min_latitude = Some(number(key, value)?),
            "maxlat" | "maxlatitude" => self.max_latitude = Some(number(key, value)?),
            "minlon" | "minlongitude" => self.min_longitude = Some(number(key, value)?),
            "maxlon" | "maxlongitude" => self.max_longitude = Some(number(key, value)?),
            "lat" | "latitude" => self.latitude = Some(number(key, value)?),
            "lon" | "longitude" => self.longitude = Some(number(key, value)?),
            "minradius" => self.min_radius = Some(number(key, value)?),
            "maxradius" => self.max_radius = Some(number(key, value)?),
            "level" => {
                self.level = Some(match value.to_ascii_lowercase().as_str() {
                    "network" => Level::Network,
                    "station" => Level::Station,
                    "channel" | "response" => Level::Channel,
                    _ => return Err(invalid(key, value)),
                })
            }
            "format" => {
                self.format = Some(match value.to_ascii_lowercase().as_str() {
                    "text" => Format::Text,
                    "xml" => Format::Xml,
                    "miniseed" | "mseed" => Format::Miniseed,
                    _ => return Err(invalid(key, value)),
                })
            }
            "nodata" => {
                self.nodata = Some(match value {
                    "204" => StatusCode::NO_CONTENT,
                    "404" => StatusCode::NOT_FOUND,
                    _ => return Err(invalid(key, value)),
                })
            }
            k if IGNORED.contains(&k) => {}
            _ => {
                let what = format!("unknown parameter: {key}");
                return Err(FdsnRequestError::bad_request(what));
            }
        }
        Ok(())
    }

    fn time_constraint(&self) -> Result<Option<TimeConstraint>> {
        let window = [
            self.start_before,
            self.start_after,
            self.end_before,
            self.end_after,
        ];
        let has_window = window.iter().any(Option::is_some);
        let has_simple = self.start.is_some() || self.end.is_some();
        match (has_simple, has_window) {
            (true, true) => Err(FdsnRequestError::bad_request(concat!(
                "starttime/endtime cannot be combined with ",
                "startbefore/startafter/endbefore/endafter"
            ))),
            (true, false) => {
                if let (Some(s), Some(e)) = (self.start, self.end) {
                    if s > e {
                        return Err(FdsnRequestError::bad_request("starttime is after endtime"));
                    }
                }
                Ok(Some(TimeConstraint::simple(self.start, self.end)))
            }
            (false, true) => Ok(Some(TimeConstraint::window(
                self.start_before,
                self.start_after,
                self.end_before,
                self.end_after,
            ))),
            (false, false) => Ok(None),
        }
    }

    /// A circle wins over a box when parameters for both are present.
    fn geo_constraint(&self) -> Option<GeoConstraint> {
        let circle = [
            self.latitude,
            self.longitude,
            self.min_radius,
            self.max_radius,
        ];
        if circle.iter().any(Option::is_some) {
            return Some(GeoConstraint::circle(
                self.latitude.unwrap_or(0.0),
                self.longitude.unwrap_or(0.0),
                self.min_radius,
                self.max_radius,
            ));
        }
        let bounds = [
            self.min_latitude,
            self.max_latitude,
            self.min_longitude,
            self.max_longitude,
        ];
        bounds.iter().any(Option::is_some).then(|| {
            GeoConstraint::bounding_box(
                self.min_latitude,
                self.max_latitude,
                self.min_longitude,
                self.max_longitude,
            )
        })
    }

    fn format(&self, service: Service) -> Result<Format> {
        match (service, self.format) {
            (Service::Station, None) => Ok(Format::Text),
            (Service::Dataselect, None) => Ok(Format::Miniseed),
            (Service::Station, Some(f @ (Format::Text | Format::Xml))) => Ok(f),
            (Service::Dataselect, Some(Format::Miniseed)) => Ok(Format::Miniseed),
            (_, Some(f)) => Err(FdsnRequestError::bad_request(format!(
                "format {f:?} is not supported by this service"
            ))),
        }
    }

    fn finish(self, service: Service, channels: Vec<ChannelConstraint>) -> Result<FdsnQuery> {
        let format = self.format(service)?;
        Ok(FdsnQuery {
            constraints: ConstraintSet {
                channels,
                time: self.time_constraint()?,
                geo: self.geo_constraint(),
            },
            level: self.level.unwrap_or_default(),
            format,
            nodata: self.nodata.unwrap_or(StatusCode::NO_CONTENT),
        })
    }
}

fn number(key: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(key, value))
}

fn time(key: &str, value: &str) -> Result<f64> {
    parse_fdsn_time(value).map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> FdsnRequestError {
    FdsnRequestError::bad_request(format!("invalid value for {key}: {value:?}"))
}

impl FdsnQuery {
    /// Decoded GET pairs. The four name lists expand into their Cartesian
    /// product; a dataselect query needs both ends of a simple time window.
    pub fn from_pairs(pairs: &[(String, String)], service: Service) -> Result<Self> {
        let mut params = Params::default();
        for (key, value) in pairs {
            params.set(key, value)?;
        }
        if service == Service::Dataselect && (params.start.is_none() || params.end.is_none()) {
            return Err(FdsnRequestError::bad_request(
                "dataselect requires starttime and endtime",
            ));
        }
        let channels = ConstraintSet::cartesian(
            &params.network.join(","),
            &params.station.join(","),
            &params.location.join(","),
            &params.channel.join(","),
        )?;
        params.finish(service, channels)
    }

    /// A POST body: `key=value` lines, then one
    /// `NET STA LOC CHA START END` line per stream. Each stream line becomes
    /// one constraint carrying its own time window.
    pub fn from_post_body(body: &str, service: Service) -> Result<Self> {
        let mut params = Params::default();
        let mut channels = Vec::new();
        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if channels.is_empty() {
                if let Some((key, value)) = line.split_once('=') {
                    params.set(key.trim(), value)?;
                    continue;
                }
            }
            channels.push(stream_line(line)?);
        }
        if channels.is_empty() {
            return Err(FdsnRequestError::bad_request(
                "POST body selects no streams",
            ));
        }
        params.finish(service, channels)
    }
}

fn stream_line(line: &str) -> Result<ChannelConstraint> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [net, sta, loc, cha, start, end] = fields.as_slice() else {
        return Err(FdsnRequestError::bad_request(format!(
            "expected NET STA LOC CHA START END, got {line:?}"
        )));
    };
    let start = parse_fdsn_time(start).map_err(|_| invalid("start", start))?;
    let end = parse_fdsn_time(end).map_err(|_| invalid("end", end))?;
    if start > end {
        return Err(FdsnRequestError::bad_request(format!(
            "start is after end in {line:?}"
        )));
    }
    Ok(ChannelConstraint::new(sta, cha, net, loc)?
        .with_time(TimeConstraint::simple(Some(start), Some(end))))
}
