//! Station service: catalog queries rendered as FDSN text or StationXML.

use std::fmt::Write;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::debug;
use winston_rs_protocol::{Channel, Instrument};
use winston_rs_protocol::time::{format_fdsn_time, now_j2k};

use super::FdsnState;
use super::error::FdsnRequestError;
use super::query::{FdsnQuery, Format, Level};

pub async fn query(state: &FdsnState, query: FdsnQuery) -> Result<Response, FdsnRequestError> {
    let storage = state.storage.clone();
    let catalog = tokio::task::spawn_blocking(move || storage.channels()).await??;
    let channels = query.constraints.filter(catalog);
    debug!(matched = channels.len(), level = ?query.level, "station query");

    if channels.is_empty() {
        return Err(FdsnRequestError::new(
            query.nodata,
            "no channels match the request",
        ));
    }
    if channels.len() > state.config.max_query_channels {
        return Err(FdsnRequestError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "request matches {} channels, limit is {}",
                channels.len(),
                state.config.max_query_channels
            ),
        ));
    }

    let (content_type, body) = match query.format {
        Format::Xml => ("application/xml", render_xml(&channels, query.level)),
        _ => ("text/plain; charset=utf-8", render_text(&channels, query.level)),
    };
    let headers = [(header::CONTENT_TYPE, content_type)];
    Ok((StatusCode::OK, headers, body).into_response())
}

/// Channels sharing one network and station. Input must be sorted.
struct StationGroup<'a> {
    channels: &'a [Channel],
}

impl<'a> StationGroup<'a> {
    fn split(channels: &'a [Channel]) -> Vec<Self> {
        channels
            .chunk_by(|a, b| a.scnl.network == b.scnl.network && a.scnl.station == b.scnl.station)
            .map(|channels| Self { channels })
            .collect()
    }

    fn first(&self) -> &Channel {
        &self.channels[0]
    }

    fn network(&self) -> &str {
        &self.first().scnl.network
    }

    fn station(&self) -> &str {
        &self.first().scnl.station
    }

    fn located(&self) -> Option<&Channel> {
        self.channels.iter().find(|c| c.coordinates().is_some())
    }

    fn site_name(&self) -> &str {
        self.channels
            .iter()
            .filter_map(|c| c.instrument.as_deref())
            .map(|i| i.name.as_str())
            .find(|n| !n.is_empty())
            .unwrap_or("")
    }

    fn span(&self) -> (Option<f64>, Option<f64>) {
        span_of(self.channels)
    }
}

fn span_of(channels: &[Channel]) -> (Option<f64>, Option<f64>) {
    let start = channels.iter().filter_map(|c| c.min_time).reduce(f64::min);
    let end = channels.iter().filter_map(|c| c.max_time).reduce(f64::max);
    (start, end)
}

fn time(t: Option<f64>) -> String {
    t.map(format_fdsn_time).unwrap_or_default()
}

fn number(v: Option<f64>) -> String {
    v.filter(|v| v.is_finite())
        .map(|v| v.to_string())
        .unwrap_or_default()
}

fn location_code(location: &str) -> &str {
    if location == "--" { "" } else { location }
}

fn instrument(c: Option<&Channel>) -> Option<&Instrument> {
    c?.instrument.as_deref()
}

fn latitude(c: Option<&Channel>) -> Option<f64> {
    instrument(c)?.latitude
}

fn longitude(c: Option<&Channel>) -> Option<f64> {
    instrument(c)?.longitude
}

fn elevation(c: Option<&Channel>) -> Option<f64> {
    instrument(c)?.height
}

pub fn render_text(channels: &[Channel], level: Level) -> String {
    let mut out = String::new();
    match level {
        Level::Network => {
            out.push_str("#Network|Description|StartTime|EndTime|TotalStations\n");
            for net in channels.chunk_by(|a, b| a.scnl.network == b.scnl.network) {
                let (start, end) = span_of(net);
                let stations = StationGroup::split(net).len();
                let _ = writeln!(
                    out,
                    "{}||{}|{}|{}",
                    net[0].scnl.network,
                    time(start),
                    time(end),
                    stations
                );
            }
        }
        Level::Station => {
            out.push_str(concat!(
                "#Network|Station|Latitude|Longitude|Elevation|",
                "SiteName|StartTime|EndTime\n"
            ));
            for group in StationGroup::split(channels) {
                let at = group.located();
                let (start, end) = group.span();
                let _ = writeln!(
                    out,
                    "{}|{}|{}|{}|{}|{}|{}|{}",
                    group.network(),
                    group.station(),
                    number(latitude(at)),
                    number(longitude(at)),
                    number(elevation(at)),
                    group.site_name(),
                    time(start),
                    time(end)
                );
            }
        }
        Level::Channel => {
            out.push_str(concat!(
                "#Network|Station|Location|Channel|Latitude|Longitude|Elevation|",
                "Depth|Azimuth|Dip|SensorDescription|Scale|ScaleFreq|ScaleUnits|",
                "SampleRate|StartTime|EndTime\n"
            ));
            for c in channels {
                let at = Some(c);
                let sensor = instrument(at).map_or("", |i| i.description.as_str());
                let _ = writeln!(
                    out,
                    "{}|{}|{}|{}|{}|{}|{}||||{}|||||{}|{}",
                    c.scnl.network,
                    c.scnl.station,
                    location_code(&c.scnl.location),
                    c.scnl.channel,
                    number(latitude(at)),
                    number(longitude(at)),
                    number(elevation(at)),
                    sensor,
                    time(c.min_time),
                    time(c.max_time)
                );
            }
        }
    }
    out
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// `startDate`/`endDate` attributes; unknown bounds are omitted.
fn date_attrs(start: Option<f64>, end: Option<f64>) -> String {
    let mut out = String::new();
    if let Some(s) = start {
        let _ = write!(out, " startDate=\"{}\"", format_fdsn_time(s));
    }
    if let Some(e) = end {
        let _ = write!(out, " endDate=\"{}\"", format_fdsn_time(e));
    }
    out
}

fn coordinates_xml(out: &mut String, indent: &str, at: Option<&Channel>) {
    for (tag, value) in [
        ("Latitude", latitude(at)),
        ("Longitude", longitude(at)),
        ("Elevation", elevation(at)),
    ] {
        let value = value.filter(|v| v.is_finite()).unwrap_or(0.0);
        let _ = writeln!(out, "{indent}<{tag}>{value}</{tag}>");
    }
}

pub fn render_xml(channels: &[Channel], level: Level) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(concat!(
        "<FDSNStationXML xmlns=\"http://www.fdsn.org/xml/station/1\" ",
        "schemaVersion=\"1.1\">\n"
    ));
    out.push_str("  <Source>winston-rs</Source>\n");
    let _ = writeln!(out, "  <Created>{}</Created>", format_fdsn_time(now_j2k()));

    for net in channels.chunk_by(|a, b| a.scnl.network == b.scnl.network) {
        let (start, end) = span_of(net);
        let _ = writeln!(
            out,
            "  <Network code=\"{}\"{}>",
            xml_escape(&net[0].scnl.network),
            date_attrs(start, end)
        );
        if level != Level::Network {
            for group in StationGroup::split(net) {
                let (start, end) = group.span();
                let _ = writeln!(
                    out,
                    "    <Station code=\"{}\"{}>",
                    xml_escape(group.station()),
                    date_attrs(start, end)
                );
                coordinates_xml(&mut out, "      ", group.located());
                let site = xml_escape(group.site_name());
                let _ = writeln!(out, "      <Site><Name>{site}</Name></Site>");
                if level == Level::Channel {
                    for c in group.channels {
                        let _ = writeln!(
                            out,
                            "      <Channel code=\"{}\" locationCode=\"{}\"{}>",
                            xml_escape(&c.scnl.channel),
                            xml_escape(location_code(&c.scnl.location)),
                            date_attrs(c.min_time, c.max_time)
                        );
                        coordinates_xml(&mut out, "        ", Some(c));
                        out.push_str("        <Depth>0</Depth>\n");
                        out.push_str("      </Channel>\n");
                    }
                }
                out.push_str("    </Station>\n");
            }
        }
        out.push_str("  </Network>\n");
    }
    out.push_str("</FDSNStationXML>\n");
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use winston_rs_protocol::Scnl;

    fn catalog() -> Vec<Channel> {
        let mut site = Instrument::at(-7.5, 110.4);
        site.height = Some(1200.0);
        site.name = "Merapi & Co".into();
        site.description = "L4C".into();
        let site = Arc::new(site);
        let mut list = vec![
            Channel::new(1, Scnl::new("ABC", "EHZ", "XX", "--"))
                .with_times(0.0, 100.0)
                .with_instrument(site.clone()),
            Channel::new(2, Scnl::new("ABC", "EHN", "XX", "00"))
                .with_times(-50.0, 50.0)
                .with_instrument(site),
            Channel::new(3, Scnl::new("DEF", "BHZ", "XX", "--")),
            Channel::new(4, Scnl::new("GHI", "HHZ", "YY", "--")).with_times(10.0, 20.0),
        ];
        list.sort();
        list
    }

    #[test]
    fn network_text() {
        let text = render_text(&catalog(), Level::Network);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "XX||2000-01-01T11:59:10.000000|2000-01-01T12:01:40.000000|2"
        );
        assert!(lines[2].starts_with("YY||"));
        assert!(lines[2].ends_with("|1"));
    }

    #[test]
    fn station_text() {
        let text = render_text(&catalog(), Level::Station);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("#Network|Station|Latitude"));
        assert!(lines[1].starts_with("XX|ABC|-7.5|110.4|1200|Merapi & Co|"));
        assert_eq!(lines[2], "XX|DEF||||||");
    }

    #[test]
    fn channel_text() {
        let text = render_text(&catalog(), Level::Channel);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        let fields: Vec<&str> = lines[0].split('|').collect();
        assert_eq!(fields.len(), 17);
        for line in &lines[1..] {
            assert_eq!(line.split('|').count(), 17, "{line}");
        }
        let located = "XX|ABC||EHZ|-7.5|110.4|1200|";
        assert!(lines.iter().any(|l| l.starts_with(located)));
        assert!(lines.iter().any(|l| l.starts_with("XX|ABC|00|EHN|")));
        assert!(lines.iter().any(|l| l.contains("|L4C|")));
    }

    #[test]
    fn xml_levels() {
        let xml = render_xml(&catalog(), Level::Channel);
        assert!(xml.starts_with("<?xml"));
        assert_eq!(xml.matches("<Network ").count(), 2);
        assert_eq!(xml.matches("<Station ").count(), 3);
        assert_eq!(xml.matches("<Channel ").count(), 4);
        assert!(xml.contains("<Name>Merapi &amp; Co</Name>"));
        let channel = concat!(
            "<Channel code=\"EHZ\" locationCode=\"\" ",
            "startDate=\"2000-01-01T12:00:00.000000\""
        );
        assert!(xml.contains(channel));
        assert!(xml.contains("<Latitude>-7.5</Latitude>"));

        let xml = render_xml(&catalog(), Level::Network);
        assert_eq!(xml.matches("<Station ").count(), 0);
        assert!(xml.contains("<Network code=\"YY\" startDate="));
    }

    #[test]
    fn escaping() {
        assert_eq!(
            xml_escape("a&b<c>d\"e'f"),
            "a&amp;b&lt;c&gt;d&quot;e&apos;f"
        );
    }
}
