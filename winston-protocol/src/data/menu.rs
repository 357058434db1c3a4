use crate::channel::{Channel, Scnl};
use crate::error::{Result, WinstonError};

/// Earthworm sample type tag for big-endian 32-bit integers.
pub const DATA_TYPE_S4: &str = "s4";

/// One `MENU` line: `<pin> <sta> <chan> <net> <loc> <start> <end> <datatype>`.
#[derive(Clone, Debug, PartialEq)]
pub struct MenuEntry {
    pub pin: u32,
    pub scnl: Scnl,
    pub start: f64,
    pub end: f64,
    pub data_type: String,
}

impl MenuEntry {
    /// Menu entry for a catalog channel; `None` when it holds no data yet.
    pub fn from_channel(channel: &Channel) -> Option<Self> {
        Some(Self {
            pin: channel.sid,
            scnl: channel.scnl.clone(),
            start: channel.min_time?,
            end: channel.max_time?,
            data_type: DATA_TYPE_S4.to_owned(),
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {} {}",
            self.pin,
            self.scnl.station,
            self.scnl.channel,
            self.scnl.network,
            self.scnl.location,
            self.start,
            self.end,
            self.data_type
        )
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [pin, sta, chan, net, loc, start, end, data_type] = fields.as_slice() else {
            return Err(WinstonError::MalformedResponse(format!(
                "menu line needs 8 fields: {line:?}"
            )));
        };
        let number = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| WinstonError::MalformedResponse(format!("invalid menu time: {s:?}")))
        };
        Ok(Self {
            pin: pin.parse().map_err(|_| {
                WinstonError::MalformedResponse(format!("invalid menu pin: {pin:?}"))
            })?,
            scnl: Scnl::new(sta, chan, net, loc),
            start: number(*start)?,
            end: number(*end)?,
            data_type: (*data_type).to_owned(),
        })
    }
}
