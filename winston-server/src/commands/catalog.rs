//! Catalog commands: `VERSION`, `MENU`, `GETCHANNELS`, `STATUS`.

use winston_rs_protocol::time::{format_fdsn_time, now_j2k};
use winston_rs_protocol::{Command, MenuEntry};

use super::malformed;
use crate::dispatch::{CommandHandler, Reply, ServerContext};
use crate::error::Result;

pub(crate) struct Version {
    pub ctx: ServerContext,
}

impl CommandHandler for Version {
    fn name(&self) -> &'static str {
        "VERSION"
    }

    fn context(&self) -> &ServerContext {
        &self.ctx
    }

    fn handle(&self, _cmd: &Command) -> Result<Reply> {
        Ok(Reply::Version(self.ctx.protocol_version))
    }
}

/// One line per channel with a known time range.
pub(crate) struct Menu {
    pub ctx: ServerContext,
}

impl CommandHandler for Menu {
    fn name(&self) -> &'static str {
        "MENU"
    }

    fn context(&self) -> &ServerContext {
        &self.ctx
    }

    fn handle(&self, cmd: &Command) -> Result<Reply> {
        match cmd.opt_arg(0) {
            None => {}
            Some(form) if form.eq_ignore_ascii_case("SCNL") => {}
            Some(other) => {
                let what = format!("unknown menu form {other:?}");
                return Err(malformed(cmd, &what).into());
            }
        }
        let lines = self
            .storage()
            .channels()?
            .iter()
            .filter_map(MenuEntry::from_channel)
            .map(|e| e.to_line())
            .collect();
        Ok(Reply::Lines(lines))
    }
}

pub(crate) struct GetChannels {
    pub ctx: ServerContext,
}

impl CommandHandler for GetChannels {
    fn name(&self) -> &'static str {
        "GETCHANNELS"
    }

    fn context(&self) -> &ServerContext {
        &self.ctx
    }

    fn handle(&self, cmd: &Command) -> Result<Reply> {
        let metadata = match cmd.opt_arg(0) {
            None => false,
            Some(flag) if flag.eq_ignore_ascii_case("METADATA") => true,
            Some(other) => {
                return Err(malformed(cmd, &format!("unknown option {other:?}")).into());
            }
        };
        let lines = self
            .storage()
            .channels()?
            .iter()
            .map(|c| c.to_wire_line(metadata))
            .collect();
        Ok(Reply::Lines(lines))
    }
}

/// Plain-text health report. With `maxAge`, only channels whose newest
/// sample is older than `maxAge` seconds are listed.
pub(crate) struct Status {
    pub ctx: ServerContext,
}

impl CommandHandler for Status {
    fn name(&self) -> &'static str {
        "STATUS"
    }

    fn context(&self) -> &ServerContext {
        &self.ctx
    }

    fn handle(&self, cmd: &Command) -> Result<Reply> {
        let max_age = match cmd.opt_arg(0) {
            Some(_) => Some(cmd.get_double(0)?),
            None => None,
        };
        let now = now_j2k();
        let channels = self.storage().channels()?;

        let mut lines = vec![
            format!("protocol version: {}", self.ctx.protocol_version),
            format!("uptime: {:.0}s", (now - self.ctx.started).max(0.0)),
            format!("connections: {}", self.ctx.connections.count()),
            format!("commands served: {}", self.ctx.connections.total_commands()),
            format!("channels: {}", channels.len()),
        ];
        for channel in &channels {
            let Some(last) = channel.max_time else {
                continue;
            };
            let age = now - last;
            if max_age.is_none_or(|limit| age > limit) {
                lines.push(format!(
                    "{} {} {age:.1}",
                    channel.code(),
                    format_fdsn_time(last)
                ));
            }
        }

        let mut text = lines.join("\n");
        text.push('\n');
        Ok(Reply::Bytes(text.into_bytes()))
    }
}
