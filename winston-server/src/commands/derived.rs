//! Derived series: RSAM and helicorder envelopes.

use winston_rs_protocol::{Command, HelicorderData, RsamData};

use super::{bounded_wave, compress_flag, extra_index, malformed};
use crate::dispatch::{CommandHandler, Reply, ServerContext};
use crate::error::Result;

/// `GETSCNLRSAMRAW <scnl> t1 t2 period [compress]`.
pub(crate) struct GetRsam {
    pub ctx: ServerContext,
}

impl CommandHandler for GetRsam {
    fn name(&self) -> &'static str {
        "GETSCNLRSAMRAW"
    }

    fn context(&self) -> &ServerContext {
        &self.ctx
    }

    fn handle(&self, cmd: &Command) -> Result<Reply> {
        let scnl = cmd.scnl()?;
        let span = cmd.time_span()?;
        let period = cmd.get_double(extra_index(cmd, 0)?)?;
        if period <= 0.0 {
            let what = format!("RSAM period must be positive, got {period}");
            return Err(malformed(cmd, &what).into());
        }
        let compress = compress_flag(cmd, 1)?;

        let Some(wave) = bounded_wave(&self.ctx, cmd, scnl, span)? else {
            return Ok(Reply::Empty);
        };
        let rsam = RsamData::from_wave(&wave, period)?;
        Reply::binary(rsam.to_binary(), compress)
    }
}

/// `GETSCNLHELIRAW <scnl> t1 t2 [compress]`.
pub(crate) struct GetHeli {
    pub ctx: ServerContext,
}

impl CommandHandler for GetHeli {
    fn name(&self) -> &'static str {
        "GETSCNLHELIRAW"
    }

    fn context(&self) -> &ServerContext {
        &self.ctx
    }

    fn handle(&self, cmd: &Command) -> Result<Reply> {
        let scnl = cmd.scnl()?;
        let span = cmd.time_span()?;
        let compress = compress_flag(cmd, 0)?;

        let Some(wave) = bounded_wave(&self.ctx, cmd, scnl, span)? else {
            return Ok(Reply::Empty);
        };
        let heli = HelicorderData::from_wave(&wave, HelicorderData::BIN_SECONDS)?;
        Reply::binary(heli.to_binary(), compress)
    }
}
