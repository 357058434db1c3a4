//! Built-in WWS command handlers.

mod catalog;
mod derived;
pub mod sac;
mod waveform;

use winston_rs_protocol::{Command, Scnl, TimeSpan, Wave, WinstonError};

use crate::dispatch::{DispatchTable, ServerContext};
use crate::error::Result;
use crate::store::{assemble_wave, joined_len};
use waveform::{GetRaw, GetWave};

pub(crate) fn register_all(table: &mut DispatchTable) {
    table.register("VERSION", |ctx| Box::new(catalog::Version { ctx }));
    table.register("MENU", |ctx| Box::new(catalog::Menu { ctx }));
    table.register("GETCHANNELS", |ctx| Box::new(catalog::GetChannels { ctx }));
    table.register("STATUS", |ctx| Box::new(catalog::Status { ctx }));
    table.register("GETSCN", |ctx| GetWave::boxed(ctx, "GETSCN", false));
    table.register("GETSCNL", |ctx| GetWave::boxed(ctx, "GETSCNL", false));
    table.register("GETWAVERAW", |ctx| GetWave::boxed(ctx, "GETWAVERAW", true));
    table.register("GETSCNRAW", |ctx| GetRaw::boxed(ctx, "GETSCNRAW"));
    table.register("GETSCNLRAW", |ctx| GetRaw::boxed(ctx, "GETSCNLRAW"));
    table.register("GETSCNLSAC", |ctx| Box::new(waveform::GetSac { ctx }));
    table.register("GETSCNLRSAMRAW", |ctx| Box::new(derived::GetRsam { ctx }));
    table.register("GETSCNLHELIRAW", |ctx| Box::new(derived::GetHeli { ctx }));
}

/// Position of the `k`th argument after the channel block and time span.
fn extra_index(cmd: &Command, k: usize) -> Result<isize> {
    Ok((cmd.scnl_form()?.arg_count() + 2 + k) as isize)
}

/// Optional trailing `0|1` compression flag at extra position `k`.
fn compress_flag(cmd: &Command, k: usize) -> Result<bool> {
    let index = extra_index(cmd, k)?;
    if cmd.opt_arg(index).is_none() {
        return Ok(false);
    }
    Ok(cmd.get_flag(index)?)
}

/// Gap-filled wave over `span`, refused before joining when it would hold
/// more than `ctx.max_samples` samples.
fn bounded_wave(
    ctx: &ServerContext,
    cmd: &Command,
    scnl: &Scnl,
    span: TimeSpan,
) -> Result<Option<Wave>> {
    let packets = ctx.storage.trace_packets(scnl, span)?;
    let samples = joined_len(&packets, span);
    if samples > ctx.max_samples {
        let limit = ctx.max_samples;
        let what = format!("window holds {samples} samples, limit is {limit}");
        return Err(malformed(cmd, &what).into());
    }
    Ok(assemble_wave(&packets, span))
}

fn malformed(cmd: &Command, what: &str) -> WinstonError {
    WinstonError::MalformedCommand(format!("{}: {what}", cmd.name()))
}
