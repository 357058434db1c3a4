//! Waveform commands: assembled waves, raw trace packets and SAC files.

use winston_rs_protocol::Command;

use super::{bounded_wave, compress_flag, sac};
use crate::dispatch::{CommandHandler, Reply, ServerContext};
use crate::error::Result;

/// `GETSCN`, `GETSCNL` and `GETWAVERAW`: the joined, gap-filled wave.
pub(crate) struct GetWave {
    ctx: ServerContext,
    name: &'static str,
    /// Accepts a trailing compression flag.
    compressible: bool,
}

impl GetWave {
    pub fn boxed(
        ctx: ServerContext,
        name: &'static str,
        compressible: bool,
    ) -> Box<dyn CommandHandler> {
        Box::new(Self {
            ctx,
            name,
            compressible,
        })
    }
}

impl CommandHandler for GetWave {
    fn name(&self) -> &'static str {
        self.name
    }

    fn context(&self) -> &ServerContext {
        &self.ctx
    }

    fn handle(&self, cmd: &Command) -> Result<Reply> {
        let scnl = cmd.scnl()?;
        let span = cmd.time_span()?;
        let compress = self.compressible && compress_flag(cmd, 0)?;

        match bounded_wave(&self.ctx, cmd, scnl, span)? {
            Some(wave) => Reply::binary(wave.to_binary(), compress),
            None => Ok(Reply::Empty),
        }
    }
}

/// `GETSCNRAW` and `GETSCNLRAW`: stored packets, concatenated.
pub(crate) struct GetRaw {
    ctx: ServerContext,
    name: &'static str,
}

impl GetRaw {
    pub fn boxed(ctx: ServerContext, name: &'static str) -> Box<dyn CommandHandler> {
        Box::new(Self { ctx, name })
    }
}

impl CommandHandler for GetRaw {
    fn name(&self) -> &'static str {
        self.name
    }

    fn context(&self) -> &ServerContext {
        &self.ctx
    }

    fn handle(&self, cmd: &Command) -> Result<Reply> {
        let scnl = cmd.scnl()?;
        let span = cmd.time_span()?;
        let packets = self.storage().trace_packets(scnl, span)?;
        if packets.is_empty() {
            return Ok(Reply::Empty);
        }
        let mut payload = Vec::with_capacity(packets.iter().map(|p| p.encoded_len()).sum());
        for packet in &packets {
            packet.write_to(&mut payload);
        }
        Ok(Reply::Bytes(payload))
    }
}

pub(crate) struct GetSac {
    pub ctx: ServerContext,
}

impl CommandHandler for GetSac {
    fn name(&self) -> &'static str {
        "GETSCNLSAC"
    }

    fn context(&self) -> &ServerContext {
        &self.ctx
    }

    fn handle(&self, cmd: &Command) -> Result<Reply> {
        let scnl = cmd.scnl()?;
        let span = cmd.time_span()?;
        let Some(wave) = bounded_wave(&self.ctx, cmd, scnl, span)? else {
            return Ok(Reply::Empty);
        };
        let station = self.storage().channel(scnl)?.and_then(|c| {
            let inst = c.instrument.as_deref()?;
            let (lat, lon) = inst.coordinates()?;
            Some((lat, lon, inst.height))
        });
        Ok(Reply::Bytes(sac::write(&wave, scnl, station)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::test_support::{abc, context, run};
    use crate::dispatch::{Reply, ServerContext};
    use crate::error::ServerError;
    use crate::store::MemoryStore;
    use winston_rs_protocol::frame::decompress;
    use winston_rs_protocol::{Scnl, TracePacket, Wave, WinstonError};

    #[test]
    fn getscnl_full_window() {
        let (ctx, _) = context();
        let Reply::Bytes(body) = run(&ctx, "GETSCNL: 1 ABC EHZ XX -- 0 100").unwrap() else {
            panic!("expected bytes");
        };
        let wave = Wave::from_binary(&body).unwrap();
        assert_eq!(wave.start, 0.0);
        assert_eq!(wave.end(), 100.0);
        assert_eq!(wave.samples, (0..100).collect::<Vec<i32>>());
    }

    #[test]
    fn getscn_uses_wildcard_location() {
        let (ctx, _) = context();
        let Reply::Bytes(body) = run(&ctx, "GETSCN: 1 ABC EHZ XX 10 20").unwrap() else {
            panic!("expected bytes");
        };
        let wave = Wave::from_binary(&body).unwrap();
        assert_eq!(wave.samples.len(), 10);
        assert_eq!(wave.samples[0], 10);
    }

    #[test]
    fn unknown_channel_is_empty() {
        let (ctx, _) = context();
        assert_eq!(
            run(&ctx, "GETSCNL: 1 NOPE EHZ XX -- 0 100").unwrap(),
            Reply::Empty
        );
        assert_eq!(
            run(&ctx, "GETSCNL: 1 ABC EHZ XX -- 500 600").unwrap(),
            Reply::Empty
        );
    }

    #[test]
    fn bad_numbers_fail_loudly() {
        let (ctx, _) = context();
        for line in [
            "GETSCNL: 1 ABC EHZ XX -- zero 100",
            "GETSCNL: 1 ABC EHZ XX -- 100 0",
            "GETSCNL: 1 ABC EHZ",
            "GETWAVERAW: 1 ABC EHZ XX -- 0 100 maybe",
        ] {
            assert!(
                matches!(
                    run(&ctx, line),
                    Err(ServerError::Protocol(WinstonError::MalformedCommand(_)))
                ),
                "{line}"
            );
        }
    }

    #[test]
    fn getwaveraw_compressed() {
        let (ctx, _) = context();
        let Reply::Bytes(body) = run(&ctx, "GETWAVERAW: 1 ABC EHZ XX -- 0 50 1").unwrap() else {
            panic!("expected bytes");
        };
        let wave = Wave::from_binary(&decompress(&body, 1 << 20).unwrap()).unwrap();
        assert_eq!(wave.samples.len(), 50);

        let Reply::Bytes(plain) = run(&ctx, "GETWAVERAW: 2 ABC EHZ XX -- 0 50 0").unwrap() else {
            panic!("expected bytes");
        };
        assert_eq!(Wave::from_binary(&plain).unwrap(), wave);
    }

    #[test]
    fn raw_packets_overlapping_window() {
        let (ctx, _) = context();
        let Reply::Bytes(body) = run(&ctx, "GETSCNLRAW: 1 ABC EHZ XX -- 15 35").unwrap() else {
            panic!("expected bytes");
        };
        let packets = TracePacket::parse_all(&body).unwrap();
        let starts: Vec<f64> = packets.iter().map(|p| p.start).collect();
        assert_eq!(starts, vec![10.0, 20.0, 30.0]);
        assert!(packets.iter().all(|p| p.scnl == abc()));
    }

    #[test]
    fn sparse_wide_window_is_refused() {
        let store = MemoryStore::new();
        let def = Scnl::new("DEF", "HHZ", "XX", "--");
        for start in [0.0, 1.0e6] {
            store.push_packet(TracePacket::new(def.clone(), start, 100.0, vec![1; 100]));
        }
        let ctx = ServerContext::new(Arc::new(store), 3);

        for line in [
            "GETSCNL: 1 DEF HHZ XX -- 0 2000000",
            "GETWAVERAW: 2 DEF HHZ XX -- 0 2000000 1",
            "GETSCNLSAC: 3 DEF HHZ XX -- 0 2000000",
            "GETSCNLRSAMRAW: 4 DEF HHZ XX -- 0 2000000 60 0",
            "GETSCNLHELIRAW: 5 DEF HHZ XX -- 0 2000000 0",
        ] {
            assert!(
                matches!(
                    run(&ctx, line),
                    Err(ServerError::Protocol(WinstonError::MalformedCommand(_)))
                ),
                "{line}"
            );
        }

        let Reply::Bytes(body) = run(&ctx, "GETSCNL: 6 DEF HHZ XX -- 0 10").unwrap() else {
            panic!("expected bytes");
        };
        assert_eq!(Wave::from_binary(&body).unwrap().samples.len(), 100);
        // raw packets are never gap-filled
        assert!(matches!(
            run(&ctx, "GETSCNLRAW: 7 DEF HHZ XX -- 0 2000000").unwrap(),
            Reply::Bytes(_)
        ));
    }

    #[test]
    fn sample_limit_comes_from_context() {
        let (ctx, _) = context();
        let ctx = ctx.with_max_samples(50);
        assert!(run(&ctx, "GETSCNL: 1 ABC EHZ XX -- 0 100").is_err());
        assert!(run(&ctx, "GETSCNL: 2 ABC EHZ XX -- 0 40").is_ok());
    }

    #[test]
    fn sac_file() {
        let (ctx, _) = context();
        let Reply::Bytes(body) = run(&ctx, "GETSCNLSAC: 1 ABC EHZ XX -- 0 10").unwrap() else {
            panic!("expected bytes");
        };
        assert_eq!(body.len(), 632 + 10 * 4);
    }
}
