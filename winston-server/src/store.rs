//! Storage facade: the channel catalog and trace-packet archive behind every
//! command and FDSN query.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use winston_rs_protocol::{Channel, Instrument, Scnl, TimeSpan, TracePacket, Wave};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Read side of a waveform archive.
///
/// Implementations are read concurrently from many connections and FDSN
/// requests; calls may block and are always made off the reactor.
pub trait Storage: Send + Sync {
    /// Catalog snapshot, sorted by SCNL.
    fn channels(&self) -> Result<Vec<Channel>, StorageError>;

    /// Packets overlapping `span` (inclusive), in time order.
    ///
    /// An unknown channel yields an empty list.
    fn trace_packets(&self, scnl: &Scnl, span: TimeSpan) -> Result<Vec<TracePacket>, StorageError>;

    fn channel(&self, scnl: &Scnl) -> Result<Option<Channel>, StorageError> {
        Ok(self.channels()?.into_iter().find(|c| &c.scnl == scnl))
    }
}

/// Upper bound on the samples [`assemble_wave`] allocates for `packets`
/// over `span`, gaps included.
pub fn joined_len(packets: &[TracePacket], span: TimeSpan) -> usize {
    let packets = || packets.iter().filter(|p| !p.samples.is_empty());
    let Some(start) = packets().map(|p| p.start).reduce(f64::min) else {
        return 0;
    };
    let end = packets().map(TracePacket::end).fold(f64::MIN, f64::max);
    let rate = packets().map(|p| p.sample_rate).fold(0.0, f64::max);
    let width = end.min(span.end) - start.max(span.start);
    if width.is_nan() || width <= 0.0 {
        return 0;
    }
    // one extra sample: a slice keeps the last sample before `span.end`
    ((width * rate).ceil() as usize).saturating_add(1)
}

/// Cut each packet to `[span.start, span.end)`, then join the pieces,
/// gap-filling between them.
pub fn assemble_wave(packets: &[TracePacket], span: TimeSpan) -> Option<Wave> {
    let waves: Vec<Wave> = packets
        .iter()
        .map(|p| p.to_wave().slice(span.start, span.end))
        .filter(|w| !w.is_empty())
        .collect();
    Wave::join(&waves)
}

#[derive(Default)]
struct Inner {
    channels: BTreeMap<Scnl, Channel>,
    packets: HashMap<Scnl, Vec<TracePacket>>,
    next_sid: u32,
}

impl Inner {
    fn channel_entry(&mut self, scnl: &Scnl) -> &mut Channel {
        let next_sid = &mut self.next_sid;
        self.channels.entry(scnl.clone()).or_insert_with(|| {
            *next_sid += 1;
            Channel::new(*next_sid, scnl.clone())
        })
    }
}

/// In-memory [`Storage`]. Clone is cheap (Arc).
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a channel (idempotent). Returns its catalog entry.
    pub fn add_channel(&self, scnl: Scnl) -> Channel {
        self.write().channel_entry(&scnl).clone()
    }

    /// Attach instrument metadata to a registered channel.
    pub fn set_instrument(&self, scnl: &Scnl, instrument: Instrument) -> Result<(), StorageError> {
        let mut inner = self.write();
        let channel = inner
            .channels
            .get_mut(scnl)
            .ok_or_else(|| StorageError::UnknownChannel(scnl.code()))?;
        channel.instrument = Some(Arc::new(instrument));
        Ok(())
    }

    /// Store a packet, registering its channel and widening the channel's
    /// time range as needed.
    pub fn push_packet(&self, mut packet: TracePacket) {
        if packet.samples.is_empty() {
            return;
        }
        let mut inner = self.write();
        let channel = inner.channel_entry(&packet.scnl);
        packet.pin = channel.sid as i32;
        let (start, end) = (packet.start, packet.end());
        channel.min_time = Some(channel.min_time.map_or(start, |t| t.min(start)));
        channel.max_time = Some(channel.max_time.map_or(end, |t| t.max(end)));

        let list = inner.packets.entry(packet.scnl.clone()).or_default();
        let at = list.partition_point(|p| p.start <= packet.start);
        list.insert(at, packet);
    }

    pub fn packet_count(&self) -> usize {
        self.read().packets.values().map(Vec::len).sum()
    }
}

impl Storage for MemoryStore {
    fn channels(&self) -> Result<Vec<Channel>, StorageError> {
        Ok(self.read().channels.values().cloned().collect())
    }

    fn channel(&self, scnl: &Scnl) -> Result<Option<Channel>, StorageError> {
        Ok(self.read().channels.get(scnl).cloned())
    }

    fn trace_packets(&self, scnl: &Scnl, span: TimeSpan) -> Result<Vec<TracePacket>, StorageError> {
        let inner = self.read();
        let Some(list) = inner.packets.get(scnl) else {
            return Ok(Vec::new());
        };
        Ok(list
            .iter()
            .filter(|p| span.overlaps(p.start, p.last_sample_time()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Scnl {
        Scnl::new("ABC", "EHZ", "XX", "--")
    }

    #[test]
    fn push_registers_channel_and_range() {
        let store = MemoryStore::new();
        store.push_packet(TracePacket::new(abc(), 10.0, 1.0, vec![1; 10]));
        store.push_packet(TracePacket::new(abc(), 0.0, 1.0, vec![2; 10]));

        let channels = store.channels().unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].sid, 1);
        assert_eq!(channels[0].min_time, Some(0.0));
        assert_eq!(channels[0].max_time, Some(20.0));
        assert_eq!(store.packet_count(), 2);
    }

    #[test]
    fn packets_are_time_ordered_and_filtered() {
        let store = MemoryStore::new();
        for start in [20.0, 0.0, 10.0] {
            store.push_packet(TracePacket::new(abc(), start, 1.0, vec![0; 10]));
        }
        let all = store
            .trace_packets(&abc(), TimeSpan::new(0.0, 100.0))
            .unwrap();
        let starts: Vec<f64> = all.iter().map(|p| p.start).collect();
        assert_eq!(starts, vec![0.0, 10.0, 20.0]);

        let some = store
            .trace_packets(&abc(), TimeSpan::new(12.0, 15.0))
            .unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].start, 10.0);
    }

    #[test]
    fn unknown_channel_has_no_packets() {
        let store = MemoryStore::new();
        let other = Scnl::new("NOPE", "EHZ", "XX", "--");
        assert!(store
            .trace_packets(&other, TimeSpan::new(0.0, 1.0))
            .unwrap()
            .is_empty());
        assert!(store.channel(&other).unwrap().is_none());
        assert!(matches!(
            store.set_instrument(&other, Instrument::default()),
            Err(StorageError::UnknownChannel(_))
        ));
    }

    #[test]
    fn wave_joins_gaps_and_slices() {
        let store = MemoryStore::new();
        store.push_packet(TracePacket::new(abc(), 0.0, 1.0, vec![1, 2, 3]));
        store.push_packet(TracePacket::new(abc(), 5.0, 1.0, vec![6, 7]));

        let span = TimeSpan::new(1.0, 6.0);
        let packets = store.trace_packets(&abc(), span).unwrap();
        let wave = assemble_wave(&packets, span).unwrap();
        assert_eq!(wave.start, 1.0);
        assert_eq!(wave.samples, vec![2, 3, Wave::NO_DATA, Wave::NO_DATA, 6]);
        assert!(joined_len(&packets, span) >= wave.samples.len());
    }

    #[test]
    fn joined_len_is_clipped_to_window() {
        let packets = vec![
            TracePacket::new(abc(), 0.0, 100.0, vec![0; 100]),
            TracePacket::new(abc(), 1.0e6, 100.0, vec![0; 100]),
        ];
        let wide = TimeSpan::new(0.0, 2.0e6);
        assert!(joined_len(&packets, wide) > 100_000_000);

        let narrow = TimeSpan::new(0.0, 10.0);
        assert_eq!(joined_len(&packets, narrow), 1_001);
        let wave = assemble_wave(&packets, narrow).unwrap();
        assert_eq!(wave.samples.len(), 100);

        assert_eq!(joined_len(&[], wide), 0);
    }

    #[test]
    fn wave_outside_data_is_none() {
        let store = MemoryStore::new();
        store.push_packet(TracePacket::new(abc(), 0.0, 1.0, vec![1, 2, 3]));
        let span = TimeSpan::new(50.0, 60.0);
        let packets = store.trace_packets(&abc(), span).unwrap();
        assert!(packets.is_empty());
        assert!(assemble_wave(&packets, span).is_none());
        let wide = TimeSpan::new(0.0, 100.0);
        let all = store.trace_packets(&abc(), wide).unwrap();
        assert!(assemble_wave(&all, span).is_none());
    }

    #[test]
    fn instrument_is_attached() {
        let store = MemoryStore::new();
        store.add_channel(abc());
        store
            .set_instrument(&abc(), Instrument::at(10.0, 20.0))
            .unwrap();
        let ch = store.channel(&abc()).unwrap().unwrap();
        assert_eq!(ch.coordinates(), Some((10.0, 20.0)));
    }
}
