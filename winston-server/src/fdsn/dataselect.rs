//! Dataselect service: matching trace packets streamed as miniSEED.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_core::Stream;
use tracing::{debug, trace, warn};
use winston_rs_protocol::{Channel, TimeSpan, TracePacket};

use super::FdsnState;
use super::error::FdsnRequestError;
use super::mseed::RecordWriter;
use super::query::FdsnQuery;
use crate::constraint::ConstraintSet;
use crate::store::{Storage, StorageError};

pub const CONTENT_TYPE: &str = "application/vnd.fdsn.mseed";

/// Streams one channel at a time. The first channel with data is fetched
/// before answering so an empty selection can still be reported as no data.
pub async fn query(state: &FdsnState, query: FdsnQuery) -> Result<Response, FdsnRequestError> {
    let constraints = Arc::new(query.constraints);
    let storage = state.storage.clone();
    let set = constraints.clone();
    let channels = tokio::task::spawn_blocking(move || {
        storage.channels().map(|catalog| set.filter(catalog))
    })
    .await??;

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
    debug!(channels = channels.len(), "dataselect query");

    let storage = state.storage.clone();
    let set = constraints.clone();
    let (first, rest) = tokio::task::spawn_blocking(move || {
        let mut queue = VecDeque::from(channels);
        while let Some(channel) = queue.pop_front() {
            let packets = select_packets(storage.as_ref(), &set, &channel)?;
            if !packets.is_empty() {
                return Ok::<_, StorageError>((packets, queue));
            }
        }
        Ok((Vec::new(), queue))
    })
    .await??;

    if first.is_empty() {
        return Err(FdsnRequestError::new(
            query.nodata,
            "no data matches the request",
        ));
    }

    let body = record_stream(state.storage.clone(), constraints, first, rest);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        Body::from_stream(body),
    )
        .into_response())
}

/// Records for `first`, then for each remaining channel as it is fetched.
/// A storage failure mid-stream ends the body with an error.
fn record_stream(
    storage: Arc<dyn Storage>,
    constraints: Arc<ConstraintSet>,
    first: Vec<TracePacket>,
    rest: VecDeque<Channel>,
) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + 'static {
    async_stream::stream! {
        let mut writer = RecordWriter::new();
        yield encode(&mut writer, &first);
        for channel in rest {
            let storage = storage.clone();
            let set = constraints.clone();
            let fetched = tokio::task::spawn_blocking(move || {
                select_packets(storage.as_ref(), &set, &channel)
            })
            .await;
            match fetched {
                Ok(Ok(packets)) if packets.is_empty() => {}
                Ok(Ok(packets)) => {
                    let records = encode(&mut writer, &packets);
                    let failed = records.is_err();
                    yield records;
                    if failed {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "storage failed mid-stream");
                    yield Err(io::Error::other(e));
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "packet fetch task failed");
                    yield Err(io::Error::other(e));
                    break;
                }
            }
        }
    }
}

fn encode(writer: &mut RecordWriter, packets: &[TracePacket]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    for packet in packets {
        let records = writer.write_packet(packet).map_err(|e| {
            warn!(scnl = %packet.scnl, error = %e, "miniSEED encoding failed");
            io::Error::other(e)
        })?;
        out.extend_from_slice(&records);
    }
    Ok(out)
}

/// Packets of `channel` claimed by the first matching constraint and
/// inside the shared time window.
pub fn select_packets(
    storage: &dyn Storage,
    set: &ConstraintSet,
    channel: &Channel,
) -> Result<Vec<TracePacket>, StorageError> {
    let span = fetch_span(set, channel);
    let packets = storage.trace_packets(&channel.scnl, span)?;
    Ok(packets
        .into_iter()
        .filter(|p| {
            let Some(claim) = set.first_packet_match(p) else {
                return false;
            };
            trace!(scnl = %p.scnl, start = p.start, constraint = %claim, "packet claimed");
            set.time
                .as_ref()
                .is_none_or(|t| t.matches_range(Some(p.start), Some(p.last_sample_time())))
        })
        .collect())
}

/// Union of the windows of every constraint naming `channel`, clipped to
/// the shared window.
fn fetch_span(set: &ConstraintSet, channel: &Channel) -> TimeSpan {
    let available = TimeSpan::new(
        channel.min_time.unwrap_or(f64::NEG_INFINITY),
        channel.max_time.unwrap_or(f64::INFINITY),
    );
    let span = set
        .channels
        .iter()
        .filter(|c| c.matches_scnl(&channel.scnl))
        .map(|c| c.time().map_or(available, |t| t.fetch_span(available)))
        .reduce(|a, b| TimeSpan::new(a.start.min(b.start), a.end.max(b.end)))
        .unwrap_or(available);
    set.time.as_ref().map_or(span, |t| t.fetch_span(span))
}
