//! Reassembly of complete responses across arbitrary chunk boundaries.

use winston_rs_protocol::frame::{compress, encode_frame, encode_header_only, encode_lines};
use winston_rs_protocol::{
    BodyKind, Channel, Command, CompletedFrame, Instrument, MenuEntry, Reassembler, Response,
    ResponseKind, Scnl, TracePacket, Wave,
};

use std::sync::Arc;

/// Feed `bytes` split at `cuts`, asserting completion only on the last piece.
fn feed_pieces(kind: BodyKind, bytes: &[u8], cuts: &[usize]) -> CompletedFrame {
    let mut r = Reassembler::new(kind);
    let mut bounds = vec![0];
    bounds.extend_from_slice(cuts);
    bounds.push(bytes.len());
    let mut done = None;
    for (i, pair) in bounds.windows(2).enumerate() {
        let out = r.feed(&bytes[pair[0]..pair[1]]).unwrap();
        if i + 2 < bounds.len() {
            assert!(out.is_none(), "early at piece {i} of {cuts:?}");
        } else {
            done = out;
        }
    }
    done.expect("frame never completed")
}

fn decode(kind: ResponseKind, bytes: &[u8], cuts: &[usize]) -> Response {
    kind.decode(feed_pieces(kind.body_kind(), bytes, cuts))
        .unwrap()
}

#[test]
fn wave_response_every_two_way_split() {
    let wave = Wave::new(0.0, 100.0, (0..250).map(|i| i * 3 - 100).collect());
    let bytes = encode_frame("17", &wave.to_binary());
    let kind = ResponseKind::Wave { compressed: false };
    for cut in 1..bytes.len() {
        assert_eq!(decode(kind, &bytes, &[cut]), Response::Wave(wave.clone()));
    }
}

#[test]
fn compressed_wave_every_three_way_split() {
    let wave = Wave::new(-50.5, 40.0, (0..400).map(|i| (i % 13) - 6).collect());
    let bytes = encode_frame("3", &compress(&wave.to_binary()).unwrap());
    let kind = ResponseKind::Wave { compressed: true };
    for a in 1..bytes.len() - 1 {
        for b in (a + 1)..bytes.len() {
            assert_eq!(
                decode(kind, &bytes, &[a, b]),
                Response::Wave(wave.clone()),
                "cuts {a} {b}"
            );
        }
    }
}

#[test]
fn menu_lines_across_chunks() {
    let entries = vec![
        MenuEntry {
            pin: 1,
            scnl: Scnl::new("ABC", "EHZ", "XX", "--"),
            start: 0.0,
            end: 100.0,
            data_type: "s4".into(),
        },
        MenuEntry {
            pin: 2,
            scnl: Scnl::new("DEF", "BHN", "YY", "00"),
            start: -3600.25,
            end: 7200.5,
            data_type: "s4".into(),
        },
    ];
    let lines: Vec<String> = entries.iter().map(MenuEntry::to_line).collect();
    let bytes = encode_lines("m", &lines);
    for cut in 1..bytes.len() {
        assert_eq!(
            decode(ResponseKind::Menu, &bytes, &[cut]),
            Response::Menu(entries.clone())
        );
    }
}

#[test]
fn channels_with_metadata() {
    let mut instrument = Instrument::at(-7.5, 110.25);
    instrument.name = "Merapi".into();
    instrument.metadata.insert("gain".into(), "1200".into());
    let channel = Channel::new(4, Scnl::new("MRP", "EHZ", "VG", "--"))
        .with_times(10.0, 20.0)
        .with_instrument(Arc::new(instrument));
    let bytes = encode_lines("c", &[channel.to_wire_line(true)]);
    let Response::Channels(list) = decode(ResponseKind::Channels, &bytes, &[5]) else {
        panic!("expected channels");
    };
    assert_eq!(list.len(), 1);
    assert_eq!(list[0], channel);
    let inst = list[0].instrument.as_deref().unwrap();
    assert_eq!(inst.name, "Merapi");
    assert_eq!(inst.metadata.get("gain").map(String::as_str), Some("1200"));
    assert_eq!(list[0].coordinates(), Some((-7.5, 110.25)));
}

#[test]
fn raw_packets_split_mid_packet() {
    let scnl = Scnl::new("ABC", "EHZ", "XX", "--");
    let a = TracePacket::new(scnl.clone(), 0.0, 50.0, vec![1, 2, 3, 4]);
    let b = TracePacket::new(scnl, 0.08, 50.0, vec![5, 6]);
    let mut payload = a.to_binary();
    payload.extend(b.to_binary());
    let bytes = encode_frame("r", &payload);
    for cut in [1, 4, 40, 70, bytes.len() - 1] {
        assert_eq!(
            decode(ResponseKind::Packets, &bytes, &[cut]),
            Response::Packets(vec![a.clone(), b.clone()])
        );
    }
}

#[test]
fn version_header_only() {
    let bytes = encode_header_only("9", 3);
    let response = decode(ResponseKind::Version, &bytes, &[1]);
    assert_eq!(response, Response::Version(3));
}

#[test]
fn unknown_channel_is_empty() {
    let bytes = b"5 0\n";
    assert!(decode(ResponseKind::Rsam { compressed: true }, bytes, &[2]).is_empty());
}

#[test]
fn command_grammar_vectors() {
    let vectors = serde_json::json!([
        {"line": "VERSION: 1", "name": "VERSION", "id": "1", "args": []},
        {"line": "getscnl: 7 ABC EHZ XX -- 0 100", "name": "GETSCNL", "id": "7",
         "args": ["ABC", "EHZ", "XX", "--", "0", "100"]},
        {"line": "MENU 2 SCNL", "name": "MENU", "id": "2", "args": ["SCNL"]},
        {"line": "GETWAVERAW:  x  S C N L  1.5 2.5 1\r", "name": "GETWAVERAW", "id": "x",
         "args": ["S", "C", "N", "L", "1.5", "2.5", "1"]},
    ]);
    for v in vectors.as_array().unwrap() {
        let line = v["line"].as_str().unwrap();
        let cmd = Command::parse(line).unwrap();
        assert_eq!(cmd.name(), v["name"].as_str().unwrap(), "{line}");
        assert_eq!(cmd.id(), v["id"].as_str().unwrap(), "{line}");
        let args: Vec<&str> = v["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.as_str().unwrap())
            .collect();
        assert_eq!(cmd.args(), args.as_slice(), "{line}");
    }
}
