// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framing tests: length prefix, incremental decoding, malformed payloads.

use super::*;
use serde_json::json;

fn ping(id: &str) -> Message {
    Message::request(id, "test.ping", json!({}))
}

#[test]
fn encode_prefixes_payload_length() {
    let frame = encode(&ping("1")).expect("encode failed");
    let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(len, frame.len() - 4);
    let decoded: Message = serde_json::from_slice(&frame[4..]).expect("valid JSON payload");
    assert_eq!(decoded, ping("1"));
}

#[test]
fn decoder_yields_message_once_frame_is_complete() {
    let frame = encode(&ping("1")).unwrap();
    let mut decoder = FrameDecoder::new();

    // Nothing until the final byte arrives.
    let (head, tail) = frame.split_at(frame.len() - 1);
    assert!(decoder.push(head).is_empty());
    let messages = decoder.push(tail);
    assert_eq!(messages, vec![ping("1")]);
    assert_eq!(decoder.pending_len(), 0);
}

#[test]
fn decoder_peels_multiple_frames_from_one_push() {
    let mut bytes = encode(&ping("1")).unwrap();
    bytes.extend(encode(&ping("2")).unwrap());
    bytes.extend(encode(&ping("3")).unwrap());

    let mut decoder = FrameDecoder::new();
    let messages = decoder.push(&bytes);
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].id, "3");
}

#[test]
fn malformed_json_is_dropped_and_decoding_continues() {
    let garbage = b"{not json";
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(garbage.len() as u32).to_be_bytes());
    bytes.extend_from_slice(garbage);
    bytes.extend(encode(&ping("after")).unwrap());

    let mut decoder = FrameDecoder::new();
    let messages = decoder.push(&bytes);
    assert_eq!(messages, vec![ping("after")]);
}

#[test]
fn zero_length_frame_is_legal_and_dropped() {
    // An empty payload is not a valid message object; the frame is consumed
    // without desyncing the stream.
    let mut bytes = 0u32.to_be_bytes().to_vec();
    bytes.extend(encode(&ping("next")).unwrap());

    let mut decoder = FrameDecoder::new();
    let messages = decoder.push(&bytes);
    assert_eq!(messages, vec![ping("next")]);
}

#[test]
fn oversized_prefix_clears_the_buffer() {
    let mut bytes = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(b"trailing");
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(&bytes).is_empty());
    assert_eq!(decoder.pending_len(), 0);
}

#[test]
fn two_decoders_do_not_share_state() {
    let frame = encode(&ping("1")).unwrap();
    let mut a = FrameDecoder::new();
    let mut b = FrameDecoder::new();
    a.push(&frame[..3]);
    assert!(b.push(&frame[3..]).is_empty(), "b must not see a's prefix bytes");
}

#[tokio::test]
async fn read_write_message_round_trip() {
    let message = Message::response("9", json!({"pong": true}));
    let mut buffer = Vec::new();
    write_message(&mut buffer, &message).await.expect("write failed");

    let mut cursor = std::io::Cursor::new(buffer);
    let back = read_message(&mut cursor).await.expect("read failed");
    assert_eq!(back, message);
}

#[tokio::test]
async fn read_message_reports_closed_connection() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    match read_message(&mut cursor).await {
        Err(WireError::ConnectionClosed) => {}
        other => panic!("expected ConnectionClosed, got {other:?}"),
    }
}
