// ABOUTME: Frame-level roundtrip tests for the Snapcast wire codec
// ABOUTME: Covers HELLO/SERVER_SETTINGS JSON payloads and base-header field fidelity

use snapcast_client::protocol::codec::{
    decode_base_message, decode_hello, decode_server_settings, encode_base_message, encode_hello,
};
use snapcast_client::protocol::messages::{BaseMessage, HelloPayload, MessageType, Timestamp};

#[test]
fn hello_payload_survives_json_roundtrip_with_all_fields() {
    let hello = HelloPayload::new("de:ad:be:ef:00:01".into(), "living-room".into(), 3);
    let bytes = encode_hello(&hello).unwrap();
    let decoded = decode_hello(&bytes).unwrap();

    assert_eq!(decoded.mac, hello.mac);
    assert_eq!(decoded.id, hello.mac);
    assert_eq!(decoded.hostname, hello.hostname);
    assert_eq!(decoded.client_name, hello.client_name);
    assert_eq!(decoded.instance, 3);
    assert_eq!(decoded.protocol_version, 2);
    assert_eq!(decoded.os, std::env::consts::OS);
    assert_eq!(decoded.arch, std::env::consts::ARCH);
}

#[test]
fn server_settings_json_decodes_renamed_field() {
    let json = r#"{"bufferMs":1000,"latency":0,"muted":false,"volume":80}"#;
    // decode_server_settings expects a length-prefixed blob, not bare JSON.
    let mut buf = Vec::new();
    buf.extend_from_slice(&(json.len() as u32).to_le_bytes());
    buf.extend_from_slice(json.as_bytes());
    let decoded = decode_server_settings(&buf).unwrap();
    assert_eq!(decoded.buffer_ms, 1000);
    assert_eq!(decoded.muted, false);
    assert_eq!(decoded.volume, 80);
}

#[test]
fn base_message_header_round_trips_every_field() {
    let msg = BaseMessage {
        msg_type: MessageType::WireChunk.as_u16(),
        id: 42,
        refers_to: 7,
        sent: Timestamp { sec: 100, usec: 250_000 },
        received: Timestamp { sec: 100, usec: 260_000 },
        size: 1024,
    };
    let bytes = encode_base_message(&msg).unwrap();
    let decoded = decode_base_message(&bytes).unwrap();
    assert_eq!(decoded.msg_type, msg.msg_type);
    assert_eq!(decoded.id, msg.id);
    assert_eq!(decoded.refers_to, msg.refers_to);
    assert_eq!(decoded.sent, msg.sent);
    assert_eq!(decoded.received, msg.received);
    assert_eq!(decoded.size, msg.size);
}
